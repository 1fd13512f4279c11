//! The evaluation router (§4.G): `Evaluate` ties classification, the local
//! evaluator, and remote evaluation together under one fallback policy.

use crate::breaker::CircuitBreaker;
use crate::cache::Storage;
use crate::classifier::{self, Strategy};
use crate::config::FallbackStrategy;
use crate::error::FlagCacheError;
use crate::evaluator;
use crate::model::{EvaluationContext, EvaluationResult};
use crate::upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub struct Router {
    storage: Arc<Storage>,
    upstream: Arc<dyn UpstreamClient>,
    breaker: Arc<CircuitBreaker>,
    fallback_strategy: FallbackStrategy,
}

impl Router {
    pub fn new(
        storage: Arc<Storage>,
        upstream: Arc<dyn UpstreamClient>,
        breaker: Arc<CircuitBreaker>,
        fallback_strategy: FallbackStrategy,
    ) -> Self {
        Self {
            storage,
            upstream,
            breaker,
            fallback_strategy,
        }
    }

    /// `Evaluate(key, ctx)` (§4.G). A LOCAL-classified flag never issues a
    /// network call (§8 invariant 2).
    #[instrument(skip(self, ctx, cancel), fields(flag_key = %key))]
    pub async fn evaluate(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, FlagCacheError> {
        let started = Instant::now();
        let result = self.evaluate_inner(key, ctx, cancel).await;
        crate::metrics::evaluation_duration(started.elapsed());
        result
    }

    async fn evaluate_inner(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, FlagCacheError> {
        let Some(flag) = self.storage.get(key) else {
            debug!("cache miss, applying fallback");
            return self.fallback(key, "flag not cached");
        };

        match classifier::classify(&flag) {
            Strategy::Local => {
                crate::metrics::evaluation("local");
                let result = evaluator::evaluate(&flag, ctx);
                if result.variant_key.is_some() {
                    Ok(result)
                } else {
                    self.fallback(key, &result.evaluation_reason)
                }
            }
            Strategy::Remote => {
                crate::metrics::evaluation("remote");
                if !self.breaker.allow() {
                    return self.fallback(key, "circuit open");
                }
                match self.upstream.evaluate_remote(key, ctx, cancel).await {
                    Ok(result) => {
                        self.breaker.record_success();
                        Ok(result)
                    }
                    Err(err) => {
                        self.breaker.record_failure();
                        self.fallback(key, &err.to_string())
                    }
                }
            }
        }
    }

    fn fallback(&self, key: &str, reason: &str) -> Result<EvaluationResult, FlagCacheError> {
        match self.fallback_strategy {
            FallbackStrategy::FailClosed => Ok(EvaluationResult::unmatched(key, reason)),
            FallbackStrategy::FailOpen => Ok(EvaluationResult {
                flag_key: key.to_string(),
                variant_key: Some("on".to_string()),
                variant_attachment: std::collections::HashMap::from([(
                    "enabled".to_string(),
                    serde_json::Value::Bool(true),
                )]),
                evaluation_reason: reason.to_string(),
            }),
            FallbackStrategy::Error => Err(FlagCacheError::Evaluation {
                flag_key: key.to_string(),
                reason: reason.to_string(),
                cause: String::new(),
            }),
        }
    }

    /// `Bool`/`String`/`Int` never return errors (§7): any error collapses
    /// to the caller-supplied (or type) default.
    pub async fn bool_value(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
        default: bool,
    ) -> bool {
        match self.evaluate(key, ctx, cancel).await {
            Ok(result) => result.is_enabled(),
            Err(_) => default,
        }
    }

    pub async fn string_value(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
        attachment_key: &str,
        default: &str,
    ) -> String {
        match self.evaluate(key, ctx, cancel).await {
            Ok(result) => result.get_string(attachment_key, default),
            Err(_) => default.to_string(),
        }
    }

    pub async fn int_value(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
        attachment_key: &str,
        default: i64,
    ) -> i64 {
        match self.evaluate(key, ctx, cancel).await {
            Ok(result) => result.get_int(attachment_key, default),
            Err(_) => default,
        }
    }
}
