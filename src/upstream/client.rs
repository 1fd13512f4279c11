//! The upstream HTTP client (§4.C, §6): fetch the flag index, individual
//! flags, and remote evaluations, with linear backoff retry and per-request
//! cancellation.

use crate::config::FlagCacheOptions;
use crate::error::UpstreamError;
use crate::model::{EvaluationContext, EvaluationResult, Flag};
use crate::upstream::model::{context_to_json, EntityContext, EvaluationRequest, EvaluationResponse, FlagSummary, HealthResponse};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Operations the refresh orchestrator and router need from the upstream.
/// A trait so tests can substitute a fake without standing up an HTTP
/// server for every unit test.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch_index(&self, cancel: &CancellationToken) -> Result<Vec<FlagSummary>, UpstreamError>;
    async fn fetch_flag(&self, id: i64, cancel: &CancellationToken) -> Result<Flag, UpstreamError>;
    async fn evaluate_remote(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, UpstreamError>;
    async fn health(&self, cancel: &CancellationToken) -> Result<(), UpstreamError>;
}

/// `reqwest`-backed implementation of [`UpstreamClient`].
pub struct HttpUpstreamClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
    max_retries: u32,
}

impl HttpUpstreamClient {
    pub fn new(options: &FlagCacheOptions) -> Result<Self, crate::error::FlagCacheError> {
        let client = Client::builder()
            .timeout(options.flagr_timeout)
            .build()
            .map_err(|e| crate::error::FlagCacheError::Config {
                field: "flagr_timeout".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            endpoint: options.flagr_endpoint.trim_end_matches('/').to_string(),
            api_key: options.flagr_api_key.clone(),
            client,
            max_retries: options.flagr_max_retries,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Retry up to `max_retries` times with linear backoff (attempt × base),
    /// stopping immediately on a non-retryable (4xx) failure (§4.C).
    async fn with_retry<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, UpstreamError>>,
    {
        const BASE_BACKOFF: Duration = Duration::from_millis(100);
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(UpstreamError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = BASE_BACKOFF * attempt;
                    warn!(attempt, ?delay, error = %err, "retrying upstream call");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn map_status(status: StatusCode) -> Option<UpstreamError> {
        if status.is_success() {
            None
        } else {
            Some(UpstreamError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    #[instrument(skip(self, cancel))]
    async fn fetch_index(&self, cancel: &CancellationToken) -> Result<Vec<FlagSummary>, UpstreamError> {
        self.with_retry(cancel, || async {
            let response = self
                .authed(self.client.get(format!("{}/api/v1/flags", self.endpoint)))
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            if let Some(err) = Self::map_status(response.status()) {
                return Err(err);
            }
            response
                .json::<Vec<FlagSummary>>()
                .await
                .map_err(|e| UpstreamError::Decode(e.to_string()))
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn fetch_flag(&self, id: i64, cancel: &CancellationToken) -> Result<Flag, UpstreamError> {
        self.with_retry(cancel, || async {
            let response = self
                .authed(
                    self.client
                        .get(format!("{}/api/v1/flags/{}", self.endpoint, id)),
                )
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            if let Some(err) = Self::map_status(response.status()) {
                return Err(err);
            }
            response
                .json::<Flag>()
                .await
                .map_err(|e| UpstreamError::Decode(e.to_string()))
        })
        .await
    }

    #[instrument(skip(self, ctx, cancel))]
    async fn evaluate_remote(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, UpstreamError> {
        let request = EvaluationRequest {
            flag_key: key.to_string(),
            entity_context: EntityContext::from(ctx),
            context: context_to_json(ctx),
        };

        self.with_retry(cancel, || async {
            let response = self
                .authed(
                    self.client
                        .post(format!("{}/api/v1/evaluation", self.endpoint)),
                )
                .json(&request)
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            if let Some(err) = Self::map_status(response.status()) {
                return Err(err);
            }
            let decoded = response
                .json::<EvaluationResponse>()
                .await
                .map_err(|e| UpstreamError::Decode(e.to_string()))?;

            debug!(flag_key = %decoded.flag_key, variant = ?decoded.variant_key, "remote evaluation decoded");
            Ok(EvaluationResult {
                flag_key: decoded.flag_key,
                variant_key: decoded.variant_key,
                variant_attachment: decoded.variant_attachment.into_iter().collect(),
                evaluation_reason: "TARGETING_MATCH".to_string(),
            })
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn health(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        self.with_retry(cancel, || async {
            let response = self
                .authed(self.client.get(format!("{}/api/v1/health", self.endpoint)))
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            if let Some(err) = Self::map_status(response.status()) {
                return Err(err);
            }
            let health = response
                .json::<HealthResponse>()
                .await
                .map_err(|e| UpstreamError::Decode(e.to_string()))?;
            if health.status == "OK" {
                Ok(())
            } else {
                Err(UpstreamError::Status(503))
            }
        })
        .await
    }
}
