//! Client-side caching and evaluation layer for a remote feature-flag
//! server (the upstream).
//!
//! Applications ask "what is the value of flag F for this context?" and get
//! an answer in constant time from a local cache, routing to the upstream
//! only when a flag's semantics demand server-side state (percentage
//! rollouts, multi-variant tests with sticky bucketing). See [`FlagCache`]
//! for the entry point.

pub mod admin;
pub mod breaker;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod model;
pub mod refresh;
pub mod router;
mod targeting;
pub mod upstream;
pub mod webhook;

pub use config::{
    AdminOptions, CircuitOptions, DiskOptions, FallbackStrategy, FilterOptions,
    FlagCacheOptions, TagMatchMode, WebhookOptions,
};
pub use error::FlagCacheError;
pub use model::{EvaluationContext, EvaluationResult};

use breaker::CircuitBreaker;
use cache::{DiskMirror, Storage};
use refresh::RefreshOrchestrator;
use router::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use upstream::{HttpUpstreamClient, UpstreamClient};

/// The cache's own TTL multiplier over `refresh_interval`: a flag survives a
/// few missed refresh cycles before `Get` treats it as absent, so a single
/// slow upstream blip doesn't immediately flip evaluations to fallback.
const CACHE_TTL_REFRESH_MULTIPLE: u32 = 3;

/// Default bound on the in-memory flag store; flags are small, so this
/// comfortably covers large upstream deployments without unbounded growth.
const DEFAULT_STORAGE_CAPACITY: u64 = 50_000;

struct Background {
    refresh_handle: JoinHandle<()>,
    webhook_handle: Option<JoinHandle<()>>,
    admin_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// The facade (§4.J): a builder-constructed handle exposing typed
/// evaluation methods plus `start`/`stop` lifecycle control.
pub struct FlagCache {
    options: FlagCacheOptions,
    storage: Arc<Storage>,
    breaker: Arc<CircuitBreaker>,
    upstream: Arc<dyn UpstreamClient>,
    router: Router,
    refresh: Arc<RefreshOrchestrator>,
    background: tokio::sync::Mutex<Option<Background>>,
}

impl FlagCache {
    /// Construct a handle without starting any background work. Fails only
    /// on `ConfigError` (§7) — malformed options.
    pub fn new(options: FlagCacheOptions) -> Result<Self, FlagCacheError> {
        options.validate()?;

        let storage = Arc::new(Storage::new(DEFAULT_STORAGE_CAPACITY));
        let breaker = Arc::new(CircuitBreaker::new(options.circuit.clone()));
        let disk = if options.disk.enabled {
            let path = options.disk.path.clone().ok_or_else(|| FlagCacheError::Config {
                field: "disk.path".to_string(),
                reason: "required when disk.enabled is true".to_string(),
            })?;
            Some(Arc::new(DiskMirror::new(path)))
        } else {
            None
        };

        let upstream: Arc<dyn UpstreamClient> = Arc::new(HttpUpstreamClient::new(&options)?);

        let cache_ttl = options.refresh_interval * CACHE_TTL_REFRESH_MULTIPLE;
        let refresh = Arc::new(RefreshOrchestrator::new(
            upstream.clone(),
            storage.clone(),
            breaker.clone(),
            disk.clone(),
            options.filter.clone(),
            cache_ttl,
        ));

        let router = Router::new(
            storage.clone(),
            upstream.clone(),
            breaker.clone(),
            options.fallback_strategy,
        );

        Ok(Self {
            options,
            storage,
            breaker,
            upstream,
            router,
            refresh,
            background: tokio::sync::Mutex::new(None),
        })
    }

    /// Warm-start from the disk mirror (if any), run the first refresh
    /// synchronously bounded by `initial_timeout`, then spawn the background
    /// refresh ticker and (if configured) the webhook/admin listeners.
    ///
    /// `external_cancel` cancels all background work in addition to an
    /// explicit `stop()` call — a caller-owned shutdown signal (§4.J).
    /// If the mirror pre-loaded flags and the first refresh later fails,
    /// `start` still succeeds (§4.J) — the mirror's state is usable.
    #[instrument(skip(self, external_cancel))]
    pub async fn start(&self, external_cancel: CancellationToken) -> Result<(), FlagCacheError> {
        self.refresh.warm_start().await;

        let cancel = external_cancel.child_token();
        let first_refresh = tokio::time::timeout(
            self.options.initial_timeout,
            self.refresh.tick(&cancel),
        );
        match first_refresh.await {
            Ok(()) => debug!("initial refresh completed"),
            Err(_) => {
                if self.storage.stats().size == 0 {
                    return Err(FlagCacheError::UpstreamUnavailable {
                        endpoint: self.options.flagr_endpoint.clone(),
                        cause: "initial refresh did not complete within initial_timeout".to_string(),
                    });
                }
                debug!("initial refresh timed out but disk mirror pre-loaded the cache");
            }
        }

        let refresh_handle = self.spawn_refresh_ticker(cancel.clone());
        // Listeners are bound here, synchronously, before `start` returns —
        // a caller that gets `Ok(())` back can POST to the webhook/admin
        // ports immediately, with no bind-vs-request race against the
        // spawned accept loop. If either bind fails, cancel and abort
        // whatever already spawned rather than leaking it — a caller that
        // gets `Err` back must have nothing left running.
        let webhook_handle = match self.spawn_webhook_listener(cancel.clone()).await {
            Ok(handle) => handle,
            Err(err) => {
                cancel.cancel();
                refresh_handle.abort();
                return Err(err);
            }
        };
        let admin_handle = match self.spawn_admin_listener(cancel.clone()).await {
            Ok(handle) => handle,
            Err(err) => {
                cancel.cancel();
                refresh_handle.abort();
                if let Some(handle) = webhook_handle {
                    handle.abort();
                }
                return Err(err);
            }
        };

        *self.background.lock().await = Some(Background {
            refresh_handle,
            webhook_handle,
            admin_handle,
            cancel,
        });

        info!("flag cache started");
        Ok(())
    }

    fn spawn_refresh_ticker(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let refresh = self.refresh.clone();
        let interval = self.options.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; already ran above
            loop {
                tokio::select! {
                    _ = ticker.tick() => refresh.tick(&cancel).await,
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    async fn spawn_webhook_listener(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<()>>, FlagCacheError> {
        let Some(webhook_opts) = self.options.webhook.clone() else {
            return Ok(None);
        };
        let state = Arc::new(webhook::WebhookState {
            storage: self.storage.clone(),
            refresh: self.refresh.clone(),
            secret: webhook_opts.secret.clone(),
        });
        let app = webhook::router(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], webhook_opts.port));
        let listener = bind_listener(addr).await?;
        Ok(Some(spawn_server(listener, app, addr, cancel)))
    }

    async fn spawn_admin_listener(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<()>>, FlagCacheError> {
        let Some(admin_opts) = self.options.admin.clone() else {
            return Ok(None);
        };
        let state = Arc::new(admin::AdminState {
            storage: self.storage.clone(),
            breaker: self.breaker.clone(),
            refresh: self.refresh.clone(),
        });
        let app = admin::router(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], admin_opts.port));
        let listener = bind_listener(addr).await?;
        Ok(Some(spawn_server(listener, app, addr, cancel)))
    }

    /// Cancel background work and wait up to a short grace period for
    /// in-flight servers to drain (§5: 5s recommended).
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), FlagCacheError> {
        let Some(background) = self.background.lock().await.take() else {
            return Ok(());
        };
        background.cancel.cancel();

        let grace = std::time::Duration::from_secs(5);
        let deadline = Instant::now() + grace;
        let _ = tokio::time::timeout_at(deadline.into(), background.refresh_handle).await;
        if let Some(handle) = background.webhook_handle {
            let _ = tokio::time::timeout_at(deadline.into(), handle).await;
        }
        if let Some(handle) = background.admin_handle {
            let _ = tokio::time::timeout_at(deadline.into(), handle).await;
        }

        self.refresh.snapshot_disk().await;

        info!("flag cache stopped");
        Ok(())
    }

    /// `Evaluate(key, ctx)` (§4.G): the typed result or a typed error,
    /// depending on the configured fallback strategy.
    pub async fn evaluate(
        &self,
        key: &str,
        ctx: &EvaluationContext,
    ) -> Result<EvaluationResult, FlagCacheError> {
        self.router.evaluate(key, ctx, &CancellationToken::new()).await
    }

    /// Never errors (§7): collapses to `default` on any failure.
    pub async fn bool_value(&self, key: &str, ctx: &EvaluationContext, default: bool) -> bool {
        self.router
            .bool_value(key, ctx, &CancellationToken::new(), default)
            .await
    }

    pub async fn string_value(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        attachment_key: &str,
        default: &str,
    ) -> String {
        self.router
            .string_value(key, ctx, &CancellationToken::new(), attachment_key, default)
            .await
    }

    pub async fn int_value(
        &self,
        key: &str,
        ctx: &EvaluationContext,
        attachment_key: &str,
        default: i64,
    ) -> i64 {
        self.router
            .int_value(key, ctx, &CancellationToken::new(), attachment_key, default)
            .await
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener, FlagCacheError> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| FlagCacheError::Config {
            field: "listen address".to_string(),
            reason: format!("failed to bind {addr}: {err}"),
        })
}

fn spawn_server(
    listener: tokio::net::TcpListener,
    app: axum::Router,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel.cancelled().await;
        });
        if let Err(err) = serve.await {
            error!(%addr, error = %err, "HTTP server exited with error");
        }
    })
}
