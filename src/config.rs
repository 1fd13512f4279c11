//! Construction-time options (§6, §4.J). Every field has a hardcoded default;
//! an explicit `FLAGCACHE_*` environment variable overrides the default, and
//! an explicit builder call overrides both.

use std::time::Duration;

/// What to return when a flag can't be resolved (cache miss, circuit open,
/// remote failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackStrategy {
    #[default]
    FailClosed,
    FailOpen,
    Error,
}

/// Which of `filter.additional_tags` must be present on a flag's tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatchMode {
    #[default]
    Any,
    All,
}

/// Filter options for the refresh orchestrator (§4.F.1) — which flags this
/// instance actually caches.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub only_enabled: bool,
    pub service_name: Option<String>,
    pub require_service_tag: bool,
    pub additional_tags: Vec<String>,
    pub match_mode: TagMatchMode,
}

/// Circuit breaker thresholds (§4.E).
#[derive(Debug, Clone)]
pub struct CircuitOptions {
    pub threshold: u32,
    pub timeout: Duration,
    pub half_open_timeout: Duration,
}

impl Default for CircuitOptions {
    fn default() -> Self {
        Self {
            threshold: 3,
            timeout: Duration::from_secs(30),
            half_open_timeout: Duration::from_secs(10),
        }
    }
}

/// Disk mirror options (§4.D).
#[derive(Debug, Clone, Default)]
pub struct DiskOptions {
    pub enabled: bool,
    pub path: Option<String>,
}

/// Inbound webhook receiver options (§4.H).
#[derive(Debug, Clone)]
pub struct WebhookOptions {
    pub port: u16,
    pub secret: Option<String>,
}

/// Inbound admin surface options (§4.H). Always on a separate listen address
/// from application traffic.
#[derive(Debug, Clone)]
pub struct AdminOptions {
    pub port: u16,
}

/// Top-level construction options for the facade (§4.J, §6).
#[derive(Debug, Clone)]
pub struct FlagCacheOptions {
    pub flagr_endpoint: String,
    pub flagr_api_key: Option<String>,
    pub flagr_timeout: Duration,
    pub flagr_max_retries: u32,
    pub refresh_interval: Duration,
    pub initial_timeout: Duration,
    pub fallback_strategy: FallbackStrategy,
    pub circuit: CircuitOptions,
    pub filter: FilterOptions,
    pub disk: DiskOptions,
    pub webhook: Option<WebhookOptions>,
    pub admin: Option<AdminOptions>,
}

fn env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl FlagCacheOptions {
    /// Start from environment-driven defaults for everything but the
    /// required endpoint, which the caller must always supply.
    pub fn new(flagr_endpoint: impl Into<String>) -> Self {
        Self {
            flagr_endpoint: flagr_endpoint.into(),
            flagr_api_key: std::env::var("FLAGCACHE_API_KEY").ok(),
            flagr_timeout: env_duration_secs("FLAGCACHE_TIMEOUT_SECS", Duration::from_secs(5)),
            flagr_max_retries: env_var("FLAGCACHE_MAX_RETRIES", 3),
            refresh_interval: env_duration_secs(
                "FLAGCACHE_REFRESH_INTERVAL_SECS",
                Duration::from_secs(300),
            ),
            initial_timeout: env_duration_secs(
                "FLAGCACHE_INITIAL_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
            fallback_strategy: FallbackStrategy::default(),
            circuit: CircuitOptions::default(),
            filter: FilterOptions::default(),
            disk: DiskOptions::default(),
            webhook: None,
            admin: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.flagr_api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.flagr_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.flagr_max_retries = retries;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_fallback_strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback_strategy = strategy;
        self
    }

    pub fn with_circuit(mut self, circuit: CircuitOptions) -> Self {
        self.circuit = circuit;
        self
    }

    pub fn with_filter(mut self, filter: FilterOptions) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_disk(mut self, enabled: bool, path: impl Into<String>) -> Self {
        self.disk = DiskOptions {
            enabled,
            path: Some(path.into()),
        };
        self
    }

    pub fn with_webhook(mut self, port: u16, secret: Option<String>) -> Self {
        self.webhook = Some(WebhookOptions { port, secret });
        self
    }

    pub fn with_admin(mut self, port: u16) -> Self {
        self.admin = Some(AdminOptions { port });
        self
    }

    /// Field-level validation (§7 `ConfigError`); checked at `Start`.
    pub fn validate(&self) -> Result<(), crate::error::FlagCacheError> {
        if self.flagr_endpoint.trim().is_empty() {
            return Err(crate::error::FlagCacheError::Config {
                field: "flagr_endpoint".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(webhook) = &self.webhook
            && webhook.port == 0
        {
            return Err(crate::error::FlagCacheError::Config {
                field: "webhook.port".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(admin) = &self.admin
            && admin.port == 0
        {
            return Err(crate::error::FlagCacheError::Config {
                field: "admin.port".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
