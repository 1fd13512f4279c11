//! The refresh orchestrator (§4.F): ticker-driven pull, filter, upsert, and
//! (optionally) disk snapshot.

use crate::breaker::CircuitBreaker;
use crate::cache::{DiskMirror, Storage};
use crate::config::{FilterOptions, TagMatchMode};
use crate::upstream::{FlagSummary, UpstreamClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshOrchestrator {
    upstream: Arc<dyn UpstreamClient>,
    storage: Arc<Storage>,
    breaker: Arc<CircuitBreaker>,
    disk: Option<Arc<DiskMirror>>,
    filter: FilterOptions,
    cache_ttl: Duration,
    in_flight: AtomicBool,
}

impl RefreshOrchestrator {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        storage: Arc<Storage>,
        breaker: Arc<CircuitBreaker>,
        disk: Option<Arc<DiskMirror>>,
        filter: FilterOptions,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            upstream,
            storage,
            breaker,
            disk,
            filter,
            cache_ttl,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether `summary` survives the configured filter (§4.F.1). Idempotent
    /// and order-independent across predicates: a flag is cached iff every
    /// active predicate accepts it.
    fn passes_filter(&self, summary: &FlagSummary, enabled: bool) -> bool {
        if self.filter.only_enabled && !enabled {
            return false;
        }
        if self.filter.require_service_tag
            && let Some(service_name) = &self.filter.service_name
            && !summary.tags.contains(service_name)
        {
            return false;
        }
        if !self.filter.additional_tags.is_empty() {
            let matches = match self.filter.match_mode {
                TagMatchMode::Any => self
                    .filter
                    .additional_tags
                    .iter()
                    .any(|t| summary.tags.contains(t)),
                TagMatchMode::All => self
                    .filter
                    .additional_tags
                    .iter()
                    .all(|t| summary.tags.contains(t)),
            };
            if !matches {
                return false;
            }
        }
        true
    }

    /// Run one refresh tick. Refreshes are serialized: a tick that arrives
    /// while a previous one is still running is dropped (§5). The in-flight
    /// guard clears itself on drop, so a cancelled or timed-out `tick` (e.g.
    /// the caller's `tokio::time::timeout` during `Start`) never leaves
    /// refresh permanently wedged.
    #[instrument(skip(self, cancel))]
    pub async fn tick(&self, cancel: &CancellationToken) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("refresh already in progress, dropping tick");
            return;
        }
        let _guard = InFlightGuard(&self.in_flight);
        let result = self.run_once(cancel).await;

        match result {
            Ok(count) => {
                info!(flags_cached = count, "refresh succeeded");
                crate::metrics::refresh_success();
                self.breaker.record_success();
                self.breaker.record_refresh_success(Instant::now());
            }
            Err(err) => {
                warn!(error = %err, "refresh failed");
                crate::metrics::refresh_failure();
                self.breaker.record_failure();
            }
        }

        let stats = self.storage.stats();
        crate::metrics::cache_size(stats.size);
        crate::metrics::cache_hit_ratio(stats.hit_ratio);
    }

    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<usize> {
        if !self.breaker.allow() {
            anyhow::bail!("circuit open, skipping refresh");
        }

        let started = Instant::now();
        let summaries = self.upstream.fetch_index(cancel).await?;

        let mut joins = JoinSet::new();
        for summary in summaries {
            let upstream = self.upstream.clone();
            let cancel = cancel.clone();
            joins.spawn(async move {
                let flag = upstream.fetch_flag(summary.id, &cancel).await;
                (summary, flag)
            });
        }

        let mut cached = 0usize;
        while let Some(joined) = joins.join_next().await {
            let (summary, flag) = joined?;
            let flag = match flag {
                Ok(flag) => flag,
                Err(err) => {
                    warn!(flag_key = %summary.key, error = %err, "failed to fetch flag during refresh");
                    continue;
                }
            };
            if !self.passes_filter(&summary, flag.enabled) {
                continue;
            }
            self.storage.set(flag.key.clone(), flag, self.cache_ttl);
            cached += 1;
        }

        self.snapshot_disk().await;

        crate::metrics::refresh_duration(started.elapsed());
        Ok(cached)
    }

    /// Write the current storage contents to the disk mirror, if configured.
    /// Webhook handlers and `FlagCache::stop` call this too, alongside the
    /// periodic refresh tick; `DiskMirror` itself serializes concurrent
    /// writers (§6), so calls from multiple tasks are safe, just not free —
    /// callers still route through here rather than reaching for
    /// `DiskMirror` directly, to keep snapshot-taking in one place.
    pub async fn snapshot_disk(&self) {
        let Some(disk) = &self.disk else { return };
        let snapshot = self.storage.snapshot();
        if let Err(err) = disk.snapshot(&snapshot).await {
            error!(error = %err, "failed to write disk mirror snapshot");
        }
    }

    /// Load the disk mirror (if configured) into storage. Called once at
    /// `Start`, before the first refresh (§4.D).
    pub async fn warm_start(&self) {
        let Some(disk) = &self.disk else { return };
        let flags = disk.load().await;
        let count = flags.len();
        for (key, flag) in flags {
            self.storage.set(key, flag, self.cache_ttl);
        }
        debug!(flags_loaded = count, "warm-started from disk mirror");
    }
}
