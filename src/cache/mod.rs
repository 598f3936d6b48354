//! Catalog cache orchestration
//!
//! [`CacheOrchestrator`] owns the live [`Catalog`] snapshot. Replacements are
//! built off to the side and swapped in as a single `Arc`, so a reader sees
//! either the previous catalog or the new one, never a mix. At most one
//! refresh runs at a time; the guard flag is claimed before any I/O starts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info};

use crate::errors::AppResult;
use crate::ingestor::PlaylistTransformer;
use crate::models::{Catalog, Channel};

pub type CacheEventSender = broadcast::Sender<CacheEvent>;
pub type CacheEventReceiver = broadcast::Receiver<CacheEvent>;

/// Result of a refresh request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Completed,
    Skipped(SkipReason),
}

/// Why a refresh request was a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another refresh holds the guard
    InProgress,
    /// Non-forced refresh on a catalog that is not stale
    Fresh,
}

/// Change notifications published by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Updated {
        version: u64,
        channels: usize,
        genres: usize,
    },
    RefreshFailed {
        message: String,
    },
}

/// Point-in-time view of the cache
///
/// `snapshot`, `version` and `last_updated` always belong to the same swap.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub snapshot: Arc<Catalog>,
    pub version: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub refreshing: bool,
}

#[derive(Debug)]
struct Snapshot {
    catalog: Arc<Catalog>,
    version: u64,
    last_updated: Option<DateTime<Utc>>,
}

/// Clears the refreshing flag on every exit path
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CacheOrchestrator {
    transformer: PlaylistTransformer,
    source_spec: String,
    update_interval: Duration,
    snapshot: RwLock<Snapshot>,
    refreshing: AtomicBool,
    events: CacheEventSender,
}

impl CacheOrchestrator {
    pub fn new(
        transformer: PlaylistTransformer,
        source_spec: impl Into<String>,
        update_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            transformer,
            source_spec: source_spec.into(),
            update_interval,
            snapshot: RwLock::new(Snapshot {
                catalog: Arc::new(Catalog::empty()),
                version: 0,
                last_updated: None,
            }),
            refreshing: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> CacheEventReceiver {
        self.events.subscribe()
    }

    /// Incremented on every successful swap; 0 until the first one
    pub async fn version(&self) -> u64 {
        self.snapshot.read().await.version
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Rebuild the catalog from the configured sources
    ///
    /// Skips when another refresh is running, or when `force` is false and
    /// the catalog is still fresh. On failure the previous catalog stays in
    /// place and the error is returned.
    pub async fn refresh(&self, force: bool) -> AppResult<RefreshOutcome> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Catalog refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped(SkipReason::InProgress));
        }
        let _guard = RefreshGuard(&self.refreshing);

        if !force && !self.is_stale().await {
            debug!("Catalog is fresh, skipping refresh");
            return Ok(RefreshOutcome::Skipped(SkipReason::Fresh));
        }

        info!("Refreshing catalog (forced: {})", force);
        match self.transformer.load_and_transform(&self.source_spec).await {
            Ok(catalog) => {
                let channels = catalog.len();
                let genres = catalog.genres().len();
                let version = {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.catalog = Arc::new(catalog);
                    snapshot.last_updated = Some(Utc::now());
                    snapshot.version += 1;
                    snapshot.version
                };

                info!(
                    "Catalog updated to version {}: {} channels, {} genres",
                    version, channels, genres
                );
                let _ = self.events.send(CacheEvent::Updated {
                    version,
                    channels,
                    genres,
                });
                Ok(RefreshOutcome::Completed)
            }
            Err(e) => {
                error!("Catalog refresh failed, keeping previous catalog: {}", e);
                let _ = self.events.send(CacheEvent::RefreshFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.snapshot.read().await.catalog)
    }

    pub async fn state(&self) -> CacheState {
        let snapshot = self.snapshot.read().await;
        CacheState {
            snapshot: Arc::clone(&snapshot.catalog),
            version: snapshot.version,
            last_updated: snapshot.last_updated,
            refreshing: self.is_refreshing(),
        }
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.last_updated
    }

    /// Never updated, or older than the update interval
    pub async fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now()).await
    }

    pub async fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_updated().await {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|age| age > self.update_interval),
        }
    }

    /// Time left before the catalog turns stale; `None` until the first
    /// successful refresh
    pub async fn time_until_stale(&self) -> Option<Duration> {
        self.time_until_stale_at(Utc::now()).await
    }

    pub async fn time_until_stale_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_updated().await?;
        let age = (now - last).to_std().unwrap_or(Duration::ZERO);
        Some(self.update_interval.saturating_sub(age))
    }

    /// Lookup by `tv|`-qualified identity, falling back to display name
    pub async fn find_channel(&self, id: &str) -> Option<Channel> {
        self.snapshot().await.find(id).cloned()
    }

    pub async fn channels_by_genre(&self, genre: &str) -> Vec<Channel> {
        self.snapshot()
            .await
            .by_genre(genre)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn search(&self, query: &str) -> Vec<Channel> {
        self.snapshot()
            .await
            .search(query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Default guide URL discovered in playlist headers
    pub async fn schedule_url(&self) -> Option<String> {
        self.snapshot().await.schedule_url().map(str::to_string)
    }

    /// A configured guide URL always wins over the discovered one
    pub async fn effective_epg_url(&self, configured: Option<&str>) -> Option<String> {
        match configured.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Some(url.to_string()),
            None => self.schedule_url().await,
        }
    }
}
