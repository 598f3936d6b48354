use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::guide::ProgramGuide;
use crate::cache::{CacheOrchestrator, RefreshOutcome};
use crate::errors::{AppError, AppResult};

/// Margin past the staleness deadline so the refresh sees the catalog as stale
const STALENESS_SLACK: Duration = Duration::from_millis(50);

/// Lower bound between catalog checks
const MIN_CATALOG_WAIT: Duration = Duration::from_millis(500);

/// Guide refresh settings for the scheduler
#[derive(Debug, Clone)]
pub struct GuideSchedule {
    pub cron: Schedule,
    /// Configured guide source; falls back to the playlist-declared URL
    pub configured_url: Option<String>,
}

impl GuideSchedule {
    pub fn new(expression: &str, configured_url: Option<String>) -> AppResult<Self> {
        let cron = Schedule::from_str(expression).map_err(|e| {
            AppError::configuration(format!("Invalid cron expression '{expression}': {e}"))
        })?;
        Ok(Self { cron, configured_url })
    }
}

/// Owns the background refresh tasks
///
/// The catalog task sleeps until the catalog turns stale and then requests a
/// non-forced refresh; after a failure it retries one update interval later. The
/// guide task refreshes once at startup when the guide is empty, then on the
/// cron cadence. Both stop when the token is cancelled.
pub struct RefreshScheduler {
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn start(
        cache: Arc<CacheOrchestrator>,
        guide: Option<(Arc<ProgramGuide>, GuideSchedule)>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut handles = Vec::new();

        handles.push(tokio::spawn(run_catalog_ticker(
            Arc::clone(&cache),
            cancellation_token.clone(),
        )));

        if let Some((guide, schedule)) = guide {
            handles.push(tokio::spawn(run_guide_schedule(
                cache,
                guide,
                schedule,
                cancellation_token.clone(),
            )));
        }

        info!("Refresh scheduler started with {} tasks", handles.len());
        Self {
            cancellation_token,
            handles,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Cancel both tasks and wait for them to finish
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Refresh scheduler stopped");
    }
}

async fn run_catalog_ticker(cache: Arc<CacheOrchestrator>, cancellation_token: CancellationToken) {
    // Startup performs its own refresh, so the first wait is never zero
    let mut wait = next_catalog_check(&cache).await;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                wait = match cache.refresh(false).await {
                    Ok(RefreshOutcome::Completed) => {
                        debug!("Scheduled catalog refresh completed");
                        next_catalog_check(&cache).await
                    }
                    Ok(RefreshOutcome::Skipped(reason)) => {
                        debug!("Scheduled catalog refresh skipped: {:?}", reason);
                        next_catalog_check(&cache).await
                    }
                    Err(e) => {
                        error!("Scheduled catalog refresh failed: {}", e);
                        cache.update_interval().max(MIN_CATALOG_WAIT)
                    }
                };
            }
            _ = cancellation_token.cancelled() => {
                info!("Catalog ticker received cancellation signal, shutting down");
                break;
            }
        }
    }
}

/// Sleep until just past the moment the catalog turns stale, or one
/// interval when it has never loaded
async fn next_catalog_check(cache: &CacheOrchestrator) -> Duration {
    let wait = match cache.time_until_stale().await {
        Some(left) => left + STALENESS_SLACK,
        None => cache.update_interval(),
    };
    wait.max(MIN_CATALOG_WAIT)
}

async fn run_guide_schedule(
    cache: Arc<CacheOrchestrator>,
    guide: Arc<ProgramGuide>,
    schedule: GuideSchedule,
    cancellation_token: CancellationToken,
) {
    if guide.is_empty().await {
        refresh_guide(&cache, &guide, &schedule).await;
    }

    loop {
        let Some(next) = schedule.cron.upcoming(Utc).next() else {
            warn!("Guide cron schedule has no upcoming run, stopping guide task");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(
            "Next guide refresh at {}",
            next.format("%Y-%m-%d %H:%M:%S UTC")
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                refresh_guide(&cache, &guide, &schedule).await;
            }
            _ = cancellation_token.cancelled() => {
                info!("Guide scheduler received cancellation signal, shutting down");
                break;
            }
        }
    }
}

async fn refresh_guide(cache: &CacheOrchestrator, guide: &ProgramGuide, schedule: &GuideSchedule) {
    let Some(url) = cache.effective_epg_url(schedule.configured_url.as_deref()).await else {
        warn!("No guide URL configured or declared by the playlist, skipping guide refresh");
        return;
    };

    match guide.refresh(&url).await {
        Ok(RefreshOutcome::Completed) => {}
        Ok(RefreshOutcome::Skipped(reason)) => debug!("Guide refresh skipped: {:?}", reason),
        Err(e) => error!("Guide refresh failed: {}", e),
    }
}
