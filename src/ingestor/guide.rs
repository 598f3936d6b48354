//! Electronic program guide
//!
//! Holds the per-channel ordered schedule parsed from XMLTV documents and
//! answers time-windowed queries against it.
//!
//! A refresh clears the guide and repopulates it in place, one document at a
//! time. Readers running concurrently with a refresh can observe an empty or
//! partially filled guide until it completes; use [`ProgramGuide::is_available`]
//! to tell the two states apart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::cache::{RefreshOutcome, SkipReason};
use crate::config::defaults::{DEFAULT_UPCOMING_LIMIT, EPG_FRESHNESS_THRESHOLD};
use crate::errors::AppResult;
use crate::models::Program;
use crate::sources::resolve_documents;
use crate::sources::xmltv::{XmltvProgramme, parse_programmes};
use crate::utils::SourceFetcher;
use crate::utils::time::DisplayOffset;
use crate::utils::url::UrlUtils;

pub type GuideEventSender = broadcast::Sender<GuideEvent>;
pub type GuideEventReceiver = broadcast::Receiver<GuideEvent>;

/// Notifications published while the guide refreshes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuideEvent {
    Refreshed {
        channels: usize,
        programs: usize,
        failed_documents: usize,
    },
    DocumentFailed {
        url: String,
        message: String,
    },
}

/// Snapshot of the guide for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideStatus {
    pub updating: bool,
    /// Local display time of the last refresh, or `"Never"`
    pub last_update: String,
    pub channel_count: usize,
    pub program_count: usize,
    pub timezone: String,
}

/// Clears the updating flag on every exit path
struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ProgramGuide {
    fetcher: Arc<dyn SourceFetcher>,
    programs: RwLock<HashMap<String, Vec<Program>>>,
    updating: AtomicBool,
    last_update: RwLock<Option<DateTime<Utc>>>,
    display_offset: DisplayOffset,
    batch_size: usize,
    events: GuideEventSender,
}

impl ProgramGuide {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        display_offset: DisplayOffset,
        batch_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            fetcher,
            programs: RwLock::new(HashMap::new()),
            updating: AtomicBool::new(false),
            last_update: RwLock::new(None),
            display_offset,
            batch_size: batch_size.max(1),
            events,
        }
    }

    pub fn subscribe(&self) -> GuideEventReceiver {
        self.events.subscribe()
    }

    pub fn display_offset(&self) -> DisplayOffset {
        self.display_offset
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Replace the guide with the content of every document in `spec`
    ///
    /// Returns immediately with [`SkipReason::InProgress`] when a refresh is
    /// already running. Failed documents are reported through events and logs
    /// and do not stop the remaining ones.
    pub async fn refresh(&self, spec: &str) -> AppResult<RefreshOutcome> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Guide refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped(SkipReason::InProgress));
        }
        let _guard = UpdatingGuard(&self.updating);

        info!("Starting guide refresh");
        let started = Instant::now();

        let documents = match resolve_documents(self.fetcher.as_ref(), spec).await {
            Ok(documents) => documents,
            Err(e) => {
                *self.last_update.write().await = Some(Utc::now());
                return Err(e);
            }
        };

        self.programs.write().await.clear();

        let mut failed_documents = 0;
        for document in documents {
            let result = match document.content {
                Ok(content) => self.ingest_document(&content).await,
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                failed_documents += 1;
                let url = UrlUtils::obfuscate_credentials(&document.url);
                warn!("Guide document {} failed: {}", url, e);
                let _ = self.events.send(GuideEvent::DocumentFailed {
                    url,
                    message: e.to_string(),
                });
            }
        }

        let (channels, programs) = {
            let mut guide = self.programs.write().await;
            for entries in guide.values_mut() {
                entries.sort_by_key(|p| p.start);
            }
            (guide.len(), guide.values().map(Vec::len).sum::<usize>())
        };
        *self.last_update.write().await = Some(Utc::now());

        info!(
            "Guide refresh completed in {:.1}s: {} channels, {} programs, {} failed documents",
            started.elapsed().as_secs_f64(),
            channels,
            programs,
            failed_documents
        );
        let _ = self.events.send(GuideEvent::Refreshed {
            channels,
            programs,
            failed_documents,
        });

        Ok(RefreshOutcome::Completed)
    }

    /// Parse one document into a staging map, then publish it into the guide
    async fn ingest_document(&self, content: &str) -> AppResult<()> {
        let mut staged: HashMap<String, Vec<Program>> = HashMap::new();
        let stats = parse_programmes(content, self.batch_size, |batch| {
            stage_batch(&mut staged, batch)
        })?;

        if stats.dropped > 0 {
            debug!("Dropped {} unparseable schedule entries", stats.dropped);
        }

        let mut guide = self.programs.write().await;
        for (channel, entries) in staged {
            guide.entry(channel).or_default().extend(entries);
        }
        Ok(())
    }

    /// First entry whose `[start, stop]` contains `now`
    pub async fn current_program(&self, channel_id: &str) -> Option<Program> {
        self.current_program_at(channel_id, Utc::now()).await
    }

    pub async fn current_program_at(
        &self,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Program> {
        let guide = self.programs.read().await;
        guide
            .get(channel_id)?
            .iter()
            .find(|p| p.is_airing_at(now))
            .cloned()
    }

    /// Up to `limit` entries starting at or after now, ascending
    pub async fn upcoming(&self, channel_id: &str, limit: Option<usize>) -> Vec<Program> {
        self.upcoming_at(channel_id, Utc::now(), limit.unwrap_or(DEFAULT_UPCOMING_LIMIT))
            .await
    }

    pub async fn upcoming_at(
        &self,
        channel_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<Program> {
        let guide = self.programs.read().await;
        guide
            .get(channel_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|p| p.start >= now)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read().await
    }

    /// Never refreshed, or last refreshed more than a day ago
    pub async fn needs_update(&self) -> bool {
        self.needs_update_at(Utc::now()).await
    }

    pub async fn needs_update_at(&self, now: DateTime<Utc>) -> bool {
        match *self.last_update.read().await {
            None => true,
            Some(last) => (now - last).to_std().is_ok_and(|age| age >= EPG_FRESHNESS_THRESHOLD),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.programs.read().await.is_empty()
    }

    /// Guide holds data and no refresh is repopulating it
    pub async fn is_available(&self) -> bool {
        !self.is_updating() && !self.is_empty().await
    }

    pub async fn status(&self) -> GuideStatus {
        let (channel_count, program_count) = {
            let guide = self.programs.read().await;
            (guide.len(), guide.values().map(Vec::len).sum::<usize>())
        };
        let last_update = match *self.last_update.read().await {
            Some(at) => self.display_offset.format_time(at),
            None => "Never".to_string(),
        };

        GuideStatus {
            updating: self.is_updating(),
            last_update,
            channel_count,
            program_count,
            timezone: self.display_offset.to_string(),
        }
    }
}

fn stage_batch(staged: &mut HashMap<String, Vec<Program>>, batch: Vec<XmltvProgramme>) {
    for XmltvProgramme { channel, program } in batch {
        staged.entry(channel).or_default().push(program);
    }
}
