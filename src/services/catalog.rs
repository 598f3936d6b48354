//! Catalog read model
//!
//! Consumer-facing view over the cache, the program guide and the proxy
//! resolver. Nothing here surfaces a raw error: failures degrade to empty
//! results or a descriptive placeholder stream.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cache::CacheOrchestrator;
use crate::config::defaults::DEFAULT_PAGE_SIZE;
use crate::errors::{AppError, AppResult};
use crate::ingestor::ProgramGuide;
use crate::models::{Channel, Program};
use crate::proxy::ProxyResolver;
use crate::utils::time::DisplayOffset;
use crate::utils::url::UrlUtils;

/// Listing filters; `genre` takes priority over `search`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub genre: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub skip: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogPage {
    pub metas: Vec<ChannelMeta>,
    pub genres: Vec<String>,
}

/// Presentation record for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMeta {
    pub id: String,
    /// Prefixed with `"<n>. "` when the channel has an ordinal
    pub name: String,
    pub logo: Option<String>,
    pub genres: Vec<String>,
    pub description: String,
    /// `LIVE`, or what is on air right now
    pub release_info: String,
}

/// One playable option for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub name: String,
    pub title: String,
    /// Empty for the error placeholder
    pub url: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEntry {
    fn placeholder(error: &AppError) -> Self {
        Self {
            name: "Error".to_string(),
            title: "Error loading stream".to_string(),
            url: String::new(),
            headers: BTreeMap::new(),
            error: Some(format!("Error: {error}")),
        }
    }
}

/// Schedule text attached to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    /// Listing form: current programme and upcoming titles
    Summary,
    /// Meta form: upcoming entries carry description and category
    Full,
}

pub struct CatalogService {
    cache: Arc<CacheOrchestrator>,
    guide: Option<Arc<ProgramGuide>>,
    proxy: Arc<dyn ProxyResolver>,
    force_proxy: bool,
    page_size: usize,
}

impl CatalogService {
    pub fn new(
        cache: Arc<CacheOrchestrator>,
        guide: Option<Arc<ProgramGuide>>,
        proxy: Arc<dyn ProxyResolver>,
        force_proxy: bool,
    ) -> Self {
        Self {
            cache,
            guide,
            proxy,
            force_proxy,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// One page of the catalog, refreshing first when the catalog is stale
    pub async fn catalog(&self, query: &CatalogQuery) -> CatalogPage {
        if let Err(e) = self.refresh_if_stale().await {
            warn!("Serving catalog without refresh: {}", e);
            if self.cache.snapshot().await.is_empty() {
                return CatalogPage::default();
            }
        }

        let catalog = self.cache.snapshot().await;
        let mut channels: Vec<&Channel> = match (&query.genre, &query.search) {
            (Some(genre), _) => catalog.by_genre(genre),
            (None, Some(search)) => catalog.search(search),
            (None, None) => catalog.channels().iter().collect(),
        };
        channels.sort_by(|a, b| compare_for_listing(a, b));

        let mut metas = Vec::new();
        for channel in channels.into_iter().skip(query.skip).take(self.page_size) {
            metas.push(self.build_meta(channel, Detail::Summary).await);
        }

        debug!(
            "Catalog page: {} metas (skip {}, genre {:?}, search {:?})",
            metas.len(),
            query.skip,
            query.genre,
            query.search
        );
        CatalogPage {
            metas,
            genres: catalog.genres().iter().cloned().collect(),
        }
    }

    /// Detailed presentation of one channel
    pub async fn meta(&self, id: &str) -> Option<ChannelMeta> {
        if let Err(e) = self.refresh_if_stale().await {
            warn!("Serving channel meta without refresh: {}", e);
        }

        let channel = self.cache.find_channel(id).await?;
        Some(self.build_meta(&channel, Detail::Full).await)
    }

    /// Playable options for a channel
    ///
    /// Unknown ids yield no entries. An internal failure yields a single
    /// placeholder entry with an empty URL describing the problem.
    pub async fn streams(&self, id: &str) -> Vec<StreamEntry> {
        let Some(channel) = self.cache.find_channel(id).await else {
            debug!("Stream request for unknown channel {}", id);
            return Vec::new();
        };

        match self.resolve_streams(&channel).await {
            Ok(streams) => streams,
            Err(e) => {
                error!("Failed to load streams for {}: {}", channel.id, e);
                vec![StreamEntry::placeholder(&e)]
            }
        }
    }

    async fn resolve_streams(&self, channel: &Channel) -> AppResult<Vec<StreamEntry>> {
        UrlUtils::parse_and_validate(&channel.stream.url).map_err(|e| {
            AppError::malformed(
                format!("stream of {}", channel.id),
                format!(
                    "invalid URL '{}': {}",
                    UrlUtils::obfuscate_credentials(&channel.stream.url),
                    e
                ),
            )
        })?;

        let mut streams = Vec::new();
        if !self.force_proxy {
            streams.push(StreamEntry {
                name: channel.name.clone(),
                title: channel.name.clone(),
                url: channel.stream.url.clone(),
                headers: channel.stream.headers.clone(),
                error: None,
            });
        }

        for alternate in self.proxy.resolve(channel).await {
            streams.push(StreamEntry {
                title: alternate.name.clone(),
                name: alternate.name,
                url: alternate.url,
                headers: BTreeMap::new(),
                error: None,
            });
        }
        Ok(streams)
    }

    async fn refresh_if_stale(&self) -> AppResult<()> {
        if self.cache.is_stale().await {
            self.cache.refresh(false).await?;
        }
        Ok(())
    }

    async fn build_meta(&self, channel: &Channel, detail: Detail) -> ChannelMeta {
        let mut meta = ChannelMeta {
            id: channel.id.clone(),
            name: channel.display_name(),
            logo: channel.logo.clone(),
            genres: channel.genres.clone(),
            description: match (detail, channel.number) {
                (Detail::Full, Some(number)) => format!("Channel {number}"),
                _ => format!("Channel: {}", channel.name),
            },
            release_info: "LIVE".to_string(),
        };

        let Some(guide) = &self.guide else {
            return meta;
        };
        let Some(current) = guide.current_program(&channel.identity).await else {
            return meta;
        };
        let upcoming = guide.upcoming(&channel.identity, None).await;
        let offset = guide.display_offset();

        meta.description = describe_schedule(&current, &upcoming, offset, detail);
        meta.release_info = match detail {
            Detail::Summary => format!("On air: {}", current.title),
            Detail::Full => format!("{} ({})", current.title, offset.format_time(current.start)),
        };
        meta
    }
}

/// Ordinal ascending with unnumbered channels last, then by name
fn compare_for_listing(a: &Channel, b: &Channel) -> Ordering {
    let by_number = match (a.number, b.number) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_number
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

fn describe_schedule(
    current: &Program,
    upcoming: &[Program],
    offset: DisplayOffset,
    detail: Detail,
) -> String {
    let mut lines = vec![format!("ON AIR NOW: {}", current.title)];

    if let Some(description) = &current.description {
        lines.push(description.clone());
    }
    lines.push(format!(
        "Time: {} - {}",
        offset.format_time(current.start),
        offset.format_time(current.stop)
    ));
    if let Some(category) = &current.category {
        lines.push(format!("Category: {category}"));
    }

    if !upcoming.is_empty() {
        lines.push(String::new());
        lines.push("UPCOMING:".to_string());
        for program in upcoming {
            lines.push(format!("{} - {}", offset.format_time(program.start), program.title));
            if detail == Detail::Full {
                if let Some(description) = &program.description {
                    lines.push(format!("  {description}"));
                }
                if let Some(category) = &program.category {
                    lines.push(format!("  Category: {category}"));
                }
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamDescriptor;
    use chrono::{TimeZone, Utc};

    fn channel(name: &str, number: Option<u32>) -> Channel {
        Channel {
            id: Channel::qualified_id(name),
            identity: name.to_string(),
            name: name.to_string(),
            genres: vec!["News".to_string()],
            logo: None,
            number,
            stream: StreamDescriptor::new("http://s/x"),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_listing_order() {
        let mut channels = [
            channel("zeta", None),
            channel("Alpha", None),
            channel("beta", Some(2)),
            channel("gamma", Some(1)),
        ];
        channels.sort_by(compare_for_listing);
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gamma", "beta", "Alpha", "zeta"]);
    }

    #[test]
    fn test_describe_schedule() {
        let at = |h, m| Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap();
        let current = Program {
            start: at(17, 0),
            stop: at(18, 0),
            title: "News".to_string(),
            description: Some("Headlines".to_string()),
            category: Some("Info".to_string()),
        };
        let next = Program {
            start: at(18, 0),
            stop: at(19, 0),
            title: "Film".to_string(),
            description: Some("A film".to_string()),
            category: None,
        };

        let summary = describe_schedule(
            &current,
            std::slice::from_ref(&next),
            DisplayOffset::default(),
            Detail::Summary,
        );
        assert_eq!(
            summary,
            "ON AIR NOW: News\nHeadlines\nTime: 18:00 - 19:00\nCategory: Info\n\nUPCOMING:\n19:00 - Film"
        );

        let full = describe_schedule(&current, &[next], DisplayOffset::default(), Detail::Full);
        assert!(full.ends_with("19:00 - Film\n  A film"));
    }
}
