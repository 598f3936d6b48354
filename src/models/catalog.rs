use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use super::Channel;
use crate::config::defaults::DEFAULT_GENRE;

/// Immutable snapshot of known channels and genres
///
/// Produced wholesale by one transformation pass and only ever replaced,
/// never edited. Construct through [`CatalogBuilder`].
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    channels: Vec<Channel>,
    genres: BTreeSet<String>,
    built_at: DateTime<Utc>,
    /// Default guide URL declared by a playlist header, if any
    schedule_url: Option<String>,
}

impl Catalog {
    /// Catalog with no channels and only the default genre
    pub fn empty() -> Self {
        CatalogBuilder::new().build()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn genres(&self) -> &BTreeSet<String> {
        &self.genres
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn schedule_url(&self) -> Option<&str> {
        self.schedule_url.as_deref()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Lookup by namespace-qualified id, then by exact display name
    pub fn find(&self, id: &str) -> Option<&Channel> {
        let bare = id.strip_prefix(super::CHANNEL_ID_PREFIX).unwrap_or(id);
        let qualified = Channel::qualified_id(bare);

        self.channels
            .iter()
            .find(|ch| ch.id == qualified)
            .or_else(|| self.channels.iter().find(|ch| ch.name == bare))
    }

    /// Channels carrying exactly this genre tag
    pub fn by_genre(&self, genre: &str) -> Vec<&Channel> {
        self.channels.iter().filter(|ch| ch.has_genre(genre)).collect()
    }

    /// Case-insensitive substring match on the channel name
    pub fn search(&self, query: &str) -> Vec<&Channel> {
        let needle = query.to_lowercase();
        self.channels
            .iter()
            .filter(|ch| ch.name.to_lowercase().contains(&needle))
            .collect()
    }
}

/// Accumulates channels with first-wins identity deduplication
#[derive(Debug)]
pub struct CatalogBuilder {
    channels: Vec<Channel>,
    seen: HashSet<String>,
    genres: BTreeSet<String>,
    schedule_url: Option<String>,
    duplicates: usize,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        let mut genres = BTreeSet::new();
        genres.insert(DEFAULT_GENRE.to_string());

        Self {
            channels: Vec::new(),
            seen: HashSet::new(),
            genres,
            schedule_url: None,
            duplicates: 0,
        }
    }

    /// Add a channel unless its identity is already present.
    /// Returns false for a duplicate; its genres are still collected.
    pub fn push(&mut self, channel: Channel) -> bool {
        self.genres.extend(channel.genres.iter().cloned());
        if !self.seen.insert(channel.identity.clone()) {
            self.duplicates += 1;
            return false;
        }
        self.channels.push(channel);
        true
    }

    pub fn add_genre<S: Into<String>>(&mut self, genre: S) {
        self.genres.insert(genre.into());
    }

    /// Keep the first non-empty schedule URL only
    pub fn offer_schedule_url(&mut self, url: Option<&str>) {
        if self.schedule_url.is_none()
            && let Some(url) = url.map(str::trim).filter(|u| !u.is_empty())
        {
            self.schedule_url = Some(url.to_string());
        }
    }

    /// Fold another catalog in: channels first-wins, genres unioned
    pub fn merge(&mut self, other: Catalog) {
        self.offer_schedule_url(other.schedule_url.as_deref());
        self.genres.extend(other.genres);
        for channel in other.channels {
            self.push(channel);
        }
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn build(self) -> Catalog {
        Catalog {
            channels: self.channels,
            genres: self.genres,
            built_at: Utc::now(),
            schedule_url: self.schedule_url,
        }
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
