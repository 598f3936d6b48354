use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::AppResult;
use crate::models::{Catalog, CatalogBuilder};
use crate::sources::m3u;
use crate::sources::{resolve_documents, successful_documents};
use crate::utils::SourceFetcher;
use crate::utils::url::UrlUtils;

/// Builds a [`Catalog`] from one or more playlist sources
pub struct PlaylistTransformer {
    fetcher: Arc<dyn SourceFetcher>,
}

impl PlaylistTransformer {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Parse a single playlist body. Deterministic for identical input.
    pub fn transform(&self, raw: &str) -> Catalog {
        m3u::parse_playlist(raw)
    }

    /// Fetch every playlist named by `spec` and merge them
    ///
    /// Channels are merged by identity with the first source winning, genre
    /// sets are unioned, and the first declared schedule URL is kept. Failing
    /// sources are skipped; the call only fails when none succeeded.
    pub async fn load_and_transform(&self, spec: &str) -> AppResult<Catalog> {
        let started = Instant::now();
        let documents = resolve_documents(self.fetcher.as_ref(), spec).await?;
        let bodies = successful_documents(documents)?;

        let mut builder = CatalogBuilder::new();
        for (url, body) in bodies {
            let catalog = self.transform(&body);
            debug!(
                "Playlist {} contributed {} channels",
                UrlUtils::obfuscate_credentials(&url),
                catalog.len()
            );
            builder.merge(catalog);
        }

        let duplicates = builder.duplicates();
        let catalog = builder.build();
        info!(
            "Built catalog in {}ms: {} channels, {} genres, {} cross-source duplicates",
            started.elapsed().as_millis(),
            catalog.len(),
            catalog.genres().len(),
            duplicates
        );
        Ok(catalog)
    }
}
