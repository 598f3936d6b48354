//! Source specification resolution
//!
//! A configured source is a single URL, a comma or newline separated list of
//! URLs, or the URL of a list file whose body is itself a URL list. This
//! module turns any of those into the concrete documents to ingest.

use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult, FetchError};
use crate::utils::url::UrlUtils;
use crate::utils::{DecompressionService, SourceFetcher};

/// One final document and the outcome of retrieving it
#[derive(Debug)]
pub struct SourceDocument {
    pub url: String,
    pub content: AppResult<String>,
}

impl SourceDocument {
    pub fn is_ok(&self) -> bool {
        self.content.is_ok()
    }
}

/// Split a source specification on commas and newlines
pub fn split_source_spec(spec: &str) -> Vec<String> {
    spec.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a fetched body is a list of URLs rather than a document
///
/// Bodies starting with `#EXTM3U` or `<` are always documents.
pub fn is_url_list(body: &str) -> bool {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("#EXTM3U") || trimmed.starts_with('<') {
        return false;
    }

    let mut lines = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .peekable();

    lines.peek().is_some() && lines.all(UrlUtils::is_http_url)
}

/// Fetch and decode one URL
pub async fn fetch_document(fetcher: &dyn SourceFetcher, url: &str) -> AppResult<String> {
    let bytes = fetcher.fetch_bytes(url).await?;
    let (text, _format) = DecompressionService::decompress_document(&bytes)?;
    Ok(text)
}

/// Resolve a source specification into documents
///
/// List files are expanded one level only: a URL listed inside a list file is
/// always treated as a document. Failures are reported per document so one
/// bad source never hides the others.
pub async fn resolve_documents(
    fetcher: &dyn SourceFetcher,
    spec: &str,
) -> AppResult<Vec<SourceDocument>> {
    let entries = split_source_spec(spec);
    if entries.is_empty() {
        return Err(FetchError::EmptySource.into());
    }

    let mut documents = Vec::new();
    for entry in entries {
        let content = fetch_document(fetcher, &entry).await;

        match content {
            Ok(body) if is_url_list(&body) => {
                let listed: Vec<String> = body
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect();
                info!(
                    "Source {} is a list of {} URLs",
                    UrlUtils::obfuscate_credentials(&entry),
                    listed.len()
                );

                for url in listed {
                    let content = fetch_document(fetcher, &url).await;
                    documents.push(SourceDocument { url, content });
                }
            }
            content => {
                debug!("Source {} is a document", UrlUtils::obfuscate_credentials(&entry));
                documents.push(SourceDocument { url: entry, content });
            }
        }
    }

    Ok(documents)
}

/// Turn per-document outcomes into the successful bodies
///
/// Failed documents are logged and skipped. If every document failed the
/// last error is returned as [`AppError::AllSourcesFailed`].
pub fn successful_documents(documents: Vec<SourceDocument>) -> AppResult<Vec<(String, String)>> {
    let attempted = documents.len();
    let mut last_error = None;
    let mut bodies = Vec::with_capacity(attempted);

    for document in documents {
        match document.content {
            Ok(body) => bodies.push((document.url, body)),
            Err(e) => {
                warn!(
                    "Skipping source {}: {}",
                    UrlUtils::obfuscate_credentials(&document.url),
                    e
                );
                last_error = Some(e.to_string());
            }
        }
    }

    if bodies.is_empty() {
        return Err(AppError::AllSourcesFailed {
            attempted,
            last_error: last_error.unwrap_or_else(|| "no documents resolved".to_string()),
        });
    }
    Ok(bodies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::io::Write;

    #[derive(Default)]
    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl MapFetcher {
        fn with(mut self, url: &str, body: impl AsRef<[u8]>) -> Self {
            self.0.insert(url.to_string(), body.as_ref().to_vec());
            self
        }
    }

    #[async_trait]
    impl SourceFetcher for MapFetcher {
        async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
            self.0.get(url).cloned().ok_or_else(|| {
                FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }
                .into()
            })
        }
    }

    #[rstest]
    #[case("http://a/1.m3u", vec!["http://a/1.m3u"])]
    #[case(" http://a/1.m3u , http://b/2.m3u ", vec!["http://a/1.m3u", "http://b/2.m3u"])]
    #[case("http://a/1\nhttp://b/2\r\n", vec!["http://a/1", "http://b/2"])]
    #[case(" , ", vec![])]
    fn test_split_source_spec(#[case] spec: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_source_spec(spec), expected);
    }

    #[rstest]
    #[case("http://a/1.m3u\nhttps://b/2.m3u\n", true)]
    #[case("# my lists\nhttp://a/1.m3u\n\n", true)]
    #[case("#EXTM3U\nhttp://a/stream\n", false)]
    #[case("<?xml version=\"1.0\"?><tv/>", false)]
    #[case("http://a/1.m3u\nnot a url\n", false)]
    #[case("", false)]
    fn test_is_url_list(#[case] body: &str, #[case] expected: bool) {
        assert_eq!(is_url_list(body), expected);
    }

    #[tokio::test]
    async fn test_list_file_is_expanded() {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(b"#EXTM3U\n").unwrap();
        let compressed = gz.finish().unwrap();

        let fetcher = MapFetcher::default()
            .with("http://lists/all.txt", "http://p/1.m3u\nhttp://p/missing.m3u\n")
            .with("http://p/1.m3u", compressed);

        let documents = resolve_documents(&fetcher, "http://lists/all.txt").await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].url, "http://p/1.m3u");
        assert_eq!(documents[0].content.as_deref().unwrap(), "#EXTM3U\n");
        assert!(!documents[1].is_ok());

        let bodies = successful_documents(documents).unwrap();
        assert_eq!(bodies.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_documents() {
        let fetcher = MapFetcher::default();
        let documents = resolve_documents(&fetcher, "http://x/1,http://x/2").await.unwrap();
        assert_eq!(documents.len(), 2);

        let result = successful_documents(documents);
        assert!(matches!(
            result,
            Err(AppError::AllSourcesFailed { attempted: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_spec() {
        let fetcher = MapFetcher::default();
        let result = resolve_documents(&fetcher, "  ").await;
        assert!(matches!(result, Err(AppError::Fetch(FetchError::EmptySource))));
    }
}
