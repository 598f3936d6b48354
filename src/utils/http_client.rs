use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::errors::{AppResult, FetchError};
use crate::utils::url::UrlUtils;

/// Retrieves raw document bytes from a URL
///
/// Decompression is not part of this contract; callers run the result through
/// [`crate::utils::DecompressionService`] so that every transport yields the
/// same ordered gzip/zlib/literal handling.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch URL and return the raw response body
    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>>;
}

/// Default [`SourceFetcher`] backed by reqwest
pub struct StandardHttpClient {
    client: Client,
    fetch_timeout: Duration,
}

impl StandardHttpClient {
    pub fn new(fetch_timeout: Duration, user_agent: &str) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(fetch_timeout)
            .build()
            .map_err(|e| FetchError::network("client", e.to_string()))?;

        Ok(Self {
            client,
            fetch_timeout,
        })
    }

    fn map_request_error(url: &str, error: reqwest::Error) -> FetchError {
        let url = UrlUtils::obfuscate_credentials(url);
        if error.is_timeout() {
            FetchError::Timeout { url }
        } else {
            FetchError::network(url, UrlUtils::obfuscate_credentials(&error.to_string()))
        }
    }

    async fn read_body(response: Response, url: &str) -> AppResult<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: UrlUtils::obfuscate_credentials(url),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_request_error(url, e))?;

        debug!("Fetched {} bytes of raw content", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceFetcher for StandardHttpClient {
    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        debug!("Fetching content from: {}", UrlUtils::obfuscate_credentials(url));

        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .header("Accept-Encoding", "gzip, deflate")
            .send()
            .await
            .map_err(|e| Self::map_request_error(url, e))?;

        Self::read_body(response, url).await
    }
}
