//! URL utilities for consistent URL handling
//!
//! Source URLs frequently embed provider credentials, either as userinfo or
//! as query parameters. Anything that ends up in a log line or an error
//! message goes through [`UrlUtils::obfuscate_credentials`] first.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SENSITIVE_QUERY_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:username|password|user|pass|pwd|passwd|api_password|token)=)[^&\s]*")
        .expect("static regex is valid")
});

static SCHEME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S").expect("static regex is valid")
});

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Whether a line is an absolute `http://` or `https://` URL
    pub fn is_http_url(line: &str) -> bool {
        let line = line.trim();
        let lower = line.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
        (lower.starts_with("http://") || lower.starts_with("https://"))
            && Url::parse(line).is_ok()
    }

    /// Whether a line has the `scheme://` shape of a stream locator
    ///
    /// Only the shape is checked; `rtmp://` or `udp://` locators pass, and a
    /// shaped line may still fail [`UrlUtils::parse_and_validate`].
    pub fn has_scheme(line: &str) -> bool {
        SCHEME_PREFIX.is_match(line.trim())
    }

    /// Parse and validate a URL
    pub fn parse_and_validate(url: &str) -> Result<Url, url::ParseError> {
        Url::parse(url.trim())
    }

    /// Replace embedded credentials with `****`
    ///
    /// ```rust
    /// use iptv_guide::utils::url::UrlUtils;
    ///
    /// assert_eq!(
    ///     UrlUtils::obfuscate_credentials("http://example.com/get.php?username=bob&password=secret"),
    ///     "http://example.com/get.php?username=****&password=****"
    /// );
    /// ```
    pub fn obfuscate_credentials(url: &str) -> String {
        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url)
            && (!parsed.username().is_empty() || parsed.password().is_some())
        {
            let mut new_url = parsed.clone();
            let _ = new_url.set_username("****");
            let _ = new_url.set_password(Some("****"));
            obfuscated = new_url.to_string();
        }

        SENSITIVE_QUERY_PARAMS
            .replace_all(&obfuscated, "${1}****")
            .to_string()
    }
}
