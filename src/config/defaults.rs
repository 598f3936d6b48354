/// Configuration default values
///
/// All default values for configuration options live here so they can be
/// changed in one place.
use std::time::Duration;

// Sources
pub const DEFAULT_PLAYLIST_URL: &str =
    "https://raw.githubusercontent.com/kadeschs/FluxusTV/refs/heads/main/link.playlist";
pub const DEFAULT_EPG_URL: &str =
    "https://raw.githubusercontent.com/kadeschs/FluxusTV/refs/heads/main/link.epg";

// Catalog cache
pub const DEFAULT_CACHE_UPDATE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

// Program guide
pub const DEFAULT_EPG_ENABLED: bool = true;
pub const DEFAULT_EPG_UPDATE_CRON: &str = "0 0 3 * * *";
pub const DEFAULT_TIMEZONE_OFFSET: &str = "+1:00";
pub const DEFAULT_EPG_BATCH_SIZE: usize = 10_000;
pub const EPG_FRESHNESS_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_UPCOMING_LIMIT: usize = 2;

// HTTP
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

// Proxy resolver cache
pub const DEFAULT_PROXY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PROXY_CACHE_CAPACITY: usize = 1000;

// Catalog listing
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_GENRE: &str = "Other channels";
