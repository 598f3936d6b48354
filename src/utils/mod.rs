//! Utility modules shared by the ingestion and caching layers

pub mod decompression;
pub mod http_client;
pub mod time;
pub mod url;

pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::{SourceFetcher, StandardHttpClient};
