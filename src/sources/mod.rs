//! Source document handling
//!
//! Resolution of configured sources into fetched documents, and the format
//! parsers for the two document kinds: M3U playlists and XMLTV guides.

pub mod m3u;
pub mod resolver;
pub mod xmltv;

pub use resolver::{SourceDocument, resolve_documents, successful_documents};
