use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod catalog;
pub mod program;

pub use catalog::{Catalog, CatalogBuilder};
pub use program::Program;

/// Namespace prefix of every channel id handed to consumers
pub const CHANNEL_ID_PREFIX: &str = "tv|";

/// How to reach a channel's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub url: String,
    /// Delivery headers, e.g. `User-Agent`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("User-Agent").map(String::as_str)
    }
}

/// One live-TV entry of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Namespace-qualified id, `tv|<identity>`
    pub id: String,
    /// Schedule identifier when declared, else the trimmed display name
    pub identity: String,
    pub name: String,
    pub genres: Vec<String>,
    pub logo: Option<String>,
    /// Ordinal used for display sorting
    pub number: Option<u32>,
    pub stream: StreamDescriptor,
    /// Remaining `key="value"` attributes of the playlist record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Channel {
    pub fn qualified_id(identity: &str) -> String {
        format!("{CHANNEL_ID_PREFIX}{identity}")
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }

    /// Name prefixed with the channel number when one is known
    pub fn display_name(&self) -> String {
        match self.number {
            Some(number) => format!("{}. {}", number, self.name),
            None => self.name.clone(),
        }
    }
}
