use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled entry in a channel's guide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl Program {
    /// Inclusive on both ends
    pub fn is_airing_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.stop
    }
}
