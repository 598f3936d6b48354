//! Ingestion of playlists and guides, and the tasks that keep them current

pub mod guide;
pub mod playlist;
pub mod scheduler;

pub use guide::{GuideEvent, GuideStatus, ProgramGuide};
pub use playlist::PlaylistTransformer;
pub use scheduler::{GuideSchedule, RefreshScheduler};
