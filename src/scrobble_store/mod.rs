//! Local persistence for mirrored listening history.
//!
//! The sync engine only sees the two capability traits, [`Checkpoint`] and
//! [`ScrobbleStore`]; statistics are read through [`StatsStore`].

mod models;
mod schema;
mod sqlite_scrobble_store;

pub use models::*;
pub use schema::SCROBBLE_VERSIONED_SCHEMAS;
pub use sqlite_scrobble_store::SqliteScrobbleStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Source of the incremental sync lower bound.
pub trait Checkpoint: Send + Sync {
    /// Timestamp of the most recent persisted listen, `None` when nothing has
    /// been imported yet.
    fn last_listen_timestamp(&self) -> Result<Option<DateTime<Utc>>, CheckpointError>;
}

/// Idempotent writes used by the sync engine.
pub trait ScrobbleStore: Send + Sync {
    /// Creates the artist unless one with the same name exists.
    fn ensure_artist(&self, name: &str) -> Result<Insertion>;

    /// Creates the track unless one with the same `played_at` exists.
    fn ensure_track(&self, track: &NewTrack) -> Result<Insertion>;
}

pub trait StatsStore: Send + Sync {
    fn summary(&self) -> Result<ScrobbleSummary>;
    fn recent_tracks(&self, limit: usize) -> Result<Vec<RecentTrack>>;
    fn top_artists(&self, limit: usize) -> Result<Vec<TopArtist>>;
    fn top_albums(&self, limit: usize) -> Result<Vec<TopAlbum>>;
    fn top_songs(&self, limit: usize) -> Result<Vec<TopSong>>;
}
