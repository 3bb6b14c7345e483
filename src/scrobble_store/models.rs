use chrono::{DateTime, Utc};
use thiserror::Error;

/// An artist row. Created the first time a listen by that artist is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: i64,
    pub name: String,
}

/// A persisted play event. `played_at` is unique across all tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: i64,
    pub artist_id: i64,
    pub artist_name: String,
    pub album_name: String,
    pub title: String,
    pub played_at: DateTime<Utc>,
}

/// A play event ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub artist_name: String,
    pub album_name: String,
    pub title: String,
    pub played_at: DateTime<Utc>,
}

/// Outcome of an insert-if-absent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// No row matched the unique key, a new one was written.
    Created,
    /// A row with the same unique key already existed, nothing was written.
    Existing,
}

impl Insertion {
    pub fn is_created(&self) -> bool {
        matches!(self, Insertion::Created)
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Stored last listen timestamp is malformed: {0}")]
    Malformed(String),

    #[error("Could not read last listen timestamp: {0}")]
    Unavailable(String),
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleSummary {
    pub scrobbles: i64,
    pub artists: i64,
    pub first_played_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentTrack {
    pub artist_name: String,
    pub title: String,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopArtist {
    pub artist_name: String,
    pub plays: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopAlbum {
    pub artist_name: String,
    pub album_name: String,
    pub plays: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopSong {
    pub artist_name: String,
    pub title: String,
    pub plays: i64,
}
