//! Scrobble Mirror Library
//!
//! Mirrors a Last.fm listening history into a local SQLite store. This
//! library exposes the internal modules for the binary and for testing.

pub mod background_jobs;
pub mod cli_style;
pub mod config;
pub mod feed;
pub mod scrobble_store;
pub mod sqlite_persistence;
pub mod stats;
pub mod sync;

// Re-export commonly used types for convenience
pub use feed::{LastFmClient, RecentTracksFeed};
pub use scrobble_store::{Checkpoint, ScrobbleStore, SqliteScrobbleStore, StatsStore};
pub use sync::{SyncEngine, SyncError, SyncReport, SyncSettings};
