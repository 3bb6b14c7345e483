use crate::feed::PageCount;
use crate::scrobble_store::NewTrack;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Import,
    Update,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Import => write!(f, "import"),
            SyncMode::Update => write!(f, "update"),
        }
    }
}

/// How a pass that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every page down to page 1 was processed.
    Completed,
    /// An update pass reached a now-playing record and stopped there.
    StoppedAtNowPlaying,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub lower_bound: Option<DateTime<Utc>>,
    pub total_pages: u32,
    pub total_records: u64,
    pub pages_fetched: u32,
    pub records_seen: u64,
    pub tracks_created: u64,
    pub artists_created: u64,
    /// Records whose `played_at` was already stored.
    pub duplicates: u64,
    pub skipped_now_playing: u64,
    pub skipped_bad_timestamp: u64,
    pub outcome: PassOutcome,
}

impl SyncReport {
    pub(crate) fn new(mode: SyncMode, lower_bound: Option<DateTime<Utc>>, count: PageCount) -> Self {
        Self {
            mode,
            lower_bound,
            total_pages: count.total_pages,
            total_records: count.total_records,
            pages_fetched: 0,
            records_seen: 0,
            tracks_created: 0,
            artists_created: 0,
            duplicates: 0,
            skipped_now_playing: 0,
            skipped_bad_timestamp: 0,
            outcome: PassOutcome::Completed,
        }
    }
}

/// Receives progress from a running sync pass.
pub trait SyncReporter: Send + Sync {
    fn pass_started(&self, _mode: SyncMode, _count: PageCount) {}

    /// Called once per newly stored track. `sequence` is 1-based within the pass.
    fn track_created(&self, sequence: u64, total: u64, track: &NewTrack);

    fn pass_finished(&self, _report: &SyncReport) {}
}

/// Reports new tracks through `tracing`, used by the daemon.
pub struct LogReporter;

impl SyncReporter for LogReporter {
    fn track_created(&self, _sequence: u64, _total: u64, track: &NewTrack) {
        info!(
            "New scrobble: {} / {} - {} ({})",
            track.artist_name,
            track.album_name,
            track.title,
            track.played_at.format("%Y-%m-%d %H:%M")
        );
    }
}

/// Discards all progress.
pub struct NullReporter;

impl SyncReporter for NullReporter {
    fn track_created(&self, _sequence: u64, _total: u64, _track: &NewTrack) {}
}
