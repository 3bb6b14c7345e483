//! Common test infrastructure
//!
//! Provides a scripted in-memory listening history that behaves like the
//! paginated Last.fm feed, and an in-memory store, so sync passes can be run
//! end to end without network or disk.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{listen, engine, MemoryStore, ScriptedFeed};
//!
//! let feed = ScriptedFeed::new(vec![listen("Low", "Things We Lost", "Sunflower", 2)]);
//! let store = MemoryStore::new();
//! let report = engine(&feed, &store, 50).import(&Default::default()).unwrap();
//! assert_eq!(report.tracks_created, 1);
//! ```

#![allow(dead_code)]

mod fakes;

pub use fakes::{MemoryStore, ScriptedFeed};

use chrono::{DateTime, Duration, TimeZone, Utc};
use scrobble_mirror::feed::ListenRecord;
use scrobble_mirror::sync::{RetryPolicy, LISTEN_TIME_FORMAT};
use scrobble_mirror::{SyncEngine, SyncSettings};
use std::sync::Arc;

pub const TEST_USER: &str = "rj";
pub const TEST_API_KEY: &str = "test-api-key";

/// Reference instant listens are placed relative to.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

/// The listen time `minute` minutes after [`base_time`].
pub fn at_minute(minute: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minute)
}

/// A finished listen played `minute` minutes after [`base_time`].
pub fn listen(artist: &str, album: &str, title: &str, minute: i64) -> ListenRecord {
    ListenRecord {
        artist_name: artist.to_string(),
        album_name: album.to_string(),
        track_title: title.to_string(),
        timestamp_text: at_minute(minute).format(LISTEN_TIME_FORMAT).to_string(),
        is_now_playing: false,
    }
}

pub fn now_playing(artist: &str, album: &str, title: &str) -> ListenRecord {
    ListenRecord {
        artist_name: artist.to_string(),
        album_name: album.to_string(),
        track_title: title.to_string(),
        timestamp_text: String::new(),
        is_now_playing: true,
    }
}

/// A listen whose timestamp text is replaced by `text`.
pub fn listen_with_timestamp(artist: &str, title: &str, text: &str) -> ListenRecord {
    ListenRecord {
        artist_name: artist.to_string(),
        album_name: String::new(),
        track_title: title.to_string(),
        timestamp_text: text.to_string(),
        is_now_playing: false,
    }
}

/// An engine over the fakes that never sleeps between retries.
pub fn engine(feed: &Arc<ScriptedFeed>, store: &Arc<MemoryStore>, page_size: u32) -> SyncEngine {
    SyncEngine::new(
        feed.clone(),
        store.clone(),
        store.clone(),
        SyncSettings {
            username: TEST_USER.to_string(),
            api_key: TEST_API_KEY.to_string(),
            page_size,
        },
    )
    .with_retry_policy(RetryPolicy::none())
}
