//! Turning raw feed records into persistable tracks.

use crate::feed::ListenRecord;
use crate::scrobble_store::NewTrack;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Layout of Last.fm's human readable `date["#text"]`, always UTC.
pub const LISTEN_TIME_FORMAT: &str = "%d %b %Y, %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("Cannot parse listen timestamp {text:?}: {reason}")]
    Unparseable { text: String, reason: String },

    #[error("Listen timestamp {0:?} is the zero time")]
    Zero(String),
}

/// Parses a listen timestamp, rejecting anything at or before the Unix epoch.
pub fn parse_listen_timestamp(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), LISTEN_TIME_FORMAT).map_err(|e| {
        TimestampError::Unparseable {
            text: text.to_string(),
            reason: e.to_string(),
        }
    })?;
    let parsed = naive.and_utc();
    if parsed.timestamp() <= 0 {
        return Err(TimestampError::Zero(text.to_string()));
    }
    Ok(parsed)
}

/// What a sync pass should do with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDisposition {
    NowPlaying,
    BadTimestamp(TimestampError),
    Commit(NewTrack),
}

pub fn classify(record: &ListenRecord) -> RecordDisposition {
    if record.is_now_playing {
        return RecordDisposition::NowPlaying;
    }
    match parse_listen_timestamp(&record.timestamp_text) {
        Ok(played_at) => RecordDisposition::Commit(NewTrack {
            artist_name: record.artist_name.clone(),
            album_name: record.album_name.clone(),
            title: record.track_title.clone(),
            played_at,
        }),
        Err(e) => RecordDisposition::BadTimestamp(e),
    }
}
