use super::models::{
    CheckpointError, Insertion, NewTrack, RecentTrack, ScrobbleSummary, TopAlbum, TopArtist,
    TopSong, Track,
};
use super::schema::SCROBBLE_VERSIONED_SCHEMAS;
use super::{Checkpoint, ScrobbleStore, StatsStore};
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSqlError, Type};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteScrobbleStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScrobbleStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, SCROBBLE_VERSIONED_SCHEMAS, "scrobble")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(SCROBBLE_VERSIONED_SCHEMAS, "scrobble")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// All tracks in insertion order.
    pub fn list_tracks(&self) -> Result<Vec<Track>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, artist_id, artist_name, album_name, title, played_at
             FROM tracks ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Track {
                    id: row.get(0)?,
                    artist_id: row.get(1)?,
                    artist_name: row.get(2)?,
                    album_name: row.get(3)?,
                    title: row.get(4)?,
                    played_at: epoch_to_datetime(5, row.get(5)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn artist_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM artists ORDER BY id ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn find_artist_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row(
                "SELECT id FROM artists WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Reads a stored `played_at`, failing on values chrono cannot represent.
fn epoch_to_datetime(column: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            Box::new(FromSqlError::OutOfRange(secs)),
        )
    })
}

impl Checkpoint for SqliteScrobbleStore {
    fn last_listen_timestamp(&self) -> Result<Option<DateTime<Utc>>, CheckpointError> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(played_at) FROM tracks", [], |row| row.get(0))
            .map_err(|e| match e {
                rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
                    CheckpointError::Malformed(e.to_string())
                }
                other => CheckpointError::Unavailable(other.to_string()),
            })?;

        latest
            .map(|secs| {
                DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    CheckpointError::Malformed(format!("{} is out of range", secs))
                })
            })
            .transpose()
    }
}

impl ScrobbleStore for SqliteScrobbleStore {
    fn ensure_artist(&self, name: &str) -> Result<Insertion> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO artists (name) VALUES (?1)",
                params![name],
            )
            .with_context(|| format!("Failed to insert artist {}", name))?;
        Ok(if inserted > 0 {
            Insertion::Created
        } else {
            Insertion::Existing
        })
    }

    fn ensure_track(&self, track: &NewTrack) -> Result<Insertion> {
        let mut conn = self.conn.lock().unwrap();
        let played_at = track.played_at.timestamp();

        // Another process may write the same file, take the write lock up front
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM tracks WHERE played_at = ?1",
                params![played_at],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(Insertion::Existing);
        }

        tx.execute(
            "INSERT OR IGNORE INTO artists (name) VALUES (?1)",
            params![track.artist_name],
        )?;
        let artist_id = Self::find_artist_id(&tx, &track.artist_name)?
            .with_context(|| format!("Artist {} vanished during insert", track.artist_name))?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO tracks (artist_id, artist_name, album_name, title, played_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    artist_id,
                    track.artist_name,
                    track.album_name,
                    track.title,
                    played_at
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert track {} - {} played at {}",
                    track.artist_name, track.title, track.played_at
                )
            })?;
        tx.commit()?;

        Ok(if inserted > 0 {
            Insertion::Created
        } else {
            Insertion::Existing
        })
    }
}

impl StatsStore for SqliteScrobbleStore {
    fn summary(&self) -> Result<ScrobbleSummary> {
        let conn = self.conn.lock().unwrap();
        let (scrobbles, first_played_at) = conn.query_row(
            "SELECT COUNT(*), MIN(played_at) FROM tracks",
            [],
            |row| {
                let first: Option<i64> = row.get(1)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    first.map(|secs| epoch_to_datetime(1, secs)).transpose()?,
                ))
            },
        )?;
        let artists: i64 = conn.query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?;

        Ok(ScrobbleSummary {
            scrobbles,
            artists,
            first_played_at,
        })
    }

    fn recent_tracks(&self, limit: usize) -> Result<Vec<RecentTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artist_name, title, played_at FROM tracks
             ORDER BY played_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RecentTrack {
                    artist_name: row.get(0)?,
                    title: row.get(1)?,
                    played_at: epoch_to_datetime(2, row.get(2)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn top_artists(&self, limit: usize) -> Result<Vec<TopArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artist_name, COUNT(*) AS plays FROM tracks
             GROUP BY artist_name
             ORDER BY plays DESC, artist_name ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(TopArtist {
                    artist_name: row.get(0)?,
                    plays: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn top_albums(&self, limit: usize) -> Result<Vec<TopAlbum>> {
        let conn = self.conn.lock().unwrap();
        // Singles and loose tracks come through with an empty album name
        let mut stmt = conn.prepare(
            "SELECT artist_name, album_name, COUNT(*) AS plays FROM tracks
             WHERE album_name != ''
             GROUP BY artist_name, album_name
             ORDER BY plays DESC, artist_name ASC, album_name ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(TopAlbum {
                    artist_name: row.get(0)?,
                    album_name: row.get(1)?,
                    plays: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn top_songs(&self, limit: usize) -> Result<Vec<TopSong>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artist_name, title, COUNT(*) AS plays FROM tracks
             GROUP BY artist_name, title
             ORDER BY plays DESC, artist_name ASC, title ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(TopSong {
                    artist_name: row.get(0)?,
                    title: row.get(1)?,
                    plays: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
