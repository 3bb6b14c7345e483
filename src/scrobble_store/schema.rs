//! SQLite schema definitions for the scrobble database.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Artists and tracks
// =============================================================================

const ARTISTS_TABLE_V1: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
};

const TRACK_ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
};

/// `played_at` holds epoch seconds at minute granularity and doubles as the
/// deduplication key.
const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_ARTIST_FK)
        ),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("played_at", &SqlType::Integer, non_null = true, is_unique = true),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Indices for statistics queries
// =============================================================================

const TRACKS_TABLE_V2: Table = Table {
    name: "tracks",
    columns: TRACKS_TABLE_V1.columns,
    indices: &[
        ("idx_tracks_artist_name", "artist_name"),
        ("idx_tracks_artist_album", "artist_name, album_name"),
    ],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    TRACKS_TABLE_V2.create_indices(conn)
}

pub const SCROBBLE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[ARTISTS_TABLE_V1, TRACKS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[ARTISTS_TABLE_V1, TRACKS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
