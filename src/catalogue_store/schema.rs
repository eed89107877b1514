//! Database schema for the song catalogue.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Songs Table - Version 0
// =============================================================================

const SONGS_TABLE_V0: Table = Table {
    name: "songs",
    columns: &[
        // file names derive from the id, so a deleted id must never come back
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!(
            "title",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Unknown Title'")
        ),
        sqlite_column!(
            "artist",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Unknown Artist'")
        ),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Integer), // seconds
        sqlite_column!("original_url", &SqlType::Text),
        sqlite_column!("file_path", &SqlType::Text), // relative to the library root
        sqlite_column!("thumbnail_url", &SqlType::Text),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_songs_status", "status"),
        ("idx_songs_artist_title", "artist, title"),
    ],
    unique_constraints: &[&["original_url"], &["file_path"]],
};

pub const CATALOGUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SONGS_TABLE_V0],
    migration: None,
}];
