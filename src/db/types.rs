//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Database schema v{found} is newer than supported v{supported}; upgrade clientele")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("Failed to encode client meta: {0}")]
    MetaEncoding(#[from] serde_json::Error),
}

/// Opaque key/value map stored alongside a client as JSON text.
pub type ClientMeta = serde_json::Map<String, serde_json::Value>;

/// A row from the `clients` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbClient {
    pub id: i64,
    pub company_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Id of the group root this row duplicates. `None` for roots and
    /// unclustered rows.
    pub duplicate_group_id: Option<i64>,
    pub import_batch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ClientMeta>,
    pub created_at: String,
    pub updated_at: String,
}

/// Column values for a client about to be inserted. The store assigns the id
/// and the timestamps come from the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewClient {
    pub company_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub meta: Option<ClientMeta>,
}
