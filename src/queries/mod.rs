//! Read-only surfaces over the client table: listing, single-record lookup,
//! and CSV export. None of them write `duplicate_group_id`.

use thiserror::Error;

use crate::db::DbError;

pub mod export;
pub mod list;
pub mod show;

pub use export::{duplicate_keys, export_clients};
pub use list::{list_clients, ClientFilter, ClientPage, SortColumn, SortDirection};
pub use show::{show_client, ClientDetail};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Client {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
