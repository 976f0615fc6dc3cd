//! Client table import with canonical-key duplicate detection.
//!
//! [`import`] streams a CSV of client records into the SQLite-backed
//! [`db::ClientDb`]. Rows that repeat a canonical key seen earlier in the run
//! are linked to that key's root; keys already stored are skipped or linked
//! per [`import::ExistingKeyPolicy`]. [`queries`] holds the read-only listing,
//! lookup, and export surfaces.

pub mod canonical;
pub mod config;
pub mod db;
pub mod import;
mod migrations;
pub mod queries;

pub use canonical::canonical_key;
pub use db::{ClientDb, DbClient, DbError};
pub use import::{import_csv, import_csv_path, ImportError, ImportOptions, ImportReport};
