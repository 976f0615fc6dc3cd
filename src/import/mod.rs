//! CSV import with canonical-key duplicate detection.
//!
//! One call streams the file once: rows are validated, classified against a
//! [`KeyIndex`] snapshot of the store, buffered, and bulk inserted. Each flushed
//! batch is settled immediately so duplicates learn their root's id, and the
//! groups touched by the run are rebuilt for the report at the end.
//!
//! There is no transaction around the whole run. A failure mid-import leaves
//! every flushed batch committed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::{ClientDb, DbClient, DbError};

pub mod batch;
pub mod groups;
pub mod index;
pub mod resolver;
pub mod row;

pub use index::{KeyIndex, KeySlot};
pub use resolver::ExistingKeyPolicy;
pub use row::{FieldError, RowFailure, ValidRow};

use batch::{BatchWriter, QueuedRow};
use resolver::Decision;
use row::RowReader;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_PAGE_SIZE: usize = 2000;

/// Fatal import errors. Row-level problems never surface here; they are
/// collected in [`ImportReport::failed_rows`].
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unable to open import file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Import file is empty")]
    EmptyFile,

    #[error("Failed to read import file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error during import: {0}")]
    Db(#[from] DbError),

    #[error("Invalid import options: {0}")]
    InvalidOptions(String),
}

/// Inputs for one import run. The batch tag and the clock are explicit so a
/// run can be reproduced exactly.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_id: String,
    pub now: DateTime<Utc>,
    pub batch_size: usize,
    pub page_size: usize,
    pub on_existing: ExistingKeyPolicy,
}

impl ImportOptions {
    pub fn new(batch_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch_id.into(),
            now,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            on_existing: ExistingKeyPolicy::default(),
        }
    }

    /// Fresh UUID v4 batch tag and the current time.
    pub fn generated() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), Utc::now())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_existing_policy(mut self, policy: ExistingKeyPolicy) -> Self {
        self.on_existing = policy;
        self
    }

    fn check(&self) -> Result<(), ImportError> {
        if self.batch_id.trim().is_empty() {
            return Err(ImportError::InvalidOptions("batch id must not be empty".into()));
        }
        if self.batch_size == 0 || self.page_size == 0 {
            return Err(ImportError::InvalidOptions(
                "batch size and page size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub import_batch_id: String,
    /// Rows newly written, roots and duplicates alike.
    pub imported_count: usize,
    /// Rows left out because their key was already stored.
    pub skipped_count: usize,
    /// Source row number → validation messages.
    pub failed_rows: BTreeMap<u64, Vec<String>>,
    /// Client id → reason its duplicate link could not be written.
    pub link_failures: BTreeMap<i64, String>,
    /// Root id → every member of the group, ascending id.
    pub duplicate_groups: BTreeMap<i64, Vec<DbClient>>,
}

/// Open `path` and import it. An unopenable file fails before anything is read.
pub fn import_csv_path(
    db: &ClientDb,
    path: &Path,
    opts: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_csv(db, BufReader::new(file), opts)
}

/// Import CSV from any byte stream.
pub fn import_csv<R: Read>(
    db: &ClientDb,
    input: R,
    opts: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    opts.check()?;
    let mut rows = RowReader::new(input)?;
    let now = opts.now.to_rfc3339();

    log::info!(
        "Import {} started (columns: {})",
        opts.batch_id,
        rows.header().join(", ")
    );

    let mut index = KeyIndex::build(db, opts.page_size)?;
    let mut writer = BatchWriter::new(opts.batch_size);
    let mut failed_rows = BTreeMap::new();
    let mut link_failures = BTreeMap::new();
    let mut skipped_count = 0;
    let mut linked = 0;

    while let Some(parsed) = rows.next_row()? {
        let valid = match parsed {
            Ok(valid) => valid,
            Err(failure) => {
                failed_rows.insert(failure.row_number, failure.messages());
                continue;
            }
        };

        let key = valid.canonical_key();
        let link = match resolver::classify(&mut index, &key, opts.on_existing) {
            Decision::Insert(link) => link,
            Decision::Skip(root) => {
                log::debug!("Row {} already stored as client {}", valid.row_number, root);
                skipped_count += 1;
                continue;
            }
        };

        let full = writer.push(QueuedRow {
            row_number: valid.row_number,
            key,
            link,
            client: valid.client,
        });
        if full {
            let inserted = writer.flush(db, &opts.batch_id, &now)?;
            linked += resolver::settle(db, &mut index, &inserted, &now, &mut link_failures).linked;
        }
    }

    if !writer.is_empty() {
        let inserted = writer.flush(db, &opts.batch_id, &now)?;
        linked += resolver::settle(db, &mut index, &inserted, &now, &mut link_failures).linked;
    }

    let duplicate_groups = groups::build_duplicate_groups(db, &opts.batch_id, opts.page_size)?;

    log::info!(
        "Import {} finished: {} inserted, {} linked, {} skipped, {} failed rows, {} groups",
        opts.batch_id,
        writer.inserted_count(),
        linked,
        skipped_count,
        failed_rows.len(),
        duplicate_groups.len()
    );
    if !link_failures.is_empty() {
        log::warn!(
            "Import {}: {} duplicate links could not be written",
            opts.batch_id,
            link_failures.len()
        );
    }

    Ok(ImportReport {
        import_batch_id: opts.batch_id.clone(),
        imported_count: writer.inserted_count(),
        skipped_count,
        failed_rows,
        link_failures,
        duplicate_groups,
    })
}
