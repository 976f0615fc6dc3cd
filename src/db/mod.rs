//! SQLite-backed client table.
//!
//! The database lives at `~/.clientele/clientele.db` unless a path is given.
//! Every connection registers a deterministic `canonical_key(company, email,
//! phone)` scalar function so read paths can group rows by the same identity
//! the importer uses.

use std::path::PathBuf;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::canonical::canonical_key;

pub mod clients;
pub mod types;
pub use types::*;

pub struct ClientDb {
    conn: Connection,
}

impl ClientDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed after error '{}': {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn)?;
        register_functions(&conn)?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.clientele/clientele.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".clientele").join("clientele.db"))
    }
}

fn register_functions(conn: &Connection) -> Result<(), DbError> {
    conn.create_scalar_function(
        "canonical_key",
        3,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let company = ctx.get::<Option<String>>(0)?;
            let email = ctx.get::<Option<String>>(1)?;
            let phone = ctx.get::<Option<String>>(2)?;
            Ok(canonical_key(
                company.as_deref().unwrap_or(""),
                email.as_deref(),
                phone.as_deref(),
            ))
        },
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> ClientDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clientele_test.db");
    std::mem::forget(dir);
    ClientDb::open_at(path).expect("open test db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_sql_function_matches_rust() {
        let db = test_db();
        let key: String = db
            .conn_ref()
            .query_row(
                "SELECT canonical_key(' Acme Inc ', 'A@X.COM', '+1 (555) 123-4567')",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(
            key,
            canonical_key("Acme Inc", Some("a@x.com"), Some("15551234567"))
        );
    }

    #[test]
    fn test_canonical_key_sql_function_accepts_nulls() {
        let db = test_db();
        let key: String = db
            .conn_ref()
            .query_row("SELECT canonical_key('Acme', NULL, NULL)", [], |row| {
                row.get(0)
            })
            .expect("query");
        assert_eq!(key, "acme||");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.conn_ref().execute(
                "INSERT INTO clients (company_name, created_at, updated_at)
                 VALUES ('Acme', '2025-01-01', '2025-01-01')",
                [],
            )?;
            Err(DbError::Migration("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.count_clients().expect("count"), 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("c.db");
        let db = ClientDb::open_at(path.clone()).expect("open");
        assert_eq!(db.count_clients().expect("count"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_rows_and_writes_no_side_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.db");
        {
            let db = ClientDb::open_at(path.clone()).expect("open");
            db.insert_clients(
                &[NewClient {
                    company_name: "Acme".to_string(),
                    ..NewClient::default()
                }],
                "b",
                "2025-01-01T00:00:00+00:00",
            )
            .expect("insert");
        }

        let db = ClientDb::open_at(path).expect("reopen");
        assert_eq!(db.count_clients().expect("count"), 1);
        let stray: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert!(stray.is_empty());
    }
}
