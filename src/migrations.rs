//! Versioned schema for the client store.
//!
//! SQL files under `migrations/` are compiled in and applied in order, each in
//! its own transaction together with its `schema_version` row. A database
//! whose `clients` table predates version tracking is adopted at the baseline
//! instead of having the baseline replayed over it.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DbError;

/// (version, sql), ascending.
const SCHEMA: &[(i64, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

fn latest_known() -> i64 {
    SCHEMA.last().map(|(version, _)| *version).unwrap_or(0)
}

fn schema_version(conn: &Connection) -> Result<i64, DbError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn has_table(conn: &Connection, name: &str) -> Result<bool, DbError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Bring the schema up to date. Returns how many migrations were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    let tracked = has_table(conn, "schema_version")?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    if !tracked && has_table(conn, "clients")? {
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        log::info!("Adopted existing clients table at schema v1");
    }

    let current = schema_version(conn)?;
    if current > latest_known() {
        return Err(DbError::SchemaTooNew {
            found: current,
            supported: latest_known(),
        });
    }

    let mut applied = 0;
    for (version, sql) in SCHEMA.iter().filter(|(v, _)| *v > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| DbError::Migration(format!("v{version}: {e}")))?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version],
        )?;
        tx.commit()?;
        log::info!("Client store schema at v{}", version);
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_store_gets_baseline() {
        let conn = conn();
        assert_eq!(run_migrations(&conn).expect("migrate"), 1);
        assert_eq!(schema_version(&conn).expect("version"), 1);

        conn.execute(
            "INSERT INTO clients (company_name, email, phone_number, duplicate_group_id,
             import_batch_id, meta, created_at, updated_at)
             VALUES ('Acme', NULL, NULL, NULL, 'b1', '{}', '2025-01-01', '2025-01-01')",
            [],
        )
        .expect("nullable email/phone accepted");
    }

    #[test]
    fn test_rerun_applies_nothing() {
        let conn = conn();
        run_migrations(&conn).expect("first");
        assert_eq!(run_migrations(&conn).expect("second"), 0);
        assert_eq!(schema_version(&conn).expect("version"), 1);
    }

    #[test]
    fn test_untracked_clients_table_is_adopted() {
        let conn = conn();
        conn.execute_batch(
            "CREATE TABLE clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_name TEXT NOT NULL,
                email TEXT,
                phone_number TEXT,
                duplicate_group_id INTEGER,
                import_batch_id TEXT,
                meta TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO clients (company_name, created_at, updated_at)
            VALUES ('Seeded Co', '2025-01-01', '2025-01-01');",
        )
        .expect("seed");

        assert_eq!(run_migrations(&conn).expect("migrate"), 0);
        assert_eq!(schema_version(&conn).expect("version"), 1);
        let name: String = conn
            .query_row("SELECT company_name FROM clients WHERE id = 1", [], |row| {
                row.get(0)
            })
            .expect("seeded row kept");
        assert_eq!(name, "Seeded Co");
    }

    #[test]
    fn test_empty_untracked_clients_table_is_adopted() {
        let conn = conn();
        conn.execute_batch(
            "CREATE TABLE clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .expect("seed");

        assert_eq!(run_migrations(&conn).expect("migrate"), 0);
        assert_eq!(schema_version(&conn).expect("version"), 1);
    }

    #[test]
    fn test_newer_schema_refused() {
        let conn = conn();
        run_migrations(&conn).expect("migrate");
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .expect("bump");

        match run_migrations(&conn) {
            Err(DbError::SchemaTooNew { found, supported }) => {
                assert_eq!(found, 999);
                assert_eq!(supported, 1);
            }
            other => panic!("expected SchemaTooNew, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_migration_leaves_version_unchanged() {
        let conn = conn();
        // Views cannot be indexed, so the baseline fails after its first statement.
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT);
             CREATE VIEW clients AS SELECT 1 AS company_name;",
        )
        .expect("seed");

        assert!(matches!(run_migrations(&conn), Err(DbError::Migration(_))));
        assert_eq!(schema_version(&conn).expect("version"), 0);
        assert!(!has_table(&conn, "clients").expect("lookup"));
    }
}
