use rusqlite::{params, params_from_iter, Row};

use super::*;

pub(crate) const CLIENT_COLUMNS: &str = "id, company_name, email, phone_number, duplicate_group_id,
     import_batch_id, meta, created_at, updated_at";

impl ClientDb {
    // =========================================================================
    // Clients
    // =========================================================================

    /// Insert `rows` as one atomic bulk write tagged with `batch_id`.
    ///
    /// Returns the assigned ids in the same order as `rows`.
    pub fn insert_clients(
        &self,
        rows: &[NewClient],
        batch_id: &str,
        now: &str,
    ) -> Result<Vec<i64>, DbError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.with_transaction(|db| {
            let mut stmt = db.conn.prepare_cached(
                "INSERT INTO clients (
                    company_name, email, phone_number, import_batch_id, meta,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            )?;
            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let meta = row.meta.as_ref().map(serde_json::to_string).transpose()?;
                stmt.execute(params![
                    row.company_name,
                    row.email,
                    row.phone_number,
                    batch_id,
                    meta,
                    now,
                ])?;
                ids.push(db.conn.last_insert_rowid());
            }
            Ok(ids)
        })
    }

    /// Point `id` at `root_id` unless it already belongs to a group.
    ///
    /// Returns `true` if the row was updated.
    pub fn assign_duplicate_group(
        &self,
        id: i64,
        root_id: i64,
        now: &str,
    ) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "UPDATE clients SET duplicate_group_id = ?1, updated_at = ?2
             WHERE id = ?3 AND duplicate_group_id IS NULL",
            params![root_id, now, id],
        )?;
        Ok(rows > 0)
    }

    /// One page of the whole table in ascending id order, starting after `after_id`.
    pub fn clients_page(&self, after_id: i64, limit: usize) -> Result<Vec<DbClient>, DbError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE id > ?1 ORDER BY id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![after_id, limit as i64], Self::map_client_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// One page of the rows written by a single import, ascending id.
    pub fn batch_clients_page(
        &self,
        batch_id: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<DbClient>, DbError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE import_batch_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![batch_id, after_id, limit as i64],
            Self::map_client_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Get a client by id.
    pub fn get_client(&self, id: i64) -> Result<Option<DbClient>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], Self::map_client_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Get the given clients, ascending id. Unknown ids are ignored.
    pub fn get_clients_by_ids(&self, ids: &[i64]) -> Result<Vec<DbClient>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id IN ({placeholders}) ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), Self::map_client_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of rows in the table.
    pub fn count_clients(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?)
    }

    /// Map a row selected with [`CLIENT_COLUMNS`].
    pub(crate) fn map_client_row(row: &Row<'_>) -> rusqlite::Result<DbClient> {
        let meta: Option<String> = row.get(6)?;
        Ok(DbClient {
            id: row.get(0)?,
            company_name: row.get(1)?,
            email: row.get(2)?,
            phone_number: row.get(3)?,
            duplicate_group_id: row.get(4)?,
            import_batch_id: row.get(5)?,
            // Meta is opaque; a value that no longer parses is dropped rather
            // than failing the whole read.
            meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}
