use std::collections::HashSet;
use std::io::Write;

use rusqlite::params;

use super::QueryError;
use crate::canonical::canonical_key;
use crate::db::clients::CLIENT_COLUMNS;
use crate::db::ClientDb;

pub const EXPORT_HEADER: [&str; 9] = [
    "id",
    "company_name",
    "email",
    "phone_number",
    "duplicate_group_id",
    "import_batch_id",
    "meta",
    "created_at",
    "updated_at",
];

/// Canonical keys held by more than one row, from one grouped scan.
pub fn duplicate_keys(db: &ClientDb) -> Result<HashSet<String>, QueryError> {
    let mut stmt = db.conn_ref().prepare(
        "SELECT canonical_key(company_name, email, phone_number) AS ckey
         FROM clients GROUP BY ckey HAVING COUNT(*) > 1",
    )?;
    let keys = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(keys)
}

/// Write every client (or only those in a duplicate group of size > 1) as
/// CSV, reading the table in pages of `page_size`. Returns the number of data
/// rows written.
pub fn export_clients<W: Write>(
    db: &ClientDb,
    out: W,
    duplicates_only: bool,
    page_size: usize,
) -> Result<usize, QueryError> {
    let page_size = page_size.max(1);
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(EXPORT_HEADER)?;

    let wanted = if duplicates_only {
        Some(duplicate_keys(db)?)
    } else {
        None
    };

    let mut written = 0;
    if wanted.as_ref().map_or(true, |keys| !keys.is_empty()) {
        let mut stmt = db.conn_ref().prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE id > ?1 ORDER BY id ASC LIMIT ?2"
        ))?;

        let mut after_id = 0i64;
        loop {
            let page = stmt
                .query_map(params![after_id, page_size as i64], ClientDb::map_client_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;

            for client in &page {
                if let Some(keys) = &wanted {
                    let key = canonical_key(
                        &client.company_name,
                        client.email.as_deref(),
                        client.phone_number.as_deref(),
                    );
                    if !keys.contains(&key) {
                        continue;
                    }
                }
                let meta = client
                    .meta
                    .as_ref()
                    .map(|m| serde_json::Value::Object(m.clone()).to_string())
                    .unwrap_or_default();
                writer.write_record([
                    client.id.to_string(),
                    client.company_name.clone(),
                    client.email.clone().unwrap_or_default(),
                    client.phone_number.clone().unwrap_or_default(),
                    client.duplicate_group_id.map(|id| id.to_string()).unwrap_or_default(),
                    client.import_batch_id.clone().unwrap_or_default(),
                    meta,
                    client.created_at.clone(),
                    client.updated_at.clone(),
                ])?;
                written += 1;
            }

            if page.len() < page_size {
                break;
            }
        }
    }

    writer.flush()?;
    log::info!("Exported {} clients (duplicates only: {})", written, duplicates_only);
    Ok(written)
}
