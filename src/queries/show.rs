use rusqlite::params;
use serde::Serialize;

use super::QueryError;
use crate::db::clients::CLIENT_COLUMNS;
use crate::db::{ClientDb, DbClient};

#[derive(Debug, Clone, Serialize)]
pub struct ClientDetail {
    pub client: DbClient,
    /// Other rows with the same canonical key, ascending id.
    pub duplicates: Vec<DbClient>,
}

/// Look up one client together with its same-key siblings.
pub fn show_client(db: &ClientDb, id: i64) -> Result<ClientDetail, QueryError> {
    let client = db.get_client(id)?.ok_or(QueryError::NotFound(id))?;

    let mut stmt = db.conn_ref().prepare(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients
         WHERE canonical_key(company_name, email, phone_number)
               = canonical_key(?1, ?2, ?3)
           AND id <> ?4
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(
        params![client.company_name, client.email, client.phone_number, client.id],
        ClientDb::map_client_row,
    )?;
    let duplicates = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(ClientDetail { client, duplicates })
}
