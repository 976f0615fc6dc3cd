//! Rebuild the duplicate groups touched by one import.

use std::collections::{BTreeMap, HashMap};

use crate::canonical::canonical_key;
use crate::db::{ClientDb, DbClient, DbError};

/// Upper bound on ids bound into a single `IN (...)` lookup.
const MEMBER_FETCH_CHUNK: usize = 500;

/// Group every row tagged with `batch_id` by canonical key. Groups with more
/// than one member are returned keyed by their lowest id, members ascending.
pub fn build_duplicate_groups(
    db: &ClientDb,
    batch_id: &str,
    page_size: usize,
) -> Result<BTreeMap<i64, Vec<DbClient>>, DbError> {
    let mut by_key: HashMap<String, Vec<i64>> = HashMap::new();
    let mut after_id = 0;

    loop {
        let page = db.batch_clients_page(batch_id, after_id, page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;

        for client in &page {
            let key = canonical_key(
                &client.company_name,
                client.email.as_deref(),
                client.phone_number.as_deref(),
            );
            by_key.entry(key).or_default().push(client.id);
        }

        if page.len() < page_size {
            break;
        }
    }

    let mut groups = BTreeMap::new();
    for ids in by_key.into_values().filter(|ids| ids.len() > 1) {
        let mut members = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MEMBER_FETCH_CHUNK) {
            members.extend(db.get_clients_by_ids(chunk)?);
        }
        members.sort_by_key(|c| c.id);
        groups.insert(ids[0], members);
    }

    Ok(groups)
}
