//! Root-or-duplicate decisions for imported rows.
//!
//! [`classify`] runs before a row is buffered; [`settle`] runs on every
//! flushed batch once ids are known, promoting pending roots and persisting
//! `duplicate_group_id` links with single-row updates.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::batch::{InsertedRow, Link};
use super::index::{KeyIndex, KeySlot};
use crate::db::ClientDb;

/// What to do with a row whose key was already in the store before the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingKeyPolicy {
    /// Leave it out; re-running an import inserts nothing new.
    #[default]
    Skip,
    /// Insert it and link it to the stored root.
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Insert(Link),
    /// Key already stored; carries the stored root id.
    Skip(i64),
}

/// Decide how a validated row with canonical key `key` enters the run.
pub fn classify(index: &mut KeyIndex, key: &str, policy: ExistingKeyPolicy) -> Decision {
    match index.get(key) {
        None => {
            index.mark_pending(key);
            Decision::Insert(Link::Root)
        }
        Some(KeySlot::Pending) => Decision::Insert(Link::ToPendingRoot),
        Some(KeySlot::Inserted(root)) => Decision::Insert(Link::To(root)),
        Some(KeySlot::Existing(root)) => match policy {
            ExistingKeyPolicy::Skip => Decision::Skip(root),
            ExistingKeyPolicy::Link => Decision::Insert(Link::To(root)),
        },
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettleStats {
    pub roots: usize,
    pub linked: usize,
}

/// Resolve a flushed batch. Link failures are recorded in `failures` keyed by
/// client id; the inserted rows stay committed either way.
pub fn settle(
    db: &ClientDb,
    index: &mut KeyIndex,
    inserted: &[InsertedRow],
    now: &str,
    failures: &mut BTreeMap<i64, String>,
) -> SettleStats {
    let mut stats = SettleStats::default();

    for row in inserted {
        let root = match row.link {
            Link::Root => {
                if index.resolve(&row.key, row.id) {
                    stats.roots += 1;
                } else {
                    log::warn!(
                        "Row {} (client {}) was queued as a root but its key is no longer pending",
                        row.row_number,
                        row.id
                    );
                }
                continue;
            }
            Link::To(root) => root,
            Link::ToPendingRoot => match index.get(&row.key).and_then(KeySlot::root_id) {
                Some(root) => root,
                None => {
                    log::warn!(
                        "No root resolved for row {} (client {})",
                        row.row_number,
                        row.id
                    );
                    failures.insert(row.id, "root for canonical key was not inserted".to_string());
                    continue;
                }
            },
        };

        match db.assign_duplicate_group(row.id, root, now) {
            Ok(true) => stats.linked += 1,
            Ok(false) => log::debug!("Client {} already belongs to a group", row.id),
            Err(e) => {
                log::warn!("Failed to link client {} to root {}: {}", row.id, root, e);
                failures.insert(row.id, e.to_string());
            }
        }
    }

    stats
}
