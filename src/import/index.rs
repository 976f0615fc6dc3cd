//! Canonical key → group root map used for one import run.
//!
//! Built once from the store in fixed-size pages, then updated in place as
//! the run inserts new roots. It is a snapshot: rows written by another
//! process after [`KeyIndex::build`] are not seen.

use std::collections::HashMap;

use crate::canonical::canonical_key;
use crate::db::{ClientDb, DbError};

/// Where the root for a canonical key stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Root was already in the store when the run started.
    Existing(i64),
    /// First seen in this run, root not flushed yet.
    Pending,
    /// Root inserted by this run.
    Inserted(i64),
}

impl KeySlot {
    pub fn root_id(self) -> Option<i64> {
        match self {
            KeySlot::Existing(id) | KeySlot::Inserted(id) => Some(id),
            KeySlot::Pending => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct KeyIndex {
    slots: HashMap<String, KeySlot>,
}

impl KeyIndex {
    /// Scan the whole client table in ascending id order. When several stored
    /// rows share a key, the lowest id becomes the root.
    pub fn build(db: &ClientDb, page_size: usize) -> Result<Self, DbError> {
        let mut index = Self::default();
        let mut after_id = 0;
        let mut scanned = 0usize;

        loop {
            let page = db.clients_page(after_id, page_size)?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;
            scanned += page.len();

            for client in &page {
                let key = canonical_key(
                    &client.company_name,
                    client.email.as_deref(),
                    client.phone_number.as_deref(),
                );
                index.slots.entry(key).or_insert(KeySlot::Existing(client.id));
            }

            if page.len() < page_size {
                break;
            }
        }

        log::debug!(
            "Key index built: {} stored rows, {} distinct keys",
            scanned,
            index.slots.len()
        );
        Ok(index)
    }

    pub fn get(&self, key: &str) -> Option<KeySlot> {
        self.slots.get(key).copied()
    }

    /// Claim `key` for a root that is about to be buffered. Returns `false`
    /// if the key was already known.
    pub fn mark_pending(&mut self, key: &str) -> bool {
        if self.slots.contains_key(key) {
            return false;
        }
        self.slots.insert(key.to_string(), KeySlot::Pending);
        true
    }

    /// Record the id the store assigned to a pending root. Only a
    /// [`KeySlot::Pending`] entry is replaced.
    pub fn resolve(&mut self, key: &str, id: i64) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) if *slot == KeySlot::Pending => {
                *slot = KeySlot::Inserted(id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, NewClient};

    fn seed(db: &ClientDb, rows: &[(&str, Option<&str>, Option<&str>)]) -> Vec<i64> {
        let clients: Vec<NewClient> = rows
            .iter()
            .map(|(c, e, p)| NewClient {
                company_name: c.to_string(),
                email: e.map(str::to_string),
                phone_number: p.map(str::to_string),
                meta: None,
            })
            .collect();
        db.insert_clients(&clients, "seed", "2025-01-01T00:00:00+00:00")
            .expect("seed")
    }

    #[test]
    fn test_build_keeps_first_seen_root() {
        let db = test_db();
        let ids = seed(
            &db,
            &[
                ("Acme", Some("a@x.com"), Some("123-4567")),
                ("Globex", None, None),
                ("ACME ", Some("A@X.com"), Some("1234567")),
            ],
        );

        // Page size smaller than the table forces several pages.
        let index = KeyIndex::build(&db, 2).expect("build");
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.get("acme|a@x.com|1234567"),
            Some(KeySlot::Existing(ids[0]))
        );
        assert_eq!(index.get("globex||"), Some(KeySlot::Existing(ids[1])));
    }

    #[test]
    fn test_build_empty_store() {
        let db = test_db();
        let index = KeyIndex::build(&db, 10).expect("build");
        assert!(index.is_empty());
    }

    #[test]
    fn test_pending_then_resolved() {
        let mut index = KeyIndex::default();
        assert!(index.mark_pending("k"));
        assert!(!index.mark_pending("k"));
        assert_eq!(index.get("k"), Some(KeySlot::Pending));
        assert_eq!(index.get("k").and_then(KeySlot::root_id), None);

        assert!(index.resolve("k", 7));
        assert_eq!(index.get("k"), Some(KeySlot::Inserted(7)));
        // Resolved roots are never moved.
        assert!(!index.resolve("k", 9));
        assert_eq!(index.get("k").and_then(KeySlot::root_id), Some(7));
    }

    #[test]
    fn test_snapshots_taken_before_either_write_both_claim_root() {
        let db = test_db();
        let mut first = KeyIndex::build(&db, 100).expect("build");
        let mut second = KeyIndex::build(&db, 100).expect("build");

        assert!(first.mark_pending("acme||"));
        assert!(second.mark_pending("acme||"));

        let row = |name: &str| NewClient {
            company_name: name.to_string(),
            ..NewClient::default()
        };
        let a = db.insert_clients(&[row("Acme")], "run-a", "t").expect("insert")[0];
        let b = db.insert_clients(&[row("ACME")], "run-b", "t").expect("insert")[0];
        assert!(first.resolve("acme||", a));
        assert!(second.resolve("acme||", b));

        // Neither run saw the other's root, so both rows stay unlinked roots.
        for id in [a, b] {
            let stored = db.get_client(id).expect("get").expect("exists");
            assert_eq!(stored.duplicate_group_id, None);
        }

        // A later snapshot sees both and settles on the lowest id.
        let later = KeyIndex::build(&db, 100).expect("build");
        assert_eq!(later.get("acme||"), Some(KeySlot::Existing(a.min(b))));
    }

    #[test]
    fn test_existing_not_overwritten() {
        let db = test_db();
        let ids = seed(&db, &[("Acme", None, None)]);
        let mut index = KeyIndex::build(&db, 100).expect("build");
        assert!(!index.mark_pending("acme||"));
        assert!(!index.resolve("acme||", 99));
        assert_eq!(index.get("acme||"), Some(KeySlot::Existing(ids[0])));
    }
}
