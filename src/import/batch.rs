//! Bounded buffer of rows waiting for a bulk insert.

use crate::db::{ClientDb, DbError, NewClient};

/// How a buffered row relates to its canonical key's root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// The row is the first holder of its key.
    Root,
    /// Duplicate of a root whose id is already known.
    To(i64),
    /// Duplicate of a root buffered earlier in this run and not yet flushed.
    ToPendingRoot,
}

#[derive(Debug, Clone)]
pub struct QueuedRow {
    pub row_number: u64,
    pub key: String,
    pub link: Link,
    pub client: NewClient,
}

/// A flushed row with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedRow {
    pub id: i64,
    pub row_number: u64,
    pub key: String,
    pub link: Link,
}

pub struct BatchWriter {
    capacity: usize,
    buffer: Vec<QueuedRow>,
    inserted: usize,
    flushes: usize,
}

impl BatchWriter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            inserted: 0,
            flushes: 0,
        }
    }

    /// Buffer a row. Returns `true` once the buffer has reached capacity and
    /// must be flushed.
    pub fn push(&mut self, row: QueuedRow) -> bool {
        self.buffer.push(row);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Rows written by all flushes so far.
    pub fn inserted_count(&self) -> usize {
        self.inserted
    }

    /// Write the buffer as one bulk insert and hand back each row paired with
    /// its assigned id, in buffer order.
    pub fn flush(
        &mut self,
        db: &ClientDb,
        batch_id: &str,
        now: &str,
    ) -> Result<Vec<InsertedRow>, DbError> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }

        let queued = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let mut clients = Vec::with_capacity(queued.len());
        let mut pending = Vec::with_capacity(queued.len());
        for row in queued {
            clients.push(row.client);
            pending.push((row.row_number, row.key, row.link));
        }

        let ids = db.insert_clients(&clients, batch_id, now)?;
        self.inserted += ids.len();
        self.flushes += 1;
        log::debug!(
            "Flushed batch #{} of import {}: {} rows",
            self.flushes,
            batch_id,
            ids.len()
        );

        Ok(ids
            .into_iter()
            .zip(pending)
            .map(|(id, (row_number, key, link))| InsertedRow {
                id,
                row_number,
                key,
                link,
            })
            .collect())
    }
}
