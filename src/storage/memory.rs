use crate::catalog::types::{Fields, Record, RecordId};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory record store, the source of truth for record existence.
///
/// Backed by a sharded `DashMap`: each call only holds the lock of the shard it
/// touches, and only for the duration of the map operation. Nothing here awaits,
/// so no lock can ever be held across a search index round-trip.
pub struct RecordStore {
    records: DashMap<RecordId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Stores a new record under a freshly generated id and returns it.
    pub fn create(&self, fields: Fields) -> Record {
        loop {
            let id = RecordId::new();
            // A v4 collision is practically impossible, but a live id is never handed out twice.
            match self.records.entry(id.clone()) {
                Entry::Occupied(_) => {
                    tracing::warn!("Generated id {} already in use, drawing again", id);
                }
                Entry::Vacant(slot) => {
                    let record = Record { id, fields };
                    slot.insert(record.clone());
                    tracing::debug!("Stored record {}", record.id);
                    return record;
                }
            }
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Removes the record, returning it if it was present.
    pub fn delete(&self, id: &RecordId) -> Option<Record> {
        self.records.remove(id).map(|(_, record)| record)
    }

    /// Point-in-time copy of all records. Order is unspecified.
    pub fn list(&self) -> Vec<Record> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
