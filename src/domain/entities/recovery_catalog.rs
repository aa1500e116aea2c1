//! Recovery catalog entity
//!
//! Accumulates the records produced by exactly one parse pass. The active
//! parser is the only writer; any number of readers may take snapshots while
//! the pass runs. Once sealed the catalog is frozen.

use super::file_record::FileRecord;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised by catalog mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog is sealed; the parse pass that owned it has completed")]
    Sealed,

    #[error("Catalog already holds records from another pass")]
    NotEmpty,
}

/// Point-in-time copy of the catalog contents
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSnapshot {
    pub total_found: u64,
    pub total_deleted: u64,
    /// Slots whose bytes failed structural validation
    pub discarded: u64,
    /// Locator segments (block groups, tree nodes, volumes) that were skipped
    pub skipped_segments: u64,
    pub sealed: bool,
    /// Records in the order they were appended
    pub records: Vec<FileRecord>,
}

impl CatalogSnapshot {
    /// Iterates over the deletion-marked records only
    pub fn deleted(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter().filter(|r| r.is_deleted())
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    records: Vec<FileRecord>,
    index: HashMap<u64, usize>,
    total_deleted: u64,
    discarded: u64,
    skipped_segments: u64,
    sealed: bool,
}

/// Ordered collection of file records from one parse pass
#[derive(Debug, Default)]
pub struct RecoveryCatalog {
    state: RwLock<CatalogState>,
}

impl RecoveryCatalog {
    /// Creates an empty, unsealed catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record
    pub fn append(&self, record: FileRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(CatalogError::Sealed);
        }
        if record.is_deleted() {
            state.total_deleted += 1;
        }
        let position = state.records.len();
        // Keep the first record seen for an id; deleted duplicates can share ids
        state.index.entry(record.id()).or_insert(position);
        state.records.push(record);
        Ok(())
    }

    /// Counts one slot that failed structural validation
    pub fn record_discarded(&self) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(CatalogError::Sealed);
        }
        state.discarded += 1;
        Ok(())
    }

    /// Counts one locator segment that had to be skipped
    pub fn record_skipped_segment(&self) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(CatalogError::Sealed);
        }
        state.skipped_segments += 1;
        Ok(())
    }

    /// Freezes the catalog. Sealing twice is a no-op.
    pub fn seal(&self) {
        self.state.write().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    /// Fails unless the catalog can accept a fresh pass
    pub fn ensure_fresh(&self) -> Result<(), CatalogError> {
        let state = self.state.read();
        if state.sealed {
            return Err(CatalogError::Sealed);
        }
        if !state.records.is_empty() || state.discarded > 0 || state.skipped_segments > 0 {
            return Err(CatalogError::NotEmpty);
        }
        Ok(())
    }

    pub fn total_found(&self) -> u64 {
        self.state.read().records.len() as u64
    }

    pub fn total_deleted(&self) -> u64 {
        self.state.read().total_deleted
    }

    pub fn discarded(&self) -> u64 {
        self.state.read().discarded
    }

    pub fn skipped_segments(&self) -> u64 {
        self.state.read().skipped_segments
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Copies the current contents
    pub fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read();
        CatalogSnapshot {
            total_found: state.records.len() as u64,
            total_deleted: state.total_deleted,
            discarded: state.discarded,
            skipped_segments: state.skipped_segments,
            sealed: state.sealed,
            records: state.records.clone(),
        }
    }

    /// Returns the record with the given identifier
    pub fn get(&self, id: u64) -> Option<FileRecord> {
        let state = self.state.read();
        state.index.get(&id).map(|&i| state.records[i].clone())
    }

    /// Builds a `/`-separated path by following parent links
    ///
    /// Stops at a record that is its own parent (the root). Returns `None`
    /// when any component has no name, a parent is missing, or the links
    /// form a cycle.
    pub fn path_of(&self, id: u64) -> Option<String> {
        let state = self.state.read();
        let mut components = Vec::new();
        let mut visited = HashSet::new();
        let mut current = id;

        loop {
            if !visited.insert(current) {
                return None;
            }
            let record = &state.records[*state.index.get(&current)?];
            let parent = record.parent_id();
            if parent == Some(current) {
                break;
            }
            components.push(record.name()?.to_string());
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }

        components.reverse();
        Some(format!("/{}", components.join("/")))
    }
}
