//! Read handles shared between the writer coordinator and query callers

use crate::models::IndexKey;
use crate::search::config::AnalyzerKind;
use crate::search::error::SearchResult;
use crate::search::index::{IndexSnapshot, IndexStats};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Current snapshots of the primary index and the read-only partitions
///
/// Snapshots are replaced wholesale after each commit and never mutated, so a
/// query holding one never observes a partially applied batch.
pub struct ReadHandles {
    primary: RwLock<Arc<IndexSnapshot>>,
    read_only: Vec<Arc<IndexSnapshot>>,
}

impl ReadHandles {
    pub fn new(primary: IndexSnapshot) -> Self {
        Self {
            primary: RwLock::new(Arc::new(primary)),
            read_only: Vec::new(),
        }
    }

    /// Open the additional read-only indexes next to the primary snapshot
    pub fn with_read_only(
        primary: IndexSnapshot,
        dirs: &[PathBuf],
        analyzer: AnalyzerKind,
    ) -> SearchResult<Self> {
        let read_only = dirs
            .iter()
            .map(|dir| IndexSnapshot::open_read_only(dir, analyzer).map(Arc::new))
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(Self {
            primary: RwLock::new(Arc::new(primary)),
            read_only,
        })
    }

    /// Swap in the snapshot of a new commit
    pub fn publish_primary(&self, snapshot: IndexSnapshot) {
        let snapshot = Arc::new(snapshot);
        tracing::debug!(index = %snapshot.label(), docs = snapshot.num_docs(), "Published snapshot");
        *self.primary.write() = snapshot;
    }

    pub fn primary(&self) -> Arc<IndexSnapshot> {
        self.primary.read().clone()
    }

    /// Primary first, then read-only indexes in configuration order
    pub fn snapshots(&self) -> Vec<Arc<IndexSnapshot>> {
        let mut snapshots = Vec::with_capacity(self.read_only.len() + 1);
        snapshots.push(self.primary());
        snapshots.extend(self.read_only.iter().cloned());
        snapshots
    }

    /// Documents visible in the primary index
    pub fn indexed_count(&self) -> u64 {
        self.primary().num_docs()
    }

    pub fn indexed_version(&self, key: &IndexKey) -> SearchResult<Option<String>> {
        self.primary().stored_version(key)
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        self.snapshots().iter().map(|s| s.stats()).collect()
    }
}
