//! Deduplicating FIFO of records waiting for the writer coordinator

use crate::indexing::error::{IndexingError, IndexingResult};
use crate::indexing::metrics::INDEXER_METRICS;
use crate::models::{IndexKey, IndexRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// A drained record with the position it was first enqueued at
#[derive(Debug, Clone)]
pub struct QueueEntry {
    key: IndexKey,
    record: IndexRecord,
    order: u64,
}

impl QueueEntry {
    pub fn key(&self) -> &IndexKey {
        &self.key
    }

    pub fn record(&self) -> &IndexRecord {
        &self.record
    }

    /// Sequence number of the first enqueue of this key
    pub fn order(&self) -> u64 {
        self.order
    }
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<IndexKey, (u64, IndexRecord)>,
    order: VecDeque<IndexKey>,
    next_order: u64,
}

impl QueueState {
    fn purge_partition(&mut self, wiki: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, record)| record.partition() != wiki);
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
        before - self.entries.len()
    }
}

/// Pending index records keyed by [`IndexKey`]
///
/// A key is present at most once: enqueuing an already pending key replaces
/// its record but keeps its position (first-seen order, latest value).
/// Safe for many producers and one consumer.
#[derive(Default)]
pub struct IndexQueue {
    state: Mutex<QueueState>,
}

impl IndexQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pending record; never blocks on anything but the queue lock
    pub fn enqueue(&self, record: impl Into<IndexRecord>) {
        let record = record.into();
        let key = record.key();
        let kind = record.kind();

        let depth = {
            let mut state = self.state.lock();

            if let IndexRecord::Partition(wipe) = &record {
                let purged = state.purge_partition(&wipe.wiki);
                if purged > 0 {
                    tracing::debug!(partition = %wipe.wiki, purged, "Purged pending entries of wiped partition");
                }
            }

            match state.entries.get_mut(&key) {
                Some((_, pending)) => *pending = record,
                None => {
                    let order = state.next_order;
                    state.next_order += 1;
                    state.entries.insert(key.clone(), (order, record));
                    state.order.push_back(key.clone());
                }
            }

            state.entries.len()
        };

        tracing::debug!(key = %key, kind = %kind, depth, "Record enqueued");
        INDEXER_METRICS.record_enqueued(&kind.to_string());
        INDEXER_METRICS.set_queue_depth(depth);
    }

    /// Remove the oldest entry
    pub fn drain_one(&self) -> IndexingResult<QueueEntry> {
        let (entry, depth) = {
            let mut state = self.state.lock();
            let key = state.order.pop_front().ok_or(IndexingError::EmptyQueue)?;
            let (order, record) = state
                .entries
                .remove(&key)
                .ok_or(IndexingError::EmptyQueue)?;
            (QueueEntry { key, record, order }, state.entries.len())
        };

        INDEXER_METRICS.set_queue_depth(depth);
        Ok(entry)
    }

    /// Put drained entries back at the head, in their original order
    ///
    /// An entry whose key was enqueued again meanwhile is dropped in favour of
    /// the newer record.
    pub fn requeue(&self, entries: Vec<QueueEntry>) {
        let depth = {
            let mut state = self.state.lock();
            for entry in entries.into_iter().rev() {
                if state.entries.contains_key(&entry.key) {
                    continue;
                }
                state.order.push_front(entry.key.clone());
                state.entries.insert(entry.key, (entry.order, entry.record));
            }
            state.entries.len()
        };

        INDEXER_METRICS.set_queue_depth(depth);
    }

    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Pending record for `key`
    pub fn get(&self, key: &IndexKey) -> Option<IndexRecord> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|(_, record)| record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityPath, PageRecord, PartitionWipe, WikiPage};

    fn page(wiki: &str, name: &str, title: &str) -> PageRecord {
        PageRecord::from_page(&WikiPage::new(EntityPath::new(wiki, "Main", name), "1.1").with_title(title))
    }

    fn drain_names(queue: &IndexQueue) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(entry) = queue.drain_one() {
            names.push(
                entry
                    .record()
                    .entity_path()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| format!("wipe:{}", entry.record().partition())),
            );
        }
        names
    }

    #[test]
    fn test_drain_empty_queue_fails() {
        let queue = IndexQueue::new();
        assert!(queue.is_empty());
        assert!(matches!(queue.drain_one(), Err(IndexingError::EmptyQueue)));
    }

    #[test]
    fn test_dedup_keeps_first_position_and_last_value() {
        let queue = IndexQueue::new();
        queue.enqueue(page("w", "A", "first"));
        queue.enqueue(page("w", "B", "b"));
        queue.enqueue(page("w", "A", "second"));
        queue.enqueue(page("w", "C", "c"));
        assert_eq!(queue.size(), 3);

        let first = queue.drain_one().unwrap();
        match first.record() {
            IndexRecord::Page(record) => assert_eq!(record.title(), "second"),
            other => panic!("unexpected record {:?}", other),
        }
        assert_eq!(drain_names(&queue), vec!["B", "C"]);
    }

    #[test]
    fn test_partition_wipe_purges_pending_entries() {
        let queue = IndexQueue::new();
        queue.enqueue(page("w1", "A", "a"));
        queue.enqueue(page("w2", "B", "b"));
        queue.enqueue(PartitionWipe::new("w1"));
        queue.enqueue(page("w1", "C", "c"));

        assert_eq!(drain_names(&queue), vec!["B", "wipe:w1", "C"]);
    }

    #[test]
    fn test_requeue_restores_order_without_overwriting() {
        let queue = IndexQueue::new();
        queue.enqueue(page("w", "A", "a1"));
        queue.enqueue(page("w", "B", "b"));
        queue.enqueue(page("w", "C", "c"));

        let drained = vec![queue.drain_one().unwrap(), queue.drain_one().unwrap()];
        queue.enqueue(page("w", "A", "a2"));
        queue.requeue(drained);

        assert_eq!(queue.size(), 3);
        let names = drain_names(&queue);
        assert_eq!(names, vec!["B", "C", "A"]);
    }
}
