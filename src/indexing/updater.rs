//! Index writer coordinator: the single owner of the index write handle
//!
//! The coordinator drains the [`IndexQueue`] on a fixed poll interval (or on
//! an explicit flush), applies every record through one write session, commits,
//! then publishes a fresh read snapshot. Corruption clears the index, asks for
//! a full rebuild, and retries the same batch a bounded number of times.

use crate::indexing::config::UpdaterConfig;
use crate::indexing::error::{IndexingError, IndexingResult};
use crate::indexing::metrics::INDEXER_METRICS;
use crate::indexing::queue::{IndexQueue, QueueEntry};
use crate::models::{IndexField, IndexRecord};
use crate::search::{FieldRegistry, IndexEngine, ReadHandles, SearchError, SearchResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Lifecycle of the writer coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum UpdaterState {
    Idle,
    Draining,
    Repairing,
    /// Stop requested and honoured (terminal)
    Stopped,
    /// Corruption persisted after every allowed repair (terminal)
    Failed,
}

/// Outcome of one drain cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Documents added or replaced
    pub indexed: usize,

    /// Delete operations, including partition wipes
    pub deleted: usize,

    /// Entries skipped because of a per-document failure
    pub failed: usize,

    /// Repairs performed before the batch committed
    pub repairs: u32,
}

impl CycleReport {
    pub fn applied(&self) -> usize {
        self.indexed + self.deleted
    }
}

/// Receives the full rebuild requests issued after a repair
pub trait RebuildTrigger: Send + Sync {
    fn request_full_rebuild(&self);
}

enum UpdaterCommand {
    Flush(oneshot::Sender<IndexingResult<CycleReport>>),
    Stop(oneshot::Sender<()>),
}

/// Committed batch, with the field names it introduced
struct AppliedBatch {
    report: CycleReport,
    fields: Vec<IndexField>,
}

fn remember_fields(seen: &mut BTreeMap<String, IndexField>, fields: Vec<IndexField>) {
    for field in fields {
        let (boost, tokenized) = (field.boost, field.tokenized);
        seen.entry(field.name.clone())
            .and_modify(|known| {
                known.boost = known.boost.max(boost);
                known.tokenized |= tokenized;
            })
            .or_insert(IndexField {
                value: String::new(),
                ..field
            });
    }
}

/// Apply `batch` through one write session and commit it
///
/// Per-entry failures are skipped; corruption aborts the whole batch.
fn apply_batch(engine: &mut dyn IndexEngine, batch: &[QueueEntry]) -> SearchResult<AppliedBatch> {
    let mut report = CycleReport::default();
    let mut seen: BTreeMap<String, IndexField> = BTreeMap::new();
    let mut session = engine.open_writer(false)?;

    for entry in batch {
        let key = entry.key();
        let result = match entry.record() {
            IndexRecord::Partition(wipe) => session.delete_partition(&wipe.wiki).map(|_| false),
            record if record.is_deleted() => session.delete_by_key(key).map(|_| false),
            record => {
                let fields = record.fields();
                match session.upsert(key, &fields) {
                    Ok(()) => {
                        remember_fields(&mut seen, fields);
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(true) => {
                report.indexed += 1;
                tracing::debug!(key = %key, "Document indexed");
            }
            Ok(false) => {
                report.deleted += 1;
                tracing::debug!(key = %key, "Document deleted");
            }
            Err(e) if e.is_corruption() => return Err(e),
            Err(e) => {
                report.failed += 1;
                tracing::warn!(key = %key, error = %e, "Skipping document that failed to index");
            }
        }
    }

    session.commit()?;

    Ok(AppliedBatch {
        report,
        fields: seen.into_values().collect(),
    })
}

/// Exclusive owner of the index engine
pub struct IndexUpdater {
    engine: Box<dyn IndexEngine>,
    queue: Arc<IndexQueue>,
    handles: Arc<ReadHandles>,
    registry: Arc<FieldRegistry>,
    config: UpdaterConfig,
    trigger: Option<Arc<dyn RebuildTrigger>>,
    state: Arc<RwLock<UpdaterState>>,
}

impl IndexUpdater {
    pub fn new(
        engine: Box<dyn IndexEngine>,
        queue: Arc<IndexQueue>,
        handles: Arc<ReadHandles>,
        registry: Arc<FieldRegistry>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            handles,
            registry,
            config,
            trigger: None,
            state: Arc::new(RwLock::new(UpdaterState::Idle)),
        }
    }

    /// Who to ask for a full rebuild after a repair
    pub fn with_rebuild_trigger(mut self, trigger: Arc<dyn RebuildTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn state(&self) -> UpdaterState {
        *self.state.read()
    }

    fn set_state(&self, state: UpdaterState) {
        *self.state.write() = state;
    }

    /// Drain everything currently queued and commit it
    pub fn run_cycle(&mut self) -> IndexingResult<CycleReport> {
        if self.state() == UpdaterState::Failed {
            return Err(IndexingError::UpdaterStopped);
        }

        let mut batch = Vec::new();
        while let Ok(entry) = self.queue.drain_one() {
            batch.push(entry);
        }
        if batch.is_empty() {
            return Ok(CycleReport::default());
        }

        self.set_state(UpdaterState::Draining);
        let start = Instant::now();
        let mut repairs = 0u32;

        loop {
            match apply_batch(self.engine.as_mut(), &batch) {
                Ok(applied) => {
                    let mut report = applied.report;
                    report.repairs = repairs;

                    if let Err(e) = self.publish() {
                        tracing::error!(error = %e, "Failed to refresh index snapshot after commit");
                    }
                    if self.registry.register(&applied.fields) {
                        tracing::debug!(
                            version = self.registry.snapshot().version,
                            "Field registry updated"
                        );
                    }

                    INDEXER_METRICS.record_cycle(
                        report.indexed,
                        report.deleted,
                        report.failed,
                        true,
                        start.elapsed().as_secs_f64(),
                    );
                    tracing::info!(
                        indexed = report.indexed,
                        deleted = report.deleted,
                        failed = report.failed,
                        repairs = report.repairs,
                        "Index batch committed"
                    );
                    self.set_state(UpdaterState::Idle);
                    return Ok(report);
                }
                Err(e) if e.is_corruption() => {
                    if repairs >= self.config.max_repair_attempts {
                        INDEXER_METRICS.record_cycle(0, 0, 0, false, start.elapsed().as_secs_f64());
                        tracing::error!(
                            attempts = repairs,
                            error = %e,
                            "Index still corrupt after repairs, giving up"
                        );
                        self.set_state(UpdaterState::Failed);
                        return Err(IndexingError::RepeatedCorruption {
                            attempts: repairs,
                            last_error: e.to_string(),
                        });
                    }

                    repairs += 1;
                    tracing::warn!(attempt = repairs, error = %e, "Index corruption detected, repairing");
                    self.set_state(UpdaterState::Repairing);
                    match self.repair() {
                        Ok(()) => INDEXER_METRICS.record_repair(true),
                        Err(repair_error) if repair_error.is_corruption() => {
                            INDEXER_METRICS.record_repair(false);
                            tracing::error!(error = %repair_error, "Index repair failed");
                        }
                        Err(repair_error) => {
                            INDEXER_METRICS.record_repair(false);
                            return Err(self.abandon_batch(batch, repair_error.into(), start));
                        }
                    }
                    self.set_state(UpdaterState::Draining);
                }
                Err(e) => return Err(self.abandon_batch(batch, e.into(), start)),
            }
        }
    }

    /// Put the batch back for the next poll after a non-corruption failure
    fn abandon_batch(&self, batch: Vec<QueueEntry>, error: IndexingError, start: Instant) -> IndexingError {
        tracing::error!(
            entries = batch.len(),
            error = %error,
            "Index cycle failed, batch requeued for the next poll"
        );
        INDEXER_METRICS.record_cycle(0, 0, 0, false, start.elapsed().as_secs_f64());
        self.queue.requeue(batch);
        self.set_state(UpdaterState::Idle);
        error
    }

    /// Clear the whole index and ask for a full rebuild
    fn repair(&mut self) -> IndexingResult<()> {
        let session = self.engine.open_writer(true)?;
        session.commit()?;
        self.publish()?;

        tracing::info!(index = %self.engine.label(), "Index cleared, requesting full rebuild");
        match &self.trigger {
            Some(trigger) => trigger.request_full_rebuild(),
            None => tracing::warn!("No rebuild trigger configured, index stays empty until the next rebuild"),
        }
        Ok(())
    }

    fn publish(&self) -> Result<(), SearchError> {
        let snapshot = self.engine.open_reader()?;
        self.handles.publish_primary(snapshot);
        Ok(())
    }

    /// Run the coordinator as a background task
    pub fn spawn(self) -> UpdaterHandle {
        let (commands, receiver) = mpsc::channel(16);
        let state = self.state.clone();
        tokio::spawn(run_loop(self, receiver));
        UpdaterHandle { commands, state }
    }
}

enum Wake {
    Tick,
    Flush(oneshot::Sender<IndexingResult<CycleReport>>),
    Stop(Option<oneshot::Sender<()>>),
}

/// One cycle on the blocking pool, handing the engine back afterwards
async fn blocking_cycle(
    mut updater: IndexUpdater,
) -> Result<(IndexUpdater, IndexingResult<CycleReport>), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let result = updater.run_cycle();
        (updater, result)
    })
    .await
}

async fn run_loop(updater: IndexUpdater, mut commands: mpsc::Receiver<UpdaterCommand>) {
    let state = updater.state.clone();
    let mut interval = tokio::time::interval(updater.config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    tracing::info!(
        poll_interval_secs = updater.config.poll_interval_secs,
        index = %updater.engine.label(),
        "Index updater started"
    );

    let mut updater = updater;
    let stop_reply;

    loop {
        let wake = tokio::select! {
            _ = interval.tick() => Wake::Tick,
            command = commands.recv() => match command {
                Some(UpdaterCommand::Flush(reply)) => Wake::Flush(reply),
                Some(UpdaterCommand::Stop(reply)) => Wake::Stop(Some(reply)),
                None => Wake::Stop(None),
            },
        };

        let reply = match wake {
            Wake::Stop(reply) => {
                stop_reply = reply;
                break;
            }
            Wake::Tick if updater.queue.is_empty() => continue,
            Wake::Tick => None,
            Wake::Flush(reply) => Some(reply),
        };

        let result = match blocking_cycle(updater).await {
            Ok((next, result)) => {
                updater = next;
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "Index cycle task failed, updater cannot continue");
                *state.write() = UpdaterState::Failed;
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e.into()));
                }
                return;
            }
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "Index cycle failed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }

        if updater.state() == UpdaterState::Failed {
            tracing::error!("Index updater failed, no further cycles will run");
            return;
        }
    }

    updater.set_state(UpdaterState::Stopped);
    tracing::info!(pending = updater.queue.size(), "Index updater stopped");
    if let Some(reply) = stop_reply {
        let _ = reply.send(());
    }
}

/// Control handle of a running coordinator
#[derive(Clone)]
pub struct UpdaterHandle {
    commands: mpsc::Sender<UpdaterCommand>,
    state: Arc<RwLock<UpdaterState>>,
}

impl UpdaterHandle {
    /// Force an immediate drain cycle and wait for its outcome
    pub async fn flush(&self) -> IndexingResult<CycleReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(UpdaterCommand::Flush(reply))
            .await
            .map_err(|_| IndexingError::UpdaterStopped)?;
        response.await.map_err(|_| IndexingError::UpdaterStopped)?
    }

    /// Stop after the cycle in progress, if any; idempotent
    pub async fn stop(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(UpdaterCommand::Stop(reply)).await.is_ok() {
            let _ = response.await;
        }
    }

    pub fn state(&self) -> UpdaterState {
        *self.state.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityPath, PageRecord, PartitionWipe, WikiPage};
    use crate::search::{SearchConfigBuilder, TantivyEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingTrigger(AtomicUsize);

    impl RebuildTrigger for CountingTrigger {
        fn request_full_rebuild(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn page(wiki: &str, name: &str) -> PageRecord {
        PageRecord::from_page(
            &WikiPage::new(EntityPath::new(wiki, "Main", name), "1.1")
                .with_title(name)
                .with_content("some content"),
        )
    }

    fn updater(dir: &TempDir) -> (IndexUpdater, Arc<IndexQueue>, Arc<ReadHandles>) {
        let config = SearchConfigBuilder::new().primary_dir(dir.path()).build();
        let engine = TantivyEngine::open(&config).unwrap();
        let handles = Arc::new(ReadHandles::new(engine.open_reader().unwrap()));
        let queue = Arc::new(IndexQueue::new());
        let updater = IndexUpdater::new(
            Box::new(engine),
            queue.clone(),
            handles.clone(),
            Arc::new(FieldRegistry::with_schema_fields()),
            UpdaterConfig::default(),
        );
        (updater, queue, handles)
    }

    #[test]
    fn test_empty_cycle_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (mut updater, _, _) = updater(&dir);
        assert_eq!(updater.run_cycle().unwrap(), CycleReport::default());
        assert_eq!(updater.state(), UpdaterState::Idle);
    }

    #[test]
    fn test_cycle_indexes_and_publishes() {
        let dir = TempDir::new().unwrap();
        let (mut updater, queue, handles) = updater(&dir);
        queue.enqueue(page("w", "A"));
        queue.enqueue(page("w", "B"));

        let report = updater.run_cycle().unwrap();
        assert_eq!(report.indexed, 2);
        assert!(queue.is_empty());
        assert_eq!(handles.indexed_count(), 2);
    }

    #[test]
    fn test_deleting_unknown_key_is_harmless() {
        let dir = TempDir::new().unwrap();
        let (mut updater, queue, handles) = updater(&dir);
        queue.enqueue(PageRecord::deleted(EntityPath::new("w", "Main", "Ghost"), None));

        let report = updater.run_cycle().unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(handles.indexed_count(), 0);
    }

    #[test]
    fn test_partition_wipe_removes_only_that_partition() {
        let dir = TempDir::new().unwrap();
        let (mut updater, queue, handles) = updater(&dir);
        queue.enqueue(page("w1", "A"));
        queue.enqueue(page("w2", "B"));
        updater.run_cycle().unwrap();

        queue.enqueue(PartitionWipe::new("w1"));
        updater.run_cycle().unwrap();
        assert_eq!(handles.indexed_count(), 1);
    }

    #[test]
    fn test_repair_without_corruption_never_triggers() {
        let dir = TempDir::new().unwrap();
        let trigger = Arc::new(CountingTrigger(AtomicUsize::new(0)));
        let (updater, queue, _) = updater(&dir);
        let mut updater = updater.with_rebuild_trigger(trigger.clone());
        queue.enqueue(page("w", "A"));
        updater.run_cycle().unwrap();
        assert_eq!(trigger.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawned_updater_flush_and_stop() {
        let dir = TempDir::new().unwrap();
        let (updater, queue, handles) = updater(&dir);
        let handle = updater.spawn();

        queue.enqueue(page("w", "A"));
        let report = handle.flush().await.unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(handles.indexed_count(), 1);

        handle.stop().await;
        assert_eq!(handle.state(), UpdaterState::Stopped);
        assert!(matches!(handle.flush().await, Err(IndexingError::UpdaterStopped)));
    }
}
