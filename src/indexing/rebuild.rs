//! Full-corpus rebuild orchestrator
//!
//! Enumerates partitions through the content store and feeds the resulting
//! records into the [`IndexQueue`]. Only one rebuild runs at a time, and the
//! enumeration pauses while the queue holds more than `max_queue_size` entries.

use crate::indexing::config::RebuildConfig;
use crate::indexing::error::{IndexingError, IndexingResult};
use crate::indexing::loader::RecordLoader;
use crate::indexing::metrics::INDEXER_METRICS;
use crate::indexing::queue::IndexQueue;
use crate::indexing::updater::RebuildTrigger;
use crate::models::{
    EntityDescriptor, IndexKey, IndexRecord, PageRecord, PartitionWipe, DEFAULT_LANGUAGE,
};
use crate::search::ReadHandles;
use crate::store::EntityFilter;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What to rebuild
#[derive(Debug, Clone, Default)]
pub struct RebuildRequest {
    /// Partitions to enumerate, empty meaning every partition of the store
    pub scope: Vec<String>,

    pub filter: Option<EntityFilter>,

    /// Skip entities already indexed at the same version and language
    pub only_unindexed: bool,

    /// Wipe the partitions in scope before enumerating them
    pub clear_index: bool,
}

impl RebuildRequest {
    /// Every partition, everything re-indexed
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, wiki: impl Into<String>) -> Self {
        self.scope.push(wiki.into());
        self
    }

    pub fn with_partitions<I, S>(mut self, wikis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope.extend(wikis.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: EntityFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn only_unindexed(mut self, only_unindexed: bool) -> Self {
        self.only_unindexed = only_unindexed;
        self
    }

    pub fn clear_index(mut self, clear_index: bool) -> Self {
        self.clear_index = clear_index;
        self
    }
}

/// Answer to a rebuild request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RebuildStatus {
    Started,
    /// Another rebuild is in progress; nothing was done
    AlreadyRunning,
}

/// Counters of the current (or last) rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildProgress {
    pub partitions: u64,
    pub queued: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct ProgressCounters {
    partitions: AtomicU64,
    queued: AtomicU64,
    skipped: AtomicU64,
}

impl ProgressCounters {
    fn reset(&self) {
        self.partitions.store(0, Ordering::Relaxed);
        self.queued.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RebuildProgress {
        RebuildProgress {
            partitions: self.partitions.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

struct RebuilderInner {
    loader: RecordLoader,
    queue: Arc<IndexQueue>,
    handles: Arc<ReadHandles>,
    config: RebuildConfig,
    running: AtomicBool,
    /// A repair asked for a rebuild while one was running
    pending_repair: AtomicBool,
    progress: ProgressCounters,
}

/// Clears the running flag however the enumeration ends
struct RunningGuard {
    inner: Arc<RebuilderInner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);

        if self.inner.pending_repair.swap(false, Ordering::AcqRel) {
            tracing::info!("Starting the rebuild requested by an index repair");
            let rebuilder = IndexRebuilder {
                inner: self.inner.clone(),
            };
            if let Err(e) = rebuilder.start_rebuild(RebuildRequest::all()) {
                tracing::error!(error = %e, "Failed to start pending repair rebuild");
            }
        }
    }
}

/// Single-flight corpus enumerator
#[derive(Clone)]
pub struct IndexRebuilder {
    inner: Arc<RebuilderInner>,
}

impl IndexRebuilder {
    pub fn new(
        loader: RecordLoader,
        queue: Arc<IndexQueue>,
        handles: Arc<ReadHandles>,
        config: RebuildConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RebuilderInner {
                loader,
                queue,
                handles,
                config,
                running: AtomicBool::new(false),
                pending_repair: AtomicBool::new(false),
                progress: ProgressCounters::default(),
            }),
        }
    }

    /// Start an enumeration on its own task unless one is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_rebuild(&self, request: RebuildRequest) -> IndexingResult<RebuildStatus> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            INDEXER_METRICS.record_rebuild("rejected");
            tracing::info!("Rebuild requested while another one is running");
            return Ok(RebuildStatus::AlreadyRunning);
        }

        let guard = RunningGuard {
            inner: self.inner.clone(),
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IndexingError::TaskFailed(e.to_string()))?;

        self.inner.progress.reset();
        INDEXER_METRICS.record_rebuild("started");
        tracing::info!(
            scope = ?request.scope,
            only_unindexed = request.only_unindexed,
            clear_index = request.clear_index,
            "Rebuild started"
        );

        let inner = self.inner.clone();
        runtime.spawn(async move {
            let _guard = guard;
            match enumerate(&inner, &request).await {
                Ok(()) => {
                    INDEXER_METRICS.record_rebuild("completed");
                    let progress = inner.progress.snapshot();
                    tracing::info!(
                        partitions = progress.partitions,
                        queued = progress.queued,
                        skipped = progress.skipped,
                        "Rebuild finished"
                    );
                }
                Err(e) => {
                    INDEXER_METRICS.record_rebuild("failed");
                    tracing::error!(error = %e, "Rebuild failed");
                }
            }
        });

        Ok(RebuildStatus::Started)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> RebuildProgress {
        self.inner.progress.snapshot()
    }

    /// Wait until no rebuild is running, checking every `poll`
    pub async fn wait_idle(&self, poll: Duration) {
        while self.is_running() {
            tokio::time::sleep(poll).await;
        }
    }
}

impl RebuildTrigger for IndexRebuilder {
    fn request_full_rebuild(&self) {
        match self.start_rebuild(RebuildRequest::all()) {
            Ok(RebuildStatus::Started) => {}
            Ok(RebuildStatus::AlreadyRunning) => {
                self.inner.pending_repair.store(true, Ordering::Release);
                // the running session may have ended between the two steps
                if !self.is_running() && self.inner.pending_repair.swap(false, Ordering::AcqRel) {
                    if let Err(e) = self.start_rebuild(RebuildRequest::all()) {
                        tracing::error!(error = %e, "Failed to start repair rebuild");
                    }
                } else {
                    tracing::info!("Repair rebuild deferred until the running rebuild ends");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to start repair rebuild"),
        }
    }
}

async fn enumerate(inner: &RebuilderInner, request: &RebuildRequest) -> IndexingResult<()> {
    let store = inner.loader.store();
    let partitions = if request.scope.is_empty() {
        store.list_partitions().await?
    } else {
        request.scope.clone()
    };

    if request.clear_index {
        for partition in &partitions {
            tracing::info!(partition = %partition, "Clearing partition before rebuild");
            inner.queue.enqueue(PartitionWipe::new(partition));
        }
    }

    for partition in &partitions {
        inner.progress.partitions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(partition = %partition, "Enumerating partition");

        let mut entities = store
            .list_entities(partition, request.filter.as_ref())
            .await?;

        while let Some(descriptor) = entities.next().await {
            match descriptor {
                Ok(descriptor) => visit(inner, &descriptor, request.only_unindexed).await,
                Err(e) => {
                    inner.progress.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(partition = %partition, error = %e, "Skipping unreadable entity");
                }
            }
        }
    }

    Ok(())
}

/// Queue a page and, for an original page, its attachments
async fn visit(inner: &RebuilderInner, descriptor: &EntityDescriptor, only_unindexed: bool) {
    let language = descriptor.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
    let key = IndexKey::page(&descriptor.path, language);

    if only_unindexed && already_indexed(inner, &key, &descriptor.version) {
        inner.progress.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Already indexed at this version");
        return;
    }

    let page = match inner
        .loader
        .store()
        .get_entity(&descriptor.path, descriptor.language.as_deref())
        .await
    {
        Ok(page) => page,
        Err(e) => {
            inner.progress.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, error = %e, "Skipping entity that could not be loaded");
            return;
        }
    };

    enqueue_throttled(inner, PageRecord::from_page(&page).into()).await;

    if page.language.is_some() {
        return;
    }

    for info in &page.attachments {
        let key = IndexKey::attachment(&page.path, &info.filename);
        if only_unindexed && already_indexed(inner, &key, &info.version) {
            inner.progress.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let record = inner.loader.attachment_from(&page, info).await;
        enqueue_throttled(inner, record.into()).await;
    }
}

fn already_indexed(inner: &RebuilderInner, key: &IndexKey, version: &str) -> bool {
    match inner.handles.indexed_version(key) {
        Ok(indexed) => indexed.as_deref() == Some(version),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Could not read indexed version, re-indexing");
            false
        }
    }
}

/// Enqueue once the queue is back under the configured depth
async fn enqueue_throttled(inner: &RebuilderInner, record: IndexRecord) {
    while inner.queue.size() > inner.config.max_queue_size {
        tracing::debug!(
            depth = inner.queue.size(),
            max = inner.config.max_queue_size,
            "Index queue full, pausing rebuild"
        );
        tokio::time::sleep(inner.config.retry_interval()).await;
    }

    inner.queue.enqueue(record);
    inner.progress.queued.fetch_add(1, Ordering::Relaxed);
}
