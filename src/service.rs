//! Administrative facade wiring the indexing pipeline and the query engine

use crate::config::Config;
use crate::error::Result;
use crate::indexing::{
    init_indexer_metrics, ContentEvent, CycleReport, IndexEventListener, IndexQueue,
    IndexRebuilder, IndexUpdater, IndexingResult, RebuildProgress, RebuildRequest, RebuildStatus,
    RecordLoader, UpdaterHandle, UpdaterState,
};
use crate::models::IndexRecord;
use crate::search::{
    FieldRegistry, IndexEngine, IndexStats, ReadHandles, SearchRequest, SearchResult,
    SearchResults, SearchService, TantivyEngine,
};
use crate::store::{ContentStore, TextExtractor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use validator::Validate;

/// Running indexing pipeline plus search
pub struct IndexService {
    queue: Arc<IndexQueue>,
    handles: Arc<ReadHandles>,
    updater: UpdaterHandle,
    rebuilder: IndexRebuilder,
    listener: IndexEventListener,
    search: SearchService,
}

impl IndexService {
    /// Open the configured primary index and start the writer coordinator
    pub async fn start(
        config: &Config,
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = TantivyEngine::open(&config.index)?;
        Self::start_with_engine(config, Box::new(engine), store, extractor).await
    }

    /// Same as [`IndexService::start`] with a caller-provided engine
    pub async fn start_with_engine(
        config: &Config,
        engine: Box<dyn IndexEngine>,
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        if config.observability.metrics_enabled {
            init_indexer_metrics();
        }

        let created_new = engine.created_new();
        let handles = Arc::new(ReadHandles::with_read_only(
            engine.open_reader()?,
            &config.index.read_only_dirs,
            config.index.analyzer,
        )?);
        let registry = Arc::new(FieldRegistry::with_schema_fields());
        let queue = Arc::new(IndexQueue::new());
        let loader = RecordLoader::new(store.clone(), extractor);

        let rebuilder = IndexRebuilder::new(
            loader.clone(),
            queue.clone(),
            handles.clone(),
            config.rebuild.clone(),
        );

        let updater = IndexUpdater::new(
            engine,
            queue.clone(),
            handles.clone(),
            registry.clone(),
            config.updater.clone(),
        )
        .with_rebuild_trigger(Arc::new(rebuilder.clone()))
        .spawn();

        let listener = IndexEventListener::new(loader, queue.clone());
        let search = SearchService::new(handles.clone(), registry, store, config.index.clone());

        tracing::info!(
            primary = %config.index.primary_dir.display(),
            read_only = config.index.read_only_dirs.len(),
            created_new,
            "Index service started"
        );

        if created_new && config.rebuild.rebuild_on_empty_index {
            tracing::info!("Primary index was just created, rebuilding it");
            rebuilder.start_rebuild(RebuildRequest::all())?;
        }

        Ok(Self {
            queue,
            handles,
            updater,
            rebuilder,
            listener,
            search,
        })
    }

    pub fn start_rebuild(&self, request: RebuildRequest) -> Result<RebuildStatus> {
        Ok(self.rebuilder.start_rebuild(request)?)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilder.is_running()
    }

    pub fn rebuild_progress(&self) -> RebuildProgress {
        self.rebuilder.progress()
    }

    /// Wait for the running rebuild, if any, to finish enumerating
    pub async fn wait_for_rebuild(&self) {
        self.rebuilder
            .wait_idle(std::time::Duration::from_millis(50))
            .await;
    }

    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchResults> {
        self.search.search(request).await
    }

    pub async fn search_indexes(
        &self,
        request: &SearchRequest,
        dirs: &[PathBuf],
    ) -> SearchResult<SearchResults> {
        self.search.search_indexes(request, dirs).await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    /// Documents visible in the primary index
    pub fn indexed_count(&self) -> u64 {
        self.handles.indexed_count()
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        self.handles.stats()
    }

    pub fn updater_state(&self) -> UpdaterState {
        self.updater.state()
    }

    pub async fn handle_event(&self, event: ContentEvent) -> IndexingResult<()> {
        self.listener.handle(event).await
    }

    /// Channel feeding a background listener task
    pub fn event_sender(&self, buffer: usize) -> mpsc::Sender<ContentEvent> {
        let (sender, receiver) = mpsc::channel(buffer);
        tokio::spawn(self.listener.clone().run(receiver));
        sender
    }

    pub fn enqueue(&self, record: impl Into<IndexRecord>) {
        self.queue.enqueue(record);
    }

    /// Drain the queue now instead of waiting for the next poll
    pub async fn flush(&self) -> IndexingResult<CycleReport> {
        self.updater.flush().await
    }

    /// Stop the writer coordinator; queued entries that were not flushed are dropped
    pub async fn shutdown(self) {
        let pending = self.queue.size();
        if pending > 0 {
            tracing::warn!(pending, "Shutting down with unflushed queue entries");
        }
        self.updater.stop().await;
        tracing::info!("Index service stopped");
    }
}
