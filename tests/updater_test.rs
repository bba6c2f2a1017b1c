//! Writer coordinator: batching, deletes, corruption repair

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiki_indexer::indexing::{IndexingError, UpdaterState};
use wiki_indexer::models::{EntityPath, IndexKey, PageRecord, WikiPage};
use wiki_indexer::search::{SearchError, SearchRequest, TantivyEngine};
use wiki_indexer::store::PlainTextExtractor;
use wiki_indexer::IndexService;

fn page(name: &str, title: &str) -> PageRecord {
    PageRecord::from_page(
        &WikiPage::new(EntityPath::new("wikiA", "Main", name), "1.1").with_title(title),
    )
}

async fn start(dir: &TempDir) -> IndexService {
    IndexService::start(
        &test_config(dir),
        Arc::new(fixture_store()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_nothing_visible_before_flush() {
    let dir = TempDir::new().unwrap();
    let service = start(&dir).await;

    service.enqueue(page("A", "Alpha"));
    assert_eq!(service.queue_depth(), 1);
    assert_eq!(service.indexed_count(), 0);

    let report = service.flush().await.unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(service.queue_depth(), 0);
    assert_eq!(service.indexed_count(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_reindexing_replaces_instead_of_duplicating() {
    let dir = TempDir::new().unwrap();
    let service = start(&dir).await;

    service.enqueue(page("A", "First title"));
    service.flush().await.unwrap();
    service.enqueue(page("A", "Second title"));
    service.flush().await.unwrap();

    assert_eq!(service.indexed_count(), 1);
    let results = service
        .search(&SearchRequest::new("id:wikiA.Main.A.default"))
        .await
        .unwrap();
    assert_eq!(results.total_hits, 1);
    assert_eq!(results.hits[0].title, "Second title");
    service.shutdown().await;
}

#[tokio::test]
async fn test_deleting_absent_key_leaves_index_unchanged() {
    let dir = TempDir::new().unwrap();
    let service = start(&dir).await;

    service.enqueue(page("A", "Alpha"));
    service.flush().await.unwrap();

    service.enqueue(PageRecord::deleted(EntityPath::new("wikiA", "Main", "Ghost"), None));
    let report = service.flush().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(service.indexed_count(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_corruption_repairs_and_rebuilds() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let engine = FaultyEngine::new(TantivyEngine::open(&config.index).unwrap(), 0);
    let failures = engine.failures();

    let service = IndexService::start_with_engine(
        &config,
        Box::new(engine),
        Arc::new(fixture_store()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    // an entry committed before the corruption is lost by the repair
    service.enqueue(page("Earlier", "Committed before"));
    service.flush().await.unwrap();
    assert_eq!(service.indexed_count(), 1);

    failures.store(1, Ordering::SeqCst);
    for name in ["One", "Two", "Three"] {
        service.enqueue(page(name, name));
    }
    let report = service.flush().await.unwrap();
    assert_eq!(report.repairs, 1);
    assert_eq!(report.indexed, 3);
    assert_eq!(service.indexed_count(), 3);
    assert_eq!(service.updater_state(), UpdaterState::Idle);

    // the repair requested a full rebuild of the store
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.wait_for_rebuild().await;
    service.flush().await.unwrap();

    assert_eq!(service.indexed_count(), 3 + FIXTURE_RECORDS as u64);
    let results = service
        .search(&SearchRequest::new("MULTI Hello").with_partitions(["wikiA"]))
        .await
        .unwrap();
    assert!(results
        .hits
        .iter()
        .any(|hit| hit.id == home_key().as_str()));
    service.shutdown().await;
}

async fn start_faulty(config: &wiki_indexer::Config, engine: FaultyEngine) -> IndexService {
    IndexService::start_with_engine(
        config,
        Box::new(engine),
        Arc::new(fixture_store()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_failing_document_is_skipped_and_batch_commits() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let broken = page("Broken", "Broken");
    let engine = FaultyEngine::new(TantivyEngine::open(&config.index).unwrap(), 0)
        .rejecting(broken.key());
    let service = start_faulty(&config, engine).await;

    service.enqueue(page("One", "One"));
    service.enqueue(broken);
    service.enqueue(page("Two", "Two"));
    let report = service.flush().await.unwrap();

    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.repairs, 0);
    assert_eq!(service.indexed_count(), 2);
    // a skipped document is not retried
    assert_eq!(service.queue_depth(), 0);
    assert_eq!(service.updater_state(), UpdaterState::Idle);
    service.shutdown().await;
}

#[tokio::test]
async fn test_io_failure_requeues_batch_for_next_cycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let engine = FaultyEngine::new(TantivyEngine::open(&config.index).unwrap(), 0);
    let io_failures = engine.io_failures();
    let service = start_faulty(&config, engine).await;

    io_failures.store(1, Ordering::SeqCst);
    service.enqueue(page("A", "Alpha"));
    service.enqueue(page("B", "Beta"));

    let err = service.flush().await.unwrap_err();
    assert!(matches!(err, IndexingError::Search(SearchError::Io(_))));
    assert_eq!(service.queue_depth(), 2);
    assert_eq!(service.indexed_count(), 0);
    assert_eq!(service.updater_state(), UpdaterState::Idle);

    // a newer value enqueued meanwhile wins over the requeued one
    service.enqueue(page("A", "Alpha revised"));
    let report = service.flush().await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(service.indexed_count(), 2);

    let results = service
        .search(&SearchRequest::new("id:wikiA.Main.A.default"))
        .await
        .unwrap();
    assert_eq!(results.hits[0].title, "Alpha revised");
    service.shutdown().await;
}

#[tokio::test]
async fn test_repeated_corruption_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let attempts = config.updater.max_repair_attempts;
    let engine = FaultyEngine::new(TantivyEngine::open(&config.index).unwrap(), attempts + 1);

    let service = IndexService::start_with_engine(
        &config,
        Box::new(engine),
        Arc::new(fixture_store()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    service.enqueue(page("A", "Alpha"));
    let err = service.flush().await.unwrap_err();
    assert!(matches!(
        err,
        IndexingError::RepeatedCorruption { attempts: a, .. } if a == attempts
    ));
    assert_eq!(service.updater_state(), UpdaterState::Failed);
    assert!(matches!(
        service.flush().await,
        Err(IndexingError::UpdaterStopped)
    ));
}

#[tokio::test]
async fn test_fresh_index_is_rebuilt_at_startup() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.rebuild.rebuild_on_empty_index = true;

    let service = IndexService::start(
        &config,
        Arc::new(fixture_store()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    service.wait_for_rebuild().await;
    service.flush().await.unwrap();
    assert_eq!(service.indexed_count(), FIXTURE_RECORDS as u64);

    let translation = SearchRequest::new(format!("id:{}", IndexKey::page(&home(), "fr")));
    assert_eq!(service.search(&translation).await.unwrap().total_hits, 1);
    service.shutdown().await;
}
