//! Query engine over committed index state

mod common;

use common::*;
use std::sync::Arc;
use tempfile::TempDir;
use wiki_indexer::indexing::RebuildRequest;
use wiki_indexer::models::{
    AttachmentInfo, AttachmentRecord, EntityPath, IndexRecord, PageRecord, RecordKind, WikiPage,
};
use wiki_indexer::search::{
    IndexEngine, QueryParseError, SearchConfigBuilder, SearchError, SearchRequest, TantivyEngine,
};
use wiki_indexer::store::{InMemoryContentStore, PlainTextExtractor};
use wiki_indexer::{Config, IndexService};

async fn indexed_fixture(config: &Config) -> IndexService {
    indexed_store(config, Arc::new(fixture_store())).await
}

async fn indexed_store(config: &Config, store: Arc<InMemoryContentStore>) -> IndexService {
    let service = IndexService::start(config, store, Arc::new(PlainTextExtractor::new()))
        .await
        .unwrap();

    service.start_rebuild(RebuildRequest::all()).unwrap();
    service.wait_for_rebuild().await;
    service.flush().await.unwrap();
    service
}

fn ids(results: &wiki_indexer::search::SearchResults) -> Vec<&str> {
    results.hits.iter().map(|hit| hit.id.as_str()).collect()
}

#[tokio::test]
async fn test_multi_query_finds_single_page() {
    let dir = TempDir::new().unwrap();
    let service = IndexService::start(
        &test_config(&dir),
        Arc::new(InMemoryContentStore::new()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    service.enqueue(PageRecord::from_page(
        &WikiPage::new(home(), "1.1").with_title("Hello"),
    ));
    service.flush().await.unwrap();

    let results = service
        .search(&SearchRequest::new("MULTI Hello"))
        .await
        .unwrap();
    assert_eq!(results.total_hits, 1);
    assert_eq!(ids(&results), vec!["wikiA.Main.WebHome.default"]);
    assert_eq!(results.hits[0].kind, Some(RecordKind::Page));
    service.shutdown().await;
}

#[tokio::test]
async fn test_default_fields_cover_content_and_title() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let by_content = service.search(&SearchRequest::new("Welcome")).await.unwrap();
    assert_eq!(ids(&by_content), vec![home_key().as_str()]);

    let by_title = service.search(&SearchRequest::new("Bonjour")).await.unwrap();
    assert_eq!(by_title.total_hits, 1);
    assert_eq!(by_title.hits[0].language, "fr");
    service.shutdown().await;
}

#[tokio::test]
async fn test_partition_and_language_filters() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let everywhere = service.search(&SearchRequest::new("wiki")).await.unwrap();
    assert_eq!(everywhere.total_hits, 3);

    let wiki_b = service
        .search(&SearchRequest::new("wiki").with_partition_list("wikiB"))
        .await
        .unwrap();
    assert_eq!(ids(&wiki_b), vec!["wikiB.Main.WebHome.default"]);

    let french = service
        .search(&SearchRequest::new("wiki").with_languages(["fr"]))
        .await
        .unwrap();
    assert_eq!(ids(&french), vec!["wikiA.Main.WebHome.fr"]);

    let default_language = service
        .search(
            &SearchRequest::new("wiki")
                .with_partitions(["wikiA"])
                .with_languages([""]),
        )
        .await
        .unwrap();
    assert_eq!(ids(&default_language), vec![home_key().as_str()]);
    service.shutdown().await;
}

#[tokio::test]
async fn test_sort_keys_and_direction() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let titles = |results: &wiki_indexer::search::SearchResults| {
        results
            .hits
            .iter()
            .map(|hit| hit.title.clone())
            .collect::<Vec<_>>()
    };

    let ascending = service
        .search(&SearchRequest::new("wiki").with_sort(["title"]))
        .await
        .unwrap();
    assert_eq!(titles(&ascending), vec!["Bonjour", "Hello", "Other wiki home"]);

    let descending = service
        .search(&SearchRequest::new("wiki").with_sort(["-title"]))
        .await
        .unwrap();
    assert_eq!(titles(&descending), vec!["Other wiki home", "Hello", "Bonjour"]);
    service.shutdown().await;
}

#[tokio::test]
async fn test_sort_orders_every_match_beyond_max_results() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.index.max_results = 2;
    let service = IndexService::start(
        &config,
        Arc::new(InMemoryContentStore::new()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    for title in ["Bbb", "Zzz", "Aaa"] {
        service.enqueue(PageRecord::from_page(
            &WikiPage::new(EntityPath::new("wikiA", "Fruit", title), "1.1")
                .with_title(title)
                .with_content("apple"),
        ));
    }
    service.flush().await.unwrap();

    let last = service
        .search(&SearchRequest::new("apple").with_sort(["-title"]).with_limit(1))
        .await
        .unwrap();
    assert_eq!(last.total_hits, 3);
    assert_eq!(last.hits[0].title, "Zzz");

    let first = service
        .search(&SearchRequest::new("apple").with_sort(["title"]).with_limit(1))
        .await
        .unwrap();
    assert_eq!(first.hits[0].title, "Aaa");
    service.shutdown().await;
}

#[tokio::test]
async fn test_pagination() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let page = service
        .search(
            &SearchRequest::new("wiki")
                .with_sort(["title"])
                .with_offset(1)
                .with_limit(1),
        )
        .await
        .unwrap();
    assert_eq!(page.total_hits, 3);
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].title, "Hello");
    service.shutdown().await;
}

#[tokio::test]
async fn test_object_properties() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;
    let sandbox = "wikiA.Sandbox.TestPage.default";

    let scoped = service
        .search(&SearchRequest::new("PROP Blog.BlogPostClass.summary: roadmap"))
        .await
        .unwrap();
    assert_eq!(ids(&scoped), vec![sandbox]);

    let list_key = service
        .search(&SearchRequest::new("PROP Blog.BlogPostClass.category: Blog.News"))
        .await
        .unwrap();
    assert_eq!(ids(&list_key), vec![sandbox]);

    let multi = service
        .search(&SearchRequest::new("MULTI roadmap"))
        .await
        .unwrap();
    assert_eq!(ids(&multi), vec![sandbox]);

    let password = service
        .search(&SearchRequest::new("PROP Blog.BlogPostClass.secret: hunter2"))
        .await
        .unwrap();
    assert_eq!(password.total_hits, 0);

    let class = service
        .search(&SearchRequest::new("object:Blog.BlogPostClass"))
        .await
        .unwrap();
    assert_eq!(ids(&class), vec![sandbox]);
    assert!(class.hits[0].fields.contains_key("Blog.BlogPostClass.summary"));
    service.shutdown().await;
}

#[tokio::test]
async fn test_attachment_hit_resolves_download_reference() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let results = service
        .search(&SearchRequest::new("filename:release-notes.txt"))
        .await
        .unwrap();
    assert_eq!(results.total_hits, 1);

    let hit = &results.hits[0];
    assert_eq!(hit.kind, Some(RecordKind::Attachment));
    assert_eq!(hit.filename.as_deref(), Some("release-notes.txt"));
    assert_eq!(
        hit.url.as_deref(),
        Some("/download/wikiA/Main/WebHome/release-notes.txt")
    );

    let by_text = service
        .search(&SearchRequest::new("\"notes for version\""))
        .await
        .unwrap();
    assert_eq!(by_text.hits[0].id, hit.id);
    service.shutdown().await;
}

#[tokio::test]
async fn test_attachments_rank_below_their_owner_page() {
    let dir = TempDir::new().unwrap();
    let service = IndexService::start(
        &test_config(&dir),
        Arc::new(InMemoryContentStore::new()),
        Arc::new(PlainTextExtractor::new()),
    )
    .await
    .unwrap();

    let owner = WikiPage::new(EntityPath::new("wikiA", "Finance", "Budget"), "1.1")
        .with_title("Budget")
        .with_content("yearly planning");
    let info = AttachmentInfo::new("numbers.txt", "text/plain", 10);
    service.enqueue(PageRecord::from_page(&owner));
    service.enqueue(AttachmentRecord::new(&owner, &info, Some("q3 figures".into())));
    service.flush().await.unwrap();

    let results = service.search(&SearchRequest::new("Budget")).await.unwrap();
    assert_eq!(results.total_hits, 2);
    let (page, attachment) = (&results.hits[0], &results.hits[1]);
    assert_eq!(page.kind, Some(RecordKind::Page));
    assert_eq!(attachment.kind, Some(RecordKind::Attachment));
    assert!(
        page.score > 2.0 * attachment.score,
        "page {} vs attachment {}",
        page.score,
        attachment.score
    );
    // owner title and name are still projected onto the attachment
    assert_eq!(attachment.title, "Budget");
    assert_eq!(attachment.name, "Budget");

    let by_title = service
        .search(&SearchRequest::new("PROP title: Budget"))
        .await
        .unwrap();
    assert_eq!(by_title.total_hits, 1);
    assert_eq!(by_title.hits[0].kind, Some(RecordKind::Page));
    service.shutdown().await;
}

#[tokio::test]
async fn test_unresolvable_download_reference_keeps_the_hit() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(fixture_store());
    let service = indexed_store(&test_config(&dir), store.clone()).await;

    store.remove_attachment(&home(), "release-notes.txt");

    let results = service
        .search(&SearchRequest::new("filename:release-notes.txt"))
        .await
        .unwrap();
    assert_eq!(results.total_hits, 1);
    assert_eq!(results.hits[0].kind, Some(RecordKind::Attachment));
    assert_eq!(results.hits[0].url, None);
    service.shutdown().await;
}

#[tokio::test]
async fn test_parse_errors_are_typed() {
    let dir = TempDir::new().unwrap();
    let service = indexed_fixture(&test_config(&dir)).await;

    let err = service
        .search(&SearchRequest::new("title:(hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::QueryParse(QueryParseError::UnbalancedParenthesis { .. })
    ));

    let err = service.search(&SearchRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, SearchError::QueryParse(QueryParseError::Empty)));
    service.shutdown().await;
}

/// Index one page into a standalone index directory
fn build_side_index(dir: &TempDir, title: &str) {
    let config = SearchConfigBuilder::new().primary_dir(dir.path()).build();
    let mut engine = TantivyEngine::open(&config).unwrap();
    let record: IndexRecord = PageRecord::from_page(
        &WikiPage::new(EntityPath::new("archive", "Main", "Old"), "1.1").with_title(title),
    )
    .into();

    let mut session = engine.open_writer(false).unwrap();
    session.upsert(&record.key(), &record.fields()).unwrap();
    session.commit().unwrap();
}

#[tokio::test]
async fn test_read_only_indexes_are_merged() {
    let dir = TempDir::new().unwrap();
    let side = TempDir::new().unwrap();
    build_side_index(&side, "Hello from the archive");

    let mut config = test_config(&dir);
    config.index.read_only_dirs = vec![side.path().to_path_buf()];
    let service = indexed_fixture(&config).await;

    let results = service.search(&SearchRequest::new("hello")).await.unwrap();
    let labels: std::collections::BTreeSet<_> =
        results.hits.iter().map(|hit| hit.index.clone()).collect();
    assert_eq!(labels.len(), 2);
    assert!(ids(&results).contains(&"archive.Main.Old.default"));

    let only_side = service
        .search_indexes(&SearchRequest::new("hello"), &[side.path().to_path_buf()])
        .await
        .unwrap();
    assert_eq!(ids(&only_side), vec!["archive.Main.Old.default"]);
    service.shutdown().await;
}
