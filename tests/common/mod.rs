//! Common test utilities: fixture content store, configuration and a
//! fault-injecting index engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiki_indexer::config::Config;
use wiki_indexer::models::{
    AttachmentInfo, EntityPath, IndexField, IndexKey, ListItem, PropertyValue, StructuredObject,
    WikiPage,
};
use wiki_indexer::search::{
    IndexEngine, IndexSnapshot, IndexWriteSession, SearchConfigBuilder, SearchError, SearchResult,
    TantivyEngine,
};
use wiki_indexer::store::InMemoryContentStore;

/// Configuration writing to `dir`, with a poll interval long enough that only
/// explicit flushes drain the queue
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.index = SearchConfigBuilder::new().primary_dir(dir.path()).build();
    config.updater.poll_interval_secs = 3600;
    config.rebuild.retry_interval_ms = 5;
    config.rebuild.rebuild_on_empty_index = false;
    config.observability.metrics_enabled = true;
    config
}

pub fn home() -> EntityPath {
    EntityPath::new("wikiA", "Main", "WebHome")
}

/// Two wikis, a translation, structured objects and attachments
pub fn fixture_store() -> InMemoryContentStore {
    let store = InMemoryContentStore::new();

    store.put_page(
        WikiPage::new(home(), "1.1")
            .with_title("Hello")
            .with_author("XWiki.Admin")
            .with_content("Welcome to the wiki"),
    );
    store.put_page(
        WikiPage::new(home(), "1.1")
            .with_language("fr")
            .with_title("Bonjour")
            .with_content("Bienvenue sur le wiki"),
    );
    store.put_page(
        WikiPage::new(EntityPath::new("wikiA", "Sandbox", "TestPage"), "3.2")
            .with_title("Sandbox test page")
            .with_content("A place to experiment with syntax")
            .with_object(
                StructuredObject::new("Blog.BlogPostClass")
                    .with_property("category", PropertyValue::List(vec![
                        ListItem::new("Blog.News", "News"),
                        ListItem::plain("Release"),
                    ]))
                    .with_property("summary", PropertyValue::Text("quarterly roadmap".into()))
                    .with_property("secret", PropertyValue::Password("hunter2".into())),
            ),
    );
    store.put_page(
        WikiPage::new(EntityPath::new("wikiB", "Main", "WebHome"), "1.4")
            .with_title("Other wiki home")
            .with_content("Hello from the second wiki"),
    );

    store
        .put_attachment(
            &home(),
            AttachmentInfo::new("release-notes.txt", "text/plain", 27),
            b"Release notes for version 2".to_vec(),
        )
        .unwrap();

    store
}

/// Page count plus attachment count of [`fixture_store`]
pub const FIXTURE_RECORDS: usize = 5;

/// Key of the default-language home page
pub fn home_key() -> IndexKey {
    IndexKey::page(&home(), "default")
}

/// Wraps a real engine and fails the next `failures` non-create commits with corruption
///
/// It can also fail commits with a plain I/O error and reject the upsert of one key.
pub struct FaultyEngine {
    inner: TantivyEngine,
    failures: Arc<AtomicU32>,
    io_failures: Arc<AtomicU32>,
    rejected: Option<IndexKey>,
}

impl FaultyEngine {
    pub fn new(inner: TantivyEngine, failures: u32) -> Self {
        Self {
            inner,
            failures: Arc::new(AtomicU32::new(failures)),
            io_failures: Arc::new(AtomicU32::new(0)),
            rejected: None,
        }
    }

    /// Every upsert of `key` fails with a non-corruption error
    pub fn rejecting(mut self, key: IndexKey) -> Self {
        self.rejected = Some(key);
        self
    }

    /// Counter of the corruption faults still to inject
    pub fn failures(&self) -> Arc<AtomicU32> {
        self.failures.clone()
    }

    /// Counter of the I/O commit faults still to inject
    pub fn io_failures(&self) -> Arc<AtomicU32> {
        self.io_failures.clone()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl IndexEngine for FaultyEngine {
    fn open_writer(&mut self, create: bool) -> SearchResult<Box<dyn IndexWriteSession + '_>> {
        let failures = self.failures.clone();
        let io_failures = self.io_failures.clone();
        let rejected = self.rejected.clone();
        let inner = self.inner.open_writer(create)?;
        Ok(Box::new(FaultySession {
            inner,
            failures,
            io_failures,
            rejected,
            create,
        }))
    }

    fn open_reader(&self) -> SearchResult<IndexSnapshot> {
        self.inner.open_reader()
    }

    fn created_new(&self) -> bool {
        self.inner.created_new()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

struct FaultySession<'a> {
    inner: Box<dyn IndexWriteSession + 'a>,
    failures: Arc<AtomicU32>,
    io_failures: Arc<AtomicU32>,
    rejected: Option<IndexKey>,
    create: bool,
}

impl IndexWriteSession for FaultySession<'_> {
    fn upsert(&mut self, key: &IndexKey, fields: &[IndexField]) -> SearchResult<()> {
        if self.rejected.as_ref() == Some(key) {
            return Err(SearchError::SchemaError(format!("cannot index {}", key)));
        }
        self.inner.upsert(key, fields)
    }

    fn delete_by_key(&mut self, key: &IndexKey) -> SearchResult<()> {
        self.inner.delete_by_key(key)
    }

    fn delete_partition(&mut self, wiki: &str) -> SearchResult<()> {
        self.inner.delete_partition(wiki)
    }

    fn commit(self: Box<Self>) -> SearchResult<()> {
        if !self.create && take_one(&self.failures) {
            return Err(SearchError::IndexCorruption("injected segment corruption".into()));
        }
        if take_one(&self.io_failures) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device").into());
        }
        self.inner.commit()
    }
}
