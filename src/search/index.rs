//! Index engine adapter: exclusive write sessions and immutable read snapshots

use crate::models::{IndexField, IndexKey};
use crate::search::config::{AnalyzerKind, SearchConfig};
use crate::search::document::{build_analyzer, build_wiki_schema, IndexFields, TEXT_TOKENIZER};
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Index the numbers belong to
    pub label: String,

    /// Total number of live documents
    pub total_documents: u64,

    /// Index size in bytes
    pub index_size_bytes: u64,

    /// Number of segments
    pub num_segments: usize,
}

/// Full-text index that can be written by exactly one owner
///
/// Write sessions borrow the engine mutably, so holding the engine is the
/// only way to mutate the index.
pub trait IndexEngine: Send + 'static {
    /// Open a write session, wiping the index first when `create` is set
    fn open_writer(&mut self, create: bool) -> SearchResult<Box<dyn IndexWriteSession + '_>>;

    /// Snapshot of the last committed state
    fn open_reader(&self) -> SearchResult<IndexSnapshot>;

    /// Whether the index did not exist (or was unusable) when the engine was opened
    fn created_new(&self) -> bool;

    fn label(&self) -> &str;
}

/// Pending mutations against an index, applied atomically on commit
pub trait IndexWriteSession {
    /// Delete any document with `key` then add one built from `fields`
    fn upsert(&mut self, key: &IndexKey, fields: &[IndexField]) -> SearchResult<()>;

    fn delete_by_key(&mut self, key: &IndexKey) -> SearchResult<()>;

    /// Delete every document of a partition
    fn delete_partition(&mut self, wiki: &str) -> SearchResult<()>;

    fn commit(self: Box<Self>) -> SearchResult<()>;
}

fn index_exists(path: &Path) -> bool {
    path.join("meta.json").exists()
}

fn register_analyzer(index: &Index, analyzer: AnalyzerKind) {
    index
        .tokenizers()
        .register(TEXT_TOKENIZER, build_analyzer(analyzer));
}

fn manual_reader(index: &Index) -> SearchResult<IndexReader> {
    Ok(index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?)
}

/// Open the index in `dir`, surfacing corruption as [`SearchError::IndexCorruption`]
fn open_existing(dir: &Path) -> SearchResult<(Index, IndexFields)> {
    let index = Index::open_in_dir(dir)?;
    let fields = IndexFields::new(index.schema()).map_err(|e| {
        SearchError::IndexCorruption(format!("incompatible schema in {}: {}", dir.display(), e))
    })?;
    Ok((index, fields))
}

fn create_fresh(dir: &Path) -> SearchResult<(Index, IndexFields)> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;

    let schema = build_wiki_schema();
    let index = Index::create_in_dir(dir, schema.clone())?;
    let fields = IndexFields::new(schema)?;
    Ok((index, fields))
}

fn directory_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

/// Tantivy-backed primary index
pub struct TantivyEngine {
    dir: PathBuf,
    label: String,
    analyzer: AnalyzerKind,
    writer_heap_size: usize,
    index: Index,
    fields: Arc<IndexFields>,
    reader: IndexReader,
    created_new: bool,
}

impl TantivyEngine {
    /// Open or create the primary index described by `config`
    ///
    /// A corrupt or incompatible index is replaced by an empty one and reported
    /// through [`IndexEngine::created_new`] so that a rebuild can repopulate it.
    pub fn open(config: &SearchConfig) -> SearchResult<Self> {
        let dir = config.primary_dir.clone();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SearchError::IndexInitFailed(format!("Failed to create index directory: {}", e))
        })?;

        let (index, fields, created_new) = if index_exists(&dir) {
            match open_existing(&dir) {
                Ok((index, fields)) => (index, fields, false),
                Err(err) if err.is_corruption() => {
                    tracing::warn!(dir = %dir.display(), error = %err, "Replacing unusable index");
                    let (index, fields) = create_fresh(&dir)?;
                    (index, fields, true)
                }
                Err(err) => return Err(err),
            }
        } else {
            let (index, fields) = create_fresh(&dir)?;
            (index, fields, true)
        };

        register_analyzer(&index, config.analyzer);
        let reader = manual_reader(&index)?;

        tracing::info!(
            dir = %dir.display(),
            analyzer = %config.analyzer,
            created_new,
            "Primary index opened"
        );

        Ok(Self {
            label: dir.display().to_string(),
            dir,
            analyzer: config.analyzer,
            writer_heap_size: config.writer_heap_size,
            index,
            fields: Arc::new(fields),
            reader,
            created_new,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn recreate(&mut self) -> SearchResult<()> {
        let (index, fields) = create_fresh(&self.dir)?;
        register_analyzer(&index, self.analyzer);
        self.reader = manual_reader(&index)?;
        self.index = index;
        self.fields = Arc::new(fields);
        tracing::warn!(dir = %self.dir.display(), "Index recreated empty");
        Ok(())
    }
}

impl IndexEngine for TantivyEngine {
    fn open_writer(&mut self, create: bool) -> SearchResult<Box<dyn IndexWriteSession + '_>> {
        if create {
            self.recreate()?;
        }

        let writer: IndexWriter = self
            .index
            .writer_with_num_threads(1, self.writer_heap_size)?;

        Ok(Box::new(TantivyWriteSession {
            writer,
            fields: &self.fields,
        }))
    }

    fn open_reader(&self) -> SearchResult<IndexSnapshot> {
        self.reader.reload()?;
        Ok(IndexSnapshot {
            label: self.label.clone(),
            dir: Some(self.dir.clone()),
            index: self.index.clone(),
            fields: self.fields.clone(),
            searcher: self.reader.searcher(),
        })
    }

    fn created_new(&self) -> bool {
        self.created_new
    }

    fn label(&self) -> &str {
        &self.label
    }
}

struct TantivyWriteSession<'a> {
    writer: IndexWriter,
    fields: &'a IndexFields,
}

impl IndexWriteSession for TantivyWriteSession<'_> {
    fn upsert(&mut self, key: &IndexKey, fields: &[IndexField]) -> SearchResult<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.id, key.as_str()));
        self.writer.add_document(self.fields.to_document(fields))?;
        Ok(())
    }

    fn delete_by_key(&mut self, key: &IndexKey) -> SearchResult<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.id, key.as_str()));
        Ok(())
    }

    fn delete_partition(&mut self, wiki: &str) -> SearchResult<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.wiki, wiki));
        Ok(())
    }

    fn commit(self: Box<Self>) -> SearchResult<()> {
        let TantivyWriteSession { mut writer, .. } = *self;
        writer.commit()?;
        writer.wait_merging_threads()?;
        Ok(())
    }
}

/// Immutable view of one index at a committed generation
#[derive(Clone)]
pub struct IndexSnapshot {
    label: String,
    dir: Option<PathBuf>,
    index: Index,
    fields: Arc<IndexFields>,
    searcher: Searcher,
}

impl IndexSnapshot {
    /// Snapshot of an index that is never written by this process
    ///
    /// A missing index is created empty so that searching it yields no hits.
    pub fn open_read_only(dir: &Path, analyzer: AnalyzerKind) -> SearchResult<Self> {
        let (index, fields) = if index_exists(dir) {
            open_existing(dir)?
        } else {
            tracing::info!(dir = %dir.display(), "Creating missing read-only index");
            create_fresh(dir)?
        };

        register_analyzer(&index, analyzer);
        let reader = manual_reader(&index)?;

        Ok(Self {
            label: dir.display().to_string(),
            dir: Some(dir.to_path_buf()),
            searcher: reader.searcher(),
            index,
            fields: Arc::new(fields),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fields(&self) -> &IndexFields {
        &self.fields
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Analyzer used by tokenized fields of this index
    pub fn analyzer(&self) -> SearchResult<TextAnalyzer> {
        self.index.tokenizers().get(TEXT_TOKENIZER).ok_or_else(|| {
            SearchError::InvalidConfiguration(format!("tokenizer {} not registered", TEXT_TOKENIZER))
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    /// Version stored for `key`, `None` when the key is not indexed
    pub fn stored_version(&self, key: &IndexKey) -> SearchResult<Option<String>> {
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, key.as_str()),
            IndexRecordOption::Basic,
        );
        let top = self.searcher.search(&query, &TopDocs::with_limit(1))?;

        match top.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = self.searcher.doc(*address)?;
                Ok(doc
                    .get_first(self.fields.version)
                    .and_then(|v| v.as_str())
                    .map(str::to_string))
            }
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            label: self.label.clone(),
            total_documents: self.num_docs(),
            index_size_bytes: self.dir.as_deref().map(directory_size).unwrap_or(0),
            num_segments: self.searcher.segment_readers().len(),
        }
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("label", &self.label)
            .field("num_docs", &self.num_docs())
            .finish()
    }
}
