//! Query execution across index partitions and projection into result records

use crate::models::field::*;
use crate::models::{EntityPath, RecordKind};
use crate::search::config::SearchConfig;
use crate::search::error::SearchResult;
use crate::search::handles::ReadHandles;
use crate::search::index::IndexSnapshot;
use crate::search::query::{QueryBuilder, QueryPlan, SearchRequest, SortKey};
use crate::search::registry::FieldRegistry;
use crate::store::ContentStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::TantivyDocument;

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Index key of the entry
    pub id: String,

    pub kind: Option<RecordKind>,

    pub wiki: String,

    pub space: String,

    pub name: String,

    pub full_name: String,

    pub language: String,

    pub version: String,

    pub title: String,

    pub author: String,

    /// Modification date as `yyyyMMddHHmmss`
    pub date: Option<String>,

    /// Attachment file name, for attachment results
    pub filename: Option<String>,

    pub mime_type: Option<String>,

    pub file_size: Option<u64>,

    /// Download reference of attachment results, when resolvable
    pub url: Option<String>,

    /// Relevance score
    pub score: f32,

    /// Index the hit came from
    pub index: String,

    /// Every stored value, including object properties
    pub fields: BTreeMap<String, Vec<String>>,
}

/// Search response with results and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<ResultRecord>,

    /// Total number of matches across all indexes (before pagination)
    pub total_hits: usize,

    pub offset: usize,

    pub limit: usize,

    /// Search execution time in milliseconds
    pub search_time_ms: u64,
}

/// Raw hit before projection
#[derive(Debug, Clone)]
struct StoredHit {
    score: f32,
    index: String,
    values: BTreeMap<String, Vec<String>>,
}

impl StoredHit {
    fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Ranking shared by single- and multi-index searches
///
/// Sort keys in order, missing values first, then relevance descending.
fn compare_hits(a: &StoredHit, b: &StoredHit, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = a.first(&key.field).cmp(&b.first(&key.field));
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// Executes searches against the published snapshots
pub struct SearchService {
    handles: Arc<ReadHandles>,
    registry: Arc<FieldRegistry>,
    store: Arc<dyn ContentStore>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        handles: Arc<ReadHandles>,
        registry: Arc<FieldRegistry>,
        store: Arc<dyn ContentStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            handles,
            registry,
            store,
            config,
        }
    }

    /// Search the primary index and every configured read-only index
    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchResults> {
        let snapshots = self.handles.snapshots();
        self.run(request, &snapshots).await
    }

    /// Search explicitly named index directories with transient snapshots
    pub async fn search_indexes(
        &self,
        request: &SearchRequest,
        dirs: &[PathBuf],
    ) -> SearchResult<SearchResults> {
        let snapshots = dirs
            .iter()
            .map(|dir| IndexSnapshot::open_read_only(dir, self.config.analyzer).map(Arc::new))
            .collect::<SearchResult<Vec<_>>>()?;
        self.run(request, &snapshots).await
    }

    async fn run(
        &self,
        request: &SearchRequest,
        snapshots: &[Arc<IndexSnapshot>],
    ) -> SearchResult<SearchResults> {
        let start_time = std::time::Instant::now();
        let plan = QueryPlan::parse(&request.query)?;

        let (mut hits, total_hits) = self.collect(&plan, request, snapshots)?;
        hits.sort_by(|a, b| compare_hits(a, b, &request.sort));

        let page: Vec<StoredHit> = hits
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        let mut records = Vec::with_capacity(page.len());
        for hit in page {
            records.push(self.project(hit).await);
        }

        let search_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            query = %request.query,
            total_hits,
            returned = records.len(),
            search_time_ms,
            "Search executed"
        );

        Ok(SearchResults {
            hits: records,
            total_hits,
            offset: request.offset,
            limit: request.limit,
            search_time_ms,
        })
    }

    fn collect(
        &self,
        plan: &QueryPlan,
        request: &SearchRequest,
        snapshots: &[Arc<IndexSnapshot>],
    ) -> SearchResult<(Vec<StoredHit>, usize)> {
        let registry = self.registry.snapshot();
        let mut hits = Vec::new();
        let mut total_hits = 0;

        for snapshot in snapshots {
            let query = QueryBuilder::new(snapshot, &registry)?.build(plan, request);
            let searcher = snapshot.searcher();
            let count = searcher.search(&*query, &Count)?;
            total_hits += count;

            // sort keys order the whole match set, relevance alone may stop at max_results
            let limit = if request.sort.is_empty() {
                self.config.max_results.min(count)
            } else {
                count
            };
            if limit == 0 {
                continue;
            }
            let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;

            for (score, address) in top_docs {
                let doc: TantivyDocument = searcher.doc(address)?;
                hits.push(StoredHit {
                    score,
                    index: snapshot.label().to_string(),
                    values: snapshot.fields().stored_values(&doc),
                });
            }
        }

        Ok((hits, total_hits))
    }

    async fn project(&self, hit: StoredHit) -> ResultRecord {
        let text = |name: &str| hit.first(name).unwrap_or_default().to_string();
        // attachments carry the owner title and name under their own fields
        let text_or = |name: &str, owner_field: &str| {
            hit.first(name)
                .or_else(|| hit.first(owner_field))
                .unwrap_or_default()
                .to_string()
        };
        let kind = hit.first(FIELD_TYPE).and_then(|t| t.parse::<RecordKind>().ok());
        let filename = hit.first(FIELD_FILENAME).map(str::to_string);

        let mut record = ResultRecord {
            id: text(FIELD_ID),
            kind,
            wiki: text(FIELD_WIKI),
            space: text(FIELD_SPACE),
            name: text_or(FIELD_NAME, FIELD_OWNER_NAME),
            full_name: text(FIELD_FULLNAME),
            language: text(FIELD_LANG),
            version: text(FIELD_VERSION),
            title: text_or(FIELD_TITLE, FIELD_OWNER_TITLE),
            author: text(FIELD_AUTHOR),
            date: hit.first(FIELD_DATE).map(str::to_string),
            filename: filename.clone(),
            mime_type: hit.first(FIELD_MIMETYPE).map(str::to_string),
            file_size: hit.first(FIELD_FILESIZE).and_then(|s| s.parse().ok()),
            url: None,
            score: hit.score,
            index: hit.index.clone(),
            fields: BTreeMap::new(),
        };

        if let (Some(RecordKind::Attachment), Some(filename)) = (kind, filename) {
            let owner = EntityPath::new(&record.wiki, &record.space, &record.name);
            match self.store.attachment_url(&owner, &filename).await {
                Ok(url) => record.url = Some(url),
                Err(e) => {
                    tracing::warn!(
                        page = %owner,
                        filename = %filename,
                        error = %e,
                        "Failed to resolve attachment download reference"
                    );
                }
            }
        }

        record.fields = hit.values;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f32, title: Option<&str>) -> StoredHit {
        let mut values = BTreeMap::new();
        if let Some(title) = title {
            values.insert(FIELD_TITLE.to_string(), vec![title.to_string()]);
        }
        StoredHit {
            score,
            index: "test".into(),
            values,
        }
    }

    fn titles(hits: &[StoredHit]) -> Vec<Option<&str>> {
        hits.iter().map(|h| h.first(FIELD_TITLE)).collect()
    }

    #[test]
    fn test_relevance_order_without_sort() {
        let mut hits = vec![hit(0.5, Some("b")), hit(2.0, Some("a")), hit(1.0, Some("c"))];
        hits.sort_by(|a, b| compare_hits(a, b, &[]));
        assert_eq!(titles(&hits), vec![Some("a"), Some("c"), Some("b")]);
    }

    #[test]
    fn test_sort_keys_with_missing_values_and_ties() {
        let mut hits = vec![
            hit(1.0, Some("b")),
            hit(1.0, None),
            hit(3.0, Some("a")),
            hit(5.0, Some("b")),
        ];
        let asc = [SortKey::parse("title").unwrap()];
        hits.sort_by(|a, b| compare_hits(a, b, &asc));
        assert_eq!(titles(&hits), vec![None, Some("a"), Some("b"), Some("b")]);
        assert_eq!(hits[2].score, 5.0);

        let desc = [SortKey::parse("-title").unwrap()];
        hits.sort_by(|a, b| compare_hits(a, b, &desc));
        assert_eq!(titles(&hits), vec![Some("b"), Some("b"), Some("a"), None]);
    }
}
