//! Full-text side of the pipeline, powered by Tantivy
//!
//! - **Engine adapter** ([`TantivyEngine`]): the only write path, handed out as
//!   exclusive [`IndexWriteSession`]s, plus immutable [`IndexSnapshot`]s
//! - **Read handles** ([`ReadHandles`]): snapshots swapped after every commit
//! - **Field registry** ([`FieldRegistry`]): versioned set of committed field names
//! - **Query engine** ([`SearchService`]): classic query syntax, `PROP`/`MULTI`
//!   scoping, partition and language filters, globally consistent ordering
//!
//! ```text
//! writer coordinator ──commit──▶ TantivyEngine ──open_reader──▶ ReadHandles
//!                                                                   │
//!                 SearchRequest ──▶ SearchService ◀──snapshots──────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use wiki_indexer::search::{SearchRequest, SearchService};
//!
//! async fn example(search: &SearchService) -> Result<(), Box<dyn std::error::Error>> {
//!     let request = SearchRequest::new("MULTI release notes")
//!         .with_sort(["-date"])
//!         .with_partitions(["xwiki"])
//!         .with_limit(20);
//!
//!     let results = search.search(&request).await?;
//!     println!("Found {} entries", results.total_hits);
//!     Ok(())
//! }
//! ```

mod config;
mod document;
mod error;
mod handles;
mod index;
pub mod parser;
mod query;
mod registry;
mod service;

pub use config::{AnalyzerKind, SearchConfig, SearchConfigBuilder};
pub use document::{build_wiki_schema, IndexFields, FIELD_PROPS, FIELD_PROPS_RAW, TEXT_TOKENIZER};
pub use error::{SearchError, SearchResult};
pub use handles::ReadHandles;
pub use index::{IndexEngine, IndexSnapshot, IndexStats, IndexWriteSession, TantivyEngine};
pub use parser::{QueryParseError, Occur};
pub use query::{QueryPlan, QueryTarget, SearchRequest, SortKey};
pub use registry::{FieldInfo, FieldRegistry, FieldSet};
pub use service::{ResultRecord, SearchResults, SearchService};
