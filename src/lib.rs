//! Asynchronous indexing and query pipeline for wiki content
//!
//! Keeps a Tantivy full-text index synchronized with a mutable content store
//! (wiki pages and their attachments) and serves structured multi-field
//! queries against it.
//!
//! - [`indexing`]: deduplicating queue, single writer coordinator, rebuild
//!   orchestrator and content event listener
//! - [`search`]: index engine adapter, read snapshots and the query engine
//! - [`store`]: content store and text extraction collaborators
//! - [`service::IndexService`]: everything wired together

pub mod config;
pub mod error;
pub mod indexing;
pub mod models;
pub mod search;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
pub use service::IndexService;
