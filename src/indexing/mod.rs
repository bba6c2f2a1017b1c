//! Asynchronous indexing pipeline
//!
//! Content change notifications ([`IndexEventListener`]) and full rebuilds
//! ([`IndexRebuilder`]) push records into the [`IndexQueue`]; the
//! [`IndexUpdater`] is its only consumer and the only writer of the index.
//!
//! ```text
//! ContentEvent ──▶ IndexEventListener ──┐
//!                                       ├──enqueue──▶ IndexQueue ──drain──▶ IndexUpdater ──▶ index
//! RebuildRequest ──▶ IndexRebuilder ────┘      ▲                                │
//!                          ▲                   └──── size() backpressure        │
//!                          └──────────────── request_full_rebuild (repair) ─────┘
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod loader;
pub mod metrics;
pub mod queue;
pub mod rebuild;
pub mod updater;

pub use config::{RebuildConfig, UpdaterConfig};
pub use error::{IndexingError, IndexingResult};
pub use listener::{ContentEvent, IndexEventListener};
pub use loader::RecordLoader;
pub use metrics::{gather_metrics, init_indexer_metrics, INDEXER_METRICS};
pub use queue::{IndexQueue, QueueEntry};
pub use rebuild::{IndexRebuilder, RebuildProgress, RebuildRequest, RebuildStatus};
pub use updater::{CycleReport, IndexUpdater, RebuildTrigger, UpdaterHandle, UpdaterState};
