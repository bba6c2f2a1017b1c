//! Translates content change notifications into queue operations

use crate::indexing::error::IndexingResult;
use crate::indexing::loader::RecordLoader;
use crate::indexing::metrics::INDEXER_METRICS;
use crate::indexing::queue::IndexQueue;
use crate::models::{AttachmentRecord, EntityPath, PageRecord, PartitionWipe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something changed in the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "event", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentEvent {
    EntityCreated {
        path: EntityPath,
        #[serde(default)]
        language: Option<String>,
    },
    EntityUpdated {
        path: EntityPath,
        #[serde(default)]
        language: Option<String>,
    },
    EntityDeleted {
        path: EntityPath,
        #[serde(default)]
        language: Option<String>,
        /// Attachments the page carried, removed along with the original page
        #[serde(default)]
        attachments: Vec<String>,
    },
    AttachmentAdded {
        path: EntityPath,
        filename: String,
    },
    AttachmentUpdated {
        path: EntityPath,
        filename: String,
    },
    AttachmentDeleted {
        path: EntityPath,
        filename: String,
    },
    PartitionDeleted {
        wiki: String,
    },
}

impl ContentEvent {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Consumes [`ContentEvent`]s and enqueues the matching records
#[derive(Clone)]
pub struct IndexEventListener {
    loader: RecordLoader,
    queue: Arc<IndexQueue>,
}

impl IndexEventListener {
    pub fn new(loader: RecordLoader, queue: Arc<IndexQueue>) -> Self {
        Self { loader, queue }
    }

    /// Enqueue whatever `event` requires; reads the store but never the index
    pub async fn handle(&self, event: ContentEvent) -> IndexingResult<()> {
        INDEXER_METRICS.record_event(event.name());
        tracing::debug!(event = event.name(), "Content event received");

        match event {
            ContentEvent::EntityCreated { path, language } => {
                let page = self
                    .loader
                    .store()
                    .get_entity(&path, language.as_deref())
                    .await?;
                self.queue.enqueue(PageRecord::from_page(&page));
                if page.language.is_none() {
                    for record in self.loader.attachment_records(&page).await {
                        self.queue.enqueue(record);
                    }
                }
            }
            ContentEvent::EntityUpdated { path, language } => {
                let record = self.loader.page_record(&path, language.as_deref()).await?;
                self.queue.enqueue(record);
            }
            ContentEvent::EntityDeleted {
                path,
                language,
                attachments,
            } => {
                if language.is_none() {
                    for filename in attachments {
                        self.queue
                            .enqueue(AttachmentRecord::deleted(path.clone(), filename));
                    }
                }
                self.queue
                    .enqueue(PageRecord::deleted(path, language.as_deref()));
            }
            ContentEvent::AttachmentAdded { path, filename }
            | ContentEvent::AttachmentUpdated { path, filename } => {
                let record = self.loader.attachment_record(&path, &filename).await?;
                self.queue.enqueue(record);
            }
            ContentEvent::AttachmentDeleted { path, filename } => {
                self.queue.enqueue(AttachmentRecord::deleted(path, filename));
            }
            ContentEvent::PartitionDeleted { wiki } => {
                tracing::info!(partition = %wiki, "Partition deleted, wiping its index entries");
                self.queue.enqueue(PartitionWipe::new(wiki));
            }
        }

        Ok(())
    }

    /// Handle events until every sender is dropped
    pub async fn run(self, mut events: mpsc::Receiver<ContentEvent>) {
        tracing::info!("Content event listener started");
        while let Some(event) = events.recv().await {
            let name = event.name();
            if let Err(e) = self.handle(event).await {
                tracing::warn!(event = name, error = %e, "Failed to handle content event");
            }
        }
        tracing::info!("Content event listener stopped");
    }
}
