//! Builds index records from the content store

use crate::indexing::error::IndexingResult;
use crate::models::{AttachmentInfo, AttachmentRecord, EntityPath, PageRecord, WikiPage};
use crate::store::{ContentStore, StoreError, TextExtractor};
use std::sync::Arc;

/// Fetches pages and attachments and turns them into records
#[derive(Clone)]
pub struct RecordLoader {
    store: Arc<dyn ContentStore>,
    extractor: Arc<dyn TextExtractor>,
}

impl RecordLoader {
    pub fn new(store: Arc<dyn ContentStore>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { store, extractor }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub async fn page_record(
        &self,
        path: &EntityPath,
        language: Option<&str>,
    ) -> IndexingResult<PageRecord> {
        let page = self.store.get_entity(path, language).await?;
        Ok(PageRecord::from_page(&page))
    }

    /// Record of one attachment of the original page
    pub async fn attachment_record(
        &self,
        path: &EntityPath,
        filename: &str,
    ) -> IndexingResult<AttachmentRecord> {
        let page = self.store.get_entity(path, None).await?;
        let info = page
            .attachment(filename)
            .ok_or_else(|| StoreError::AttachmentNotFound {
                path: path.clone(),
                filename: filename.to_string(),
            })?;
        Ok(self.attachment_from(&page, info).await)
    }

    /// Records for every attachment of `page`
    pub async fn attachment_records(&self, page: &WikiPage) -> Vec<AttachmentRecord> {
        let mut records = Vec::with_capacity(page.attachments.len());
        for info in &page.attachments {
            records.push(self.attachment_from(page, info).await);
        }
        records
    }

    /// Record of `info`, reading and extracting its content on a best-effort basis
    pub async fn attachment_from(&self, page: &WikiPage, info: &AttachmentInfo) -> AttachmentRecord {
        let text = match self
            .store
            .get_attachment_content(&page.path, &info.filename)
            .await
        {
            Ok(content) => self
                .extractor
                .extract(&info.filename, &info.mime_type, &content),
            Err(e) => {
                tracing::warn!(
                    page = %page.path,
                    filename = %info.filename,
                    error = %e,
                    "Failed to read attachment content, indexing without text"
                );
                None
            }
        };

        AttachmentRecord::new(page, info, text)
    }
}
