//! In-memory content store, filled programmatically or from a JSON corpus

use super::{ContentStore, EntityFilter, EntityStream, StoreError, StoreResult};
use crate::models::{normalize_language, AttachmentInfo, EntityPath, WikiPage, DEFAULT_LANGUAGE};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

type PageKey = (EntityPath, String);
type AttachmentKey = (EntityPath, String);

/// Content store keeping every page in memory
#[derive(Default)]
pub struct InMemoryContentStore {
    partitions: RwLock<BTreeSet<String>>,
    pages: RwLock<BTreeMap<PageKey, WikiPage>>,
    contents: RwLock<BTreeMap<AttachmentKey, Vec<u8>>>,
}

fn page_key(path: &EntityPath, language: Option<&str>) -> PageKey {
    (
        path.clone(),
        normalize_language(language.unwrap_or_default()).to_string(),
    )
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store built from a JSON corpus file
    pub fn from_corpus_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let corpus = JsonCorpus::from_file(path)?;
        let store = Self::new();
        corpus.load_into(&store)?;
        Ok(store)
    }

    /// Register an empty partition
    pub fn add_partition(&self, wiki: impl Into<String>) {
        self.partitions.write().insert(wiki.into());
    }

    /// Insert or replace a page (one language)
    pub fn put_page(&self, page: WikiPage) {
        self.partitions.write().insert(page.path.wiki.clone());
        let key = page_key(&page.path, page.language.as_deref());
        self.pages.write().insert(key, page);
    }

    pub fn remove_page(&self, path: &EntityPath, language: Option<&str>) -> Option<WikiPage> {
        let removed = self.pages.write().remove(&page_key(path, language));
        if removed.as_ref().map_or(false, |p| p.language.is_none()) {
            self.contents.write().retain(|(owner, _), _| owner != path);
        }
        removed
    }

    /// Attach a file to the original page, replacing one with the same name
    pub fn put_attachment(
        &self,
        path: &EntityPath,
        info: AttachmentInfo,
        content: Vec<u8>,
    ) -> StoreResult<()> {
        let mut pages = self.pages.write();
        let page = pages
            .get_mut(&page_key(path, None))
            .ok_or_else(|| StoreError::EntityNotFound {
                path: path.clone(),
                language: DEFAULT_LANGUAGE.to_string(),
            })?;

        page.attachments.retain(|a| a.filename != info.filename);
        self.contents
            .write()
            .insert((path.clone(), info.filename.clone()), content);
        page.attachments.push(info);
        Ok(())
    }

    pub fn remove_attachment(&self, path: &EntityPath, filename: &str) -> Option<AttachmentInfo> {
        self.contents
            .write()
            .remove(&(path.clone(), filename.to_string()));

        let mut pages = self.pages.write();
        let page = pages.get_mut(&page_key(path, None))?;
        let position = page.attachments.iter().position(|a| a.filename == filename)?;
        Some(page.attachments.remove(position))
    }

    /// Drop a partition with all its pages
    pub fn remove_partition(&self, wiki: &str) {
        self.partitions.write().remove(wiki);
        self.pages.write().retain(|(path, _), _| path.wiki != wiki);
        self.contents.write().retain(|(path, _), _| path.wiki != wiki);
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn list_partitions(&self) -> StoreResult<Vec<String>> {
        Ok(self.partitions.read().iter().cloned().collect())
    }

    async fn list_entities(
        &self,
        partition: &str,
        filter: Option<&EntityFilter>,
    ) -> StoreResult<EntityStream> {
        if !self.partitions.read().contains(partition) {
            return Err(StoreError::UnknownPartition(partition.to_string()));
        }

        let descriptors: Vec<_> = self
            .pages
            .read()
            .values()
            .filter(|page| page.path.wiki == partition)
            .map(WikiPage::descriptor)
            .filter(|descriptor| filter.map_or(true, |f| f.matches(descriptor)))
            .map(Ok)
            .collect();

        Ok(stream::iter(descriptors).boxed())
    }

    async fn get_entity(&self, path: &EntityPath, language: Option<&str>) -> StoreResult<WikiPage> {
        self.pages
            .read()
            .get(&page_key(path, language))
            .cloned()
            .ok_or_else(|| StoreError::EntityNotFound {
                path: path.clone(),
                language: normalize_language(language.unwrap_or_default()).to_string(),
            })
    }

    async fn get_attachment_content(
        &self,
        path: &EntityPath,
        filename: &str,
    ) -> StoreResult<Vec<u8>> {
        self.contents
            .read()
            .get(&(path.clone(), filename.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::AttachmentNotFound {
                path: path.clone(),
                filename: filename.to_string(),
            })
    }

    async fn attachment_url(&self, path: &EntityPath, filename: &str) -> StoreResult<String> {
        let exists = self
            .pages
            .read()
            .get(&page_key(path, None))
            .map_or(false, |page| page.attachment(filename).is_some());

        if !exists {
            return Err(StoreError::AttachmentNotFound {
                path: path.clone(),
                filename: filename.to_string(),
            });
        }

        Ok(format!(
            "/download/{}/{}/{}/{}",
            path.wiki, path.space, path.name, filename
        ))
    }
}

/// JSON corpus file: pages plus the text content of their attachments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonCorpus {
    #[serde(default)]
    pub pages: Vec<WikiPage>,

    #[serde(default)]
    pub attachments: Vec<CorpusAttachment>,
}

/// Attachment content entry of a corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusAttachment {
    /// Owner page as `wiki:space.name`
    pub page: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl JsonCorpus {
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load_into(self, store: &InMemoryContentStore) -> StoreResult<()> {
        for page in self.pages {
            store.put_page(page);
        }

        for attachment in self.attachments {
            let path: EntityPath = attachment
                .page
                .parse()
                .map_err(|e: crate::models::InvalidEntityPath| StoreError::InvalidCorpus(e.to_string()))?;

            let content = attachment.text.into_bytes();
            let known = store
                .pages
                .read()
                .get(&page_key(&path, None))
                .and_then(|page| page.attachment(&attachment.filename).cloned());

            let info = match known {
                Some(mut info) => {
                    if let Some(mime_type) = attachment.mime_type {
                        info.mime_type = mime_type;
                    }
                    info
                }
                None => AttachmentInfo::new(
                    attachment.filename.clone(),
                    attachment
                        .mime_type
                        .unwrap_or_else(|| "text/plain".to_string()),
                    content.len() as u64,
                ),
            };

            store.put_attachment(&path, info, content)?;
        }

        Ok(())
    }
}
