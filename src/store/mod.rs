//! Content store collaborators: page/attachment source and text extraction

pub mod error;
pub mod extract;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use extract::{PlainTextExtractor, TextExtractor};
pub use memory::{InMemoryContentStore, JsonCorpus};

use crate::models::{EntityDescriptor, EntityPath, WikiPage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use regex::Regex;

/// Lazy sequence of entity descriptors
pub type EntityStream = BoxStream<'static, StoreResult<EntityDescriptor>>;

/// Source of truth for wiki pages and attachments
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All partitions (wikis) known to the store
    async fn list_partitions(&self) -> StoreResult<Vec<String>>;

    /// Every page (all languages) of a partition accepted by `filter`
    async fn list_entities(
        &self,
        partition: &str,
        filter: Option<&EntityFilter>,
    ) -> StoreResult<EntityStream>;

    /// Full page in `language`, `None` meaning the original page
    async fn get_entity(&self, path: &EntityPath, language: Option<&str>) -> StoreResult<WikiPage>;

    /// Raw bytes of an attachment
    async fn get_attachment_content(&self, path: &EntityPath, filename: &str)
        -> StoreResult<Vec<u8>>;

    /// Download reference shown in search results
    async fn attachment_url(&self, path: &EntityPath, filename: &str) -> StoreResult<String>;
}

/// Restricts which entities a rebuild enumerates
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Accepted spaces, empty accepts all
    pub spaces: Vec<String>,

    /// Pattern the page name must match
    pub name_pattern: Option<Regex>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.spaces.push(space.into());
        self
    }

    pub fn with_name_pattern(mut self, pattern: Regex) -> Self {
        self.name_pattern = Some(pattern);
        self
    }

    pub fn matches(&self, descriptor: &EntityDescriptor) -> bool {
        let space_match = self.spaces.is_empty() || self.spaces.contains(&descriptor.path.space);
        let name_match = self
            .name_pattern
            .as_ref()
            .map_or(true, |re| re.is_match(&descriptor.path.name));

        space_match && name_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(space: &str, name: &str) -> EntityDescriptor {
        EntityDescriptor {
            path: EntityPath::new("xwiki", space, name),
            language: None,
            version: "1.1".into(),
        }
    }

    #[test]
    fn test_filter_matches() {
        let all = EntityFilter::new();
        assert!(all.matches(&descriptor("Main", "WebHome")));

        let filter = EntityFilter::new()
            .with_space("Sandbox")
            .with_name_pattern(Regex::new("^Test").unwrap());
        assert!(filter.matches(&descriptor("Sandbox", "TestPage")));
        assert!(!filter.matches(&descriptor("Sandbox", "WebHome")));
        assert!(!filter.matches(&descriptor("Main", "TestPage")));
    }
}
