//! Versioned registry of every field name committed to the index

use crate::models::field::{
    FIELD_FILENAME, FIELD_FULLTEXT, FIELD_NAME, FIELD_OWNER_NAME, FIELD_OWNER_TITLE, FIELD_TITLE,
};
use crate::models::{FieldWeight, IndexField};
use crate::search::document::KEYWORD_FIELDS;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the query engine knows about one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInfo {
    pub tokenized: bool,
    /// Highest boost seen for the field
    pub boost: f32,
}

/// Immutable generation of the registry
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    pub version: u64,
    pub fields: BTreeMap<String, FieldInfo>,
}

impl FieldSet {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    /// Boost of a field, 1.0 when unknown
    pub fn boost(&self, name: &str) -> f32 {
        self.fields.get(name).map_or(1.0, |info| info.boost)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Copy-on-write field registry; readers take a snapshot, writers swap a new generation
pub struct FieldRegistry {
    current: RwLock<Arc<FieldSet>>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(FieldSet::default())),
        }
    }

    /// Registry pre-filled with the fixed schema fields
    pub fn with_schema_fields() -> Self {
        let registry = Self::new();
        let mut seed: Vec<IndexField> = KEYWORD_FIELDS
            .iter()
            .map(|name| IndexField::keyword(*name, ""))
            .collect();
        seed.extend([
            IndexField::text(FIELD_TITLE, "", FieldWeight::Title),
            IndexField::text(FIELD_NAME, "", FieldWeight::Name),
            IndexField::text(FIELD_FILENAME, "", FieldWeight::Name),
            IndexField::text(FIELD_FULLTEXT, "", FieldWeight::Content),
            IndexField::text(FIELD_OWNER_TITLE, "", FieldWeight::Inherited),
            IndexField::text(FIELD_OWNER_NAME, "", FieldWeight::Inherited),
        ]);
        registry.register(&seed);
        registry
    }

    pub fn snapshot(&self) -> Arc<FieldSet> {
        self.current.read().clone()
    }

    /// Merge committed fields, bumping the version only when something changed
    pub fn register(&self, fields: &[IndexField]) -> bool {
        let current = self.snapshot();
        let mut next: Option<FieldSet> = None;

        for field in fields {
            let known = next
                .as_ref()
                .unwrap_or(&*current)
                .fields
                .get(&field.name)
                .copied();

            let merged = match known {
                None => FieldInfo {
                    tokenized: field.tokenized,
                    boost: field.boost,
                },
                Some(info) if field.boost > info.boost || (field.tokenized && !info.tokenized) => {
                    FieldInfo {
                        tokenized: info.tokenized || field.tokenized,
                        boost: info.boost.max(field.boost),
                    }
                }
                Some(_) => continue,
            };

            next.get_or_insert_with(|| (*current).clone())
                .fields
                .insert(field.name.clone(), merged);
        }

        match next {
            Some(mut set) => {
                let mut guard = self.current.write();
                // Another writer may have merged in between; fold its fields in
                for (name, info) in &guard.fields {
                    set.fields.entry(name.clone()).or_insert(*info);
                }
                set.version = guard.version + 1;
                tracing::debug!(version = set.version, fields = set.len(), "Field registry updated");
                *guard = Arc::new(set);
                true
            }
            None => false,
        }
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}
