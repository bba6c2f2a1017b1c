//! Index schema and conversion between index fields and tantivy documents

use crate::models::field::*;
use crate::models::IndexField;
use crate::search::config::AnalyzerKind;
use std::collections::BTreeMap;
use tantivy::schema::*;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
    WhitespaceTokenizer,
};
use tantivy::{TantivyDocument, TantivyError};

/// Name the configured analyzer is registered under
pub const TEXT_TOKENIZER: &str = "wiki_text";

/// Tokenized JSON field holding dynamic object properties
pub const FIELD_PROPS: &str = "props";

/// Untokenized twin of [`FIELD_PROPS`] for exact matches
pub const FIELD_PROPS_RAW: &str = "props_raw";

/// Stored-only `name\u{1f}value` pairs of dynamic properties
pub const FIELD_STORED_PROPS: &str = "stored_props";

const STORED_PROP_SEPARATOR: char = '\u{1f}';

/// Untokenized, stored fields matched by exact value
pub const KEYWORD_FIELDS: [&str; 15] = [
    FIELD_ID,
    FIELD_TYPE,
    FIELD_WIKI,
    FIELD_SPACE,
    FIELD_FULLNAME,
    FIELD_LANG,
    FIELD_VERSION,
    FIELD_AUTHOR,
    FIELD_CREATOR,
    FIELD_DATE,
    FIELD_CREATIONDATE,
    FIELD_HIDDEN,
    FIELD_MIMETYPE,
    FIELD_FILESIZE,
    FIELD_OBJECT,
];

/// Tokenized, stored fields
pub const TEXT_FIELDS: [&str; 5] = [
    FIELD_NAME,
    FIELD_TITLE,
    FIELD_FILENAME,
    FIELD_OWNER_TITLE,
    FIELD_OWNER_NAME,
];

/// Build the analyzer selected by configuration
pub fn build_analyzer(kind: AnalyzerKind) -> TextAnalyzer {
    match kind {
        AnalyzerKind::Standard => TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .build(),
        AnalyzerKind::English => TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build(),
        AnalyzerKind::Whitespace => TextAnalyzer::builder(WhitespaceTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .build(),
    }
}

/// Build the schema shared by every wiki index
pub fn build_wiki_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    for name in KEYWORD_FIELDS {
        schema_builder.add_text_field(name, STRING | STORED);
    }

    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer(TEXT_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);

    let stored_text = TextOptions::default()
        .set_indexing_options(text_indexing.clone())
        .set_stored();
    for name in TEXT_FIELDS {
        schema_builder.add_text_field(name, stored_text.clone());
    }

    // Full text is searched but never returned
    schema_builder.add_text_field(
        FIELD_FULLTEXT,
        TextOptions::default().set_indexing_options(text_indexing.clone()),
    );

    schema_builder.add_json_field(
        FIELD_PROPS,
        JsonObjectOptions::default()
            .set_indexing_options(text_indexing)
            .set_expand_dots_enabled(),
    );
    schema_builder.add_json_field(
        FIELD_PROPS_RAW,
        JsonObjectOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("raw")
                    .set_index_option(IndexRecordOption::Basic),
            )
            .set_expand_dots_enabled(),
    );
    schema_builder.add_text_field(FIELD_STORED_PROPS, STORED);

    schema_builder.build()
}

/// Schema plus resolved field handles
#[derive(Debug, Clone)]
pub struct IndexFields {
    schema: Schema,
    fixed: BTreeMap<&'static str, Field>,
    pub id: Field,
    pub wiki: Field,
    pub lang: Field,
    pub version: Field,
    pub props: Field,
    pub props_raw: Field,
    pub stored_props: Field,
}

impl IndexFields {
    pub fn new(schema: Schema) -> Result<Self, TantivyError> {
        let mut fixed = BTreeMap::new();
        for name in KEYWORD_FIELDS
            .iter()
            .chain(TEXT_FIELDS.iter())
            .chain(std::iter::once(&FIELD_FULLTEXT))
        {
            fixed.insert(*name, schema.get_field(name)?);
        }

        Ok(Self {
            id: schema.get_field(FIELD_ID)?,
            wiki: schema.get_field(FIELD_WIKI)?,
            lang: schema.get_field(FIELD_LANG)?,
            version: schema.get_field(FIELD_VERSION)?,
            props: schema.get_field(FIELD_PROPS)?,
            props_raw: schema.get_field(FIELD_PROPS_RAW)?,
            stored_props: schema.get_field(FIELD_STORED_PROPS)?,
            fixed,
            schema,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Handle of a schema-level field, `None` for dynamic property names
    pub fn fixed_field(&self, name: &str) -> Option<Field> {
        self.fixed.get(name).copied()
    }

    /// Whether a schema-level field runs through the text analyzer
    pub fn is_tokenized(&self, name: &str) -> bool {
        TEXT_FIELDS.contains(&name) || name == FIELD_FULLTEXT
    }

    /// Convert record fields into a tantivy document
    pub fn to_document(&self, fields: &[IndexField]) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        let mut props: BTreeMap<String, Vec<OwnedValue>> = BTreeMap::new();
        let mut props_raw: BTreeMap<String, Vec<OwnedValue>> = BTreeMap::new();

        for field in fields {
            if field.value.is_empty() && field.name != FIELD_ID {
                continue;
            }

            match self.fixed_field(&field.name) {
                Some(handle) => doc.add_text(handle, &field.value),
                None => {
                    if field.tokenized {
                        props
                            .entry(field.name.clone())
                            .or_default()
                            .push(OwnedValue::Str(field.value.clone()));
                    }
                    props_raw
                        .entry(field.name.clone())
                        .or_default()
                        .push(OwnedValue::Str(field.value.clone()));
                    if field.stored {
                        doc.add_text(
                            self.stored_props,
                            format!("{}{}{}", field.name, STORED_PROP_SEPARATOR, field.value),
                        );
                    }
                }
            }
        }

        if !props.is_empty() {
            doc.add_object(self.props, into_json_object(props));
        }
        if !props_raw.is_empty() {
            doc.add_object(self.props_raw, into_json_object(props_raw));
        }

        doc
    }

    /// Every stored value of a document keyed by field name
    pub fn stored_values(&self, doc: &TantivyDocument) -> BTreeMap<String, Vec<String>> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (name, field) in &self.fixed {
            // documents built in memory still hold values the index never stores
            if !self.schema.get_field_entry(*field).is_stored() {
                continue;
            }
            for value in doc.get_all(*field) {
                if let Some(text) = value.as_str() {
                    values
                        .entry((*name).to_string())
                        .or_default()
                        .push(text.to_string());
                }
            }
        }

        for value in doc.get_all(self.stored_props) {
            if let Some((name, text)) = value
                .as_str()
                .and_then(|pair| pair.split_once(STORED_PROP_SEPARATOR))
            {
                values
                    .entry(name.to_string())
                    .or_default()
                    .push(text.to_string());
            }
        }

        values
    }
}

fn into_json_object(values: BTreeMap<String, Vec<OwnedValue>>) -> BTreeMap<String, OwnedValue> {
    values
        .into_iter()
        .map(|(name, mut list)| {
            let value = if list.len() == 1 {
                list.remove(0)
            } else {
                OwnedValue::Array(list)
            };
            (name, value)
        })
        .collect()
}
