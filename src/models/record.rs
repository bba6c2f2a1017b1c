//! Index records: immutable descriptions of what the writer applies to the index

use crate::models::entity::{AttachmentInfo, EntityPath, PropertyValue, StructuredObject, WikiPage};
use crate::models::field::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// Language sentinel used when a page has no explicit translation language
pub const DEFAULT_LANGUAGE: &str = "default";

/// Stable identifier of one indexable unit across all partitions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexKey(String);

impl IndexKey {
    /// `{wiki}.{space}.{name}.{language}`
    pub fn page(path: &EntityPath, language: &str) -> Self {
        Self(format!(
            "{}.{}.{}.{}",
            path.wiki,
            path.space,
            path.name,
            normalize_language(language)
        ))
    }

    /// Page key of the default language owner followed by `.file.{filename}`
    pub fn attachment(path: &EntityPath, filename: &str) -> Self {
        let owner = Self::page(path, DEFAULT_LANGUAGE);
        Self(format!("{}.file.{}", owner.0, filename))
    }

    /// Key of a whole-partition wipe
    pub fn partition(wiki: &str) -> Self {
        Self(wiki.to_string())
    }

    /// Wrap a key read back from the index
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IndexKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps `None` and `""` to [`DEFAULT_LANGUAGE`]
pub fn normalize_language(language: &str) -> &str {
    if language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        language
    }
}

/// Value stored in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum RecordKind {
    #[strum(serialize = "wikipage")]
    #[serde(rename = "wikipage")]
    Page,
    #[strum(serialize = "attachment")]
    #[serde(rename = "attachment")]
    Attachment,
    #[strum(serialize = "partition")]
    #[serde(rename = "partition")]
    Partition,
}

/// Anything the writer coordinator can apply to the index
#[derive(Debug, Clone)]
pub enum IndexRecord {
    Page(PageRecord),
    Attachment(AttachmentRecord),
    /// Removes every document of a partition
    Partition(PartitionWipe),
}

impl IndexRecord {
    pub fn key(&self) -> IndexKey {
        match self {
            IndexRecord::Page(page) => page.key(),
            IndexRecord::Attachment(attachment) => attachment.key(),
            IndexRecord::Partition(wipe) => IndexKey::partition(&wipe.wiki),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            IndexRecord::Page(_) => RecordKind::Page,
            IndexRecord::Attachment(_) => RecordKind::Attachment,
            IndexRecord::Partition(_) => RecordKind::Partition,
        }
    }

    /// Wiki the record belongs to
    pub fn partition(&self) -> &str {
        match self {
            IndexRecord::Page(page) => &page.path.wiki,
            IndexRecord::Attachment(attachment) => &attachment.path.wiki,
            IndexRecord::Partition(wipe) => &wipe.wiki,
        }
    }

    pub fn entity_path(&self) -> Option<&EntityPath> {
        match self {
            IndexRecord::Page(page) => Some(&page.path),
            IndexRecord::Attachment(attachment) => Some(&attachment.path),
            IndexRecord::Partition(_) => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            IndexRecord::Page(page) => page.deleted,
            IndexRecord::Attachment(attachment) => attachment.deleted,
            IndexRecord::Partition(_) => true,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            IndexRecord::Page(page) => Some(&page.version),
            IndexRecord::Attachment(attachment) => Some(&attachment.version),
            IndexRecord::Partition(_) => None,
        }
    }

    /// Weighted fields for the index engine, always starting with the key field
    pub fn fields(&self) -> Vec<IndexField> {
        match self {
            IndexRecord::Page(page) => page.fields(),
            IndexRecord::Attachment(attachment) => attachment.fields(),
            IndexRecord::Partition(wipe) => vec![
                IndexField::keyword(FIELD_ID, IndexKey::partition(&wipe.wiki).as_str()),
                IndexField::keyword(FIELD_WIKI, &wipe.wiki),
            ],
        }
    }
}

impl From<PageRecord> for IndexRecord {
    fn from(record: PageRecord) -> Self {
        IndexRecord::Page(record)
    }
}

impl From<AttachmentRecord> for IndexRecord {
    fn from(record: AttachmentRecord) -> Self {
        IndexRecord::Attachment(record)
    }
}

impl From<PartitionWipe> for IndexRecord {
    fn from(record: PartitionWipe) -> Self {
        IndexRecord::Partition(record)
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

/// Indexable snapshot of a page in one language
#[derive(Debug, Clone)]
pub struct PageRecord {
    path: EntityPath,
    language: String,
    version: String,
    title: String,
    author: String,
    creator: String,
    creation_date: Option<DateTime<Utc>>,
    modification_date: Option<DateTime<Utc>>,
    hidden: bool,
    content: String,
    objects: Vec<StructuredObject>,
    deleted: bool,
}

impl PageRecord {
    pub fn from_page(page: &WikiPage) -> Self {
        Self {
            path: page.path.clone(),
            language: normalize_language(page.language.as_deref().unwrap_or_default()).to_string(),
            version: page.version.clone(),
            title: page.title.clone(),
            author: page.author.clone(),
            creator: page.creator.clone(),
            creation_date: page.creation_date,
            modification_date: page.modification_date,
            hidden: page.hidden,
            content: page.content.clone(),
            objects: page.objects.clone(),
            deleted: false,
        }
    }

    /// Tombstone removing the page in `language` from the index
    pub fn deleted(path: EntityPath, language: Option<&str>) -> Self {
        Self {
            path,
            language: normalize_language(language.unwrap_or_default()).to_string(),
            version: String::new(),
            title: String::new(),
            author: String::new(),
            creator: String::new(),
            creation_date: None,
            modification_date: None,
            hidden: false,
            content: String::new(),
            objects: Vec::new(),
            deleted: true,
        }
    }

    pub fn key(&self) -> IndexKey {
        IndexKey::page(&self.path, &self.language)
    }

    pub fn path(&self) -> &EntityPath {
        &self.path
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_date
    }

    pub fn modification_date(&self) -> Option<DateTime<Utc>> {
        self.modification_date
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn fields(&self) -> Vec<IndexField> {
        let mut fields = vec![
            IndexField::keyword(FIELD_ID, self.key().as_str()),
            IndexField::keyword(FIELD_TYPE, RecordKind::Page.to_string()),
            IndexField::keyword(FIELD_WIKI, &self.path.wiki),
            IndexField::keyword(FIELD_SPACE, &self.path.space),
            IndexField::text(FIELD_NAME, &self.path.name, FieldWeight::Name),
            IndexField::keyword(FIELD_FULLNAME, self.path.full_name()),
            IndexField::keyword(FIELD_LANG, &self.language),
            IndexField::keyword(FIELD_VERSION, &self.version),
            IndexField::text(FIELD_TITLE, &self.title, FieldWeight::Title),
            IndexField::keyword(FIELD_AUTHOR, &self.author).with_weight(FieldWeight::Metadata),
            IndexField::keyword(FIELD_CREATOR, &self.creator).with_weight(FieldWeight::Metadata),
            IndexField::keyword(FIELD_HIDDEN, self.hidden.to_string()).with_weight(FieldWeight::Metadata),
        ];

        if let Some(date) = format_date(self.modification_date) {
            fields.push(IndexField::keyword(FIELD_DATE, date).with_weight(FieldWeight::Metadata));
        }
        if let Some(date) = format_date(self.creation_date) {
            fields.push(IndexField::keyword(FIELD_CREATIONDATE, date).with_weight(FieldWeight::Metadata));
        }

        let mut fulltext = vec![self.title.clone(), self.content.clone()];

        for object in &self.objects {
            fields.push(IndexField::keyword(FIELD_OBJECT, &object.class_name).with_weight(FieldWeight::Property));

            for property in &object.properties {
                let name = format!("{}.{}", object.class_name, property.name);
                for field in property_fields(&name, &property.value) {
                    if field.tokenized {
                        fulltext.push(field.value.clone());
                    }
                    fields.push(field);
                }
            }
        }

        let fulltext = fulltext
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        fields.push(IndexField::unstored_text(FIELD_FULLTEXT, fulltext, FieldWeight::Content));

        fields
    }
}

/// Fields contributed by one object property; passwords contribute nothing
fn property_fields(name: &str, value: &PropertyValue) -> Vec<IndexField> {
    let text = |v: String| IndexField::text(name, v, FieldWeight::Property);

    match value {
        PropertyValue::Password(_) => Vec::new(),
        PropertyValue::Text(v) => vec![text(v.clone())],
        PropertyValue::Number(v) => {
            let formatted = if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            };
            vec![IndexField::keyword(name, formatted).with_weight(FieldWeight::Property)]
        }
        PropertyValue::Boolean(v) => {
            vec![IndexField::keyword(name, v.to_string()).with_weight(FieldWeight::Property)]
        }
        PropertyValue::Date(v) => vec![IndexField::keyword(name, v.format(DATE_FORMAT).to_string())
            .with_weight(FieldWeight::Property)],
        PropertyValue::List(items) => {
            let mut fields = Vec::with_capacity(items.len() * 2);
            for item in items {
                fields.push(text(item.display.clone()));
                if item.key != item.display {
                    fields.push(IndexField::keyword(name, &item.key).with_weight(FieldWeight::Property));
                }
            }
            fields
        }
    }
}

/// Indexable snapshot of one file attached to a page
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    path: EntityPath,
    owner_title: String,
    filename: String,
    mime_type: String,
    size: u64,
    version: String,
    author: String,
    creator: String,
    date: Option<DateTime<Utc>>,
    hidden: bool,
    text: Option<String>,
    deleted: bool,
}

impl AttachmentRecord {
    /// `text` is the extracted content, `None` when extraction failed or is unsupported
    pub fn new(owner: &WikiPage, attachment: &AttachmentInfo, text: Option<String>) -> Self {
        Self {
            path: owner.path.clone(),
            owner_title: owner.title.clone(),
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            size: attachment.size,
            version: attachment.version.clone(),
            author: attachment.author.clone(),
            creator: owner.creator.clone(),
            date: attachment.date,
            hidden: owner.hidden,
            text,
            deleted: false,
        }
    }

    pub fn deleted(path: EntityPath, filename: impl Into<String>) -> Self {
        Self {
            path,
            owner_title: String::new(),
            filename: filename.into(),
            mime_type: String::new(),
            size: 0,
            version: String::new(),
            author: String::new(),
            creator: String::new(),
            date: None,
            hidden: false,
            text: None,
            deleted: true,
        }
    }

    pub fn key(&self) -> IndexKey {
        IndexKey::attachment(&self.path, &self.filename)
    }

    pub fn path(&self) -> &EntityPath {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Creator of the owning page
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Upload date, which is also the creation date of the attachment
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    /// Inherited from the owning page
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn fields(&self) -> Vec<IndexField> {
        let mut fields = vec![
            IndexField::keyword(FIELD_ID, self.key().as_str()),
            IndexField::keyword(FIELD_TYPE, RecordKind::Attachment.to_string()),
            IndexField::keyword(FIELD_WIKI, &self.path.wiki),
            IndexField::keyword(FIELD_SPACE, &self.path.space),
            IndexField::text(FIELD_OWNER_NAME, &self.path.name, FieldWeight::Inherited),
            IndexField::keyword(FIELD_FULLNAME, self.path.full_name()),
            IndexField::keyword(FIELD_LANG, DEFAULT_LANGUAGE),
            IndexField::keyword(FIELD_VERSION, &self.version),
            IndexField::text(FIELD_OWNER_TITLE, &self.owner_title, FieldWeight::Inherited),
            IndexField::keyword(FIELD_AUTHOR, &self.author).with_weight(FieldWeight::Metadata),
            IndexField::keyword(FIELD_CREATOR, &self.creator).with_weight(FieldWeight::Metadata),
            IndexField::keyword(FIELD_HIDDEN, self.hidden.to_string()).with_weight(FieldWeight::Metadata),
            IndexField::text(FIELD_FILENAME, &self.filename, FieldWeight::Name),
            IndexField::keyword(FIELD_MIMETYPE, &self.mime_type).with_weight(FieldWeight::Metadata),
            IndexField::keyword(FIELD_FILESIZE, self.size.to_string()).with_weight(FieldWeight::Metadata),
        ];

        if let Some(date) = format_date(self.date) {
            fields.push(IndexField::keyword(FIELD_DATE, date.clone()).with_weight(FieldWeight::Metadata));
            fields.push(IndexField::keyword(FIELD_CREATIONDATE, date).with_weight(FieldWeight::Metadata));
        }

        let fulltext = match &self.text {
            Some(text) if !text.is_empty() => format!("{} {}", self.filename, text),
            _ => self.filename.clone(),
        };
        fields.push(IndexField::unstored_text(FIELD_FULLTEXT, fulltext, FieldWeight::Content));

        fields
    }
}

/// Request to drop every document of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionWipe {
    pub wiki: String,
}

impl PartitionWipe {
    pub fn new(wiki: impl Into<String>) -> Self {
        Self { wiki: wiki.into() }
    }
}
