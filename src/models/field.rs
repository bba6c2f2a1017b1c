//! Weighted index fields produced by index records

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const FIELD_ID: &str = "id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_WIKI: &str = "wiki";
pub const FIELD_SPACE: &str = "space";
pub const FIELD_NAME: &str = "name";
pub const FIELD_FULLNAME: &str = "fullname";
pub const FIELD_LANG: &str = "lang";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_AUTHOR: &str = "author";
pub const FIELD_CREATOR: &str = "creator";
pub const FIELD_DATE: &str = "date";
pub const FIELD_CREATIONDATE: &str = "creationdate";
pub const FIELD_HIDDEN: &str = "hidden";
pub const FIELD_FULLTEXT: &str = "ft";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_MIMETYPE: &str = "mimetype";
pub const FIELD_FILESIZE: &str = "filesize";
pub const FIELD_OBJECT: &str = "object";
/// Owner title copied onto attachments, weighted as inherited
pub const FIELD_OWNER_TITLE: &str = "owner_title";
/// Owner page name copied onto attachments, weighted as inherited
pub const FIELD_OWNER_NAME: &str = "owner_name";

/// Fields searched when the query names no field
pub const DEFAULT_SEARCH_FIELDS: [&str; 6] = [
    FIELD_FULLTEXT,
    FIELD_TITLE,
    FIELD_NAME,
    FIELD_FILENAME,
    FIELD_OWNER_TITLE,
    FIELD_OWNER_NAME,
];

/// Format of every date field; lexical order equals chronological order
pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Weight class of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FieldWeight {
    /// Key and addressing fields, never tokenized
    Identity,
    Title,
    Name,
    Content,
    Metadata,
    /// Structured object properties
    Property,
    /// Owner fields copied onto attachments
    Inherited,
}

impl FieldWeight {
    pub fn boost(self) -> f32 {
        match self {
            FieldWeight::Identity => 1.0,
            FieldWeight::Title => 3.0,
            FieldWeight::Name => 2.0,
            FieldWeight::Content => 1.0,
            FieldWeight::Metadata => 1.0,
            FieldWeight::Property => 1.0,
            FieldWeight::Inherited => 0.3,
        }
    }
}

/// One `(name, value, stored, tokenized, boost)` tuple handed to the index engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub value: String,
    pub stored: bool,
    pub tokenized: bool,
    pub boost: f32,
}

impl IndexField {
    /// Untokenized, stored field addressed by exact value
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            stored: true,
            tokenized: false,
            boost: FieldWeight::Identity.boost(),
        }
    }

    /// Tokenized, stored field
    pub fn text(name: impl Into<String>, value: impl Into<String>, weight: FieldWeight) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            stored: true,
            tokenized: true,
            boost: weight.boost(),
        }
    }

    /// Tokenized field kept out of stored values
    pub fn unstored_text(name: impl Into<String>, value: impl Into<String>, weight: FieldWeight) -> Self {
        Self {
            stored: false,
            ..Self::text(name, value, weight)
        }
    }

    pub fn with_weight(mut self, weight: FieldWeight) -> Self {
        self.boost = weight.boost();
        self
    }
}
