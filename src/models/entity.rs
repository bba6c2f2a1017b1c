//! Content store entities: wiki pages, their attachments and structured objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hierarchical identifier of a wiki page: partition (wiki), section (space) and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityPath {
    /// Partition (wiki) the page lives in
    pub wiki: String,

    /// Section (space), may itself contain dots for nested spaces
    pub space: String,

    /// Page name inside the space
    pub name: String,
}

impl EntityPath {
    pub fn new(wiki: impl Into<String>, space: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            wiki: wiki.into(),
            space: space.into(),
            name: name.into(),
        }
    }

    /// `space.name`, the page reference local to its wiki
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.space, self.name)
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.wiki, self.space, self.name)
    }
}

/// Error returned when a `wiki:space.name` reference cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid entity reference `{0}`, expected `wiki:space.name`")]
pub struct InvalidEntityPath(pub String);

impl FromStr for EntityPath {
    type Err = InvalidEntityPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (wiki, local) = s
            .split_once(':')
            .ok_or_else(|| InvalidEntityPath(s.to_string()))?;
        let (space, name) = local
            .rsplit_once('.')
            .ok_or_else(|| InvalidEntityPath(s.to_string()))?;

        if wiki.is_empty() || space.is_empty() || name.is_empty() {
            return Err(InvalidEntityPath(s.to_string()));
        }

        Ok(Self::new(wiki, space, name))
    }
}

/// Lightweight listing entry produced while enumerating a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub path: EntityPath,

    /// `None` for the original (default language) page, `Some` for a translation
    pub language: Option<String>,

    pub version: String,
}

/// A wiki page as returned by the content store, with everything needed to index it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPage {
    pub path: EntityPath,

    /// `None` for the original page, `Some(code)` for a translation
    #[serde(default)]
    pub language: Option<String>,

    pub version: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub creator: String,

    pub creation_date: Option<DateTime<Utc>>,

    pub modification_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub hidden: bool,

    /// Rendered plain text content
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub objects: Vec<StructuredObject>,

    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

impl WikiPage {
    pub fn new(path: EntityPath, version: impl Into<String>) -> Self {
        Self {
            path,
            language: None,
            version: version.into(),
            title: String::new(),
            author: String::new(),
            creator: String::new(),
            creation_date: None,
            modification_date: None,
            hidden: false,
            content: String::new(),
            objects: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_object(mut self, object: StructuredObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentInfo) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn attachment(&self, filename: &str) -> Option<&AttachmentInfo> {
        self.attachments.iter().find(|a| a.filename == filename)
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            path: self.path.clone(),
            language: self.language.clone(),
            version: self.version.clone(),
        }
    }
}

/// Metadata of a file attached to a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub filename: String,

    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default = "default_attachment_version")]
    pub version: String,

    #[serde(default)]
    pub author: String,

    pub date: Option<DateTime<Utc>>,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

fn default_attachment_version() -> String {
    "1.1".to_string()
}

impl AttachmentInfo {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
            version: default_attachment_version(),
            author: String::new(),
            date: None,
        }
    }
}

/// An instance of a structured class attached to a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredObject {
    pub class_name: String,

    #[serde(default)]
    pub number: u32,

    #[serde(default)]
    pub properties: Vec<ObjectProperty>,
}

impl StructuredObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            number: 0,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push(ObjectProperty {
            name: name.into(),
            value,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub name: String,
    pub value: PropertyValue,
}

/// Typed value of an object property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// Selected values of a list property
    List(Vec<ListItem>),
    /// Never indexed
    Password(String),
}

/// One selected entry of a list property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    /// Stored key of the entry
    pub key: String,

    /// Value shown to users
    pub display: String,
}

impl ListItem {
    pub fn new(key: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display: display.into(),
        }
    }

    /// Entry whose display value is its key
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            key: value.clone(),
            display: value,
        }
    }
}
