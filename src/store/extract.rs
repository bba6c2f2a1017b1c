//! Best-effort plain text extraction for attachments

/// Turns attachment bytes into indexable text
pub trait TextExtractor: Send + Sync {
    /// `None` when the type is unsupported or the content cannot be decoded
    fn extract(&self, filename: &str, mime_type: &str, content: &[u8]) -> Option<String>;
}

/// Decodes textual mime types as UTF-8
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

const TEXTUAL_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-javascript",
    "application/csv",
];

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        essence.starts_with("text/")
            || essence.ends_with("+xml")
            || essence.ends_with("+json")
            || TEXTUAL_TYPES.contains(&essence.as_str())
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, mime_type: &str, content: &[u8]) -> Option<String> {
        if !Self::supports(mime_type) {
            tracing::debug!(filename, mime_type, "No text extraction for mime type");
            return None;
        }

        let text = String::from_utf8_lossy(content);
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}
