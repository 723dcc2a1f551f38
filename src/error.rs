use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

/// A directive grammar violation.
///
/// Carries the offending raw tag text and a human readable reason. Location and document title
/// are attached as the error travels outward: the parser knows the offset, the document knows
/// its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInvalid {
    /// Raw text of the directive (inline interior or the block's opening line)
    pub contents: String,
    pub reason: String,
    /// 1-based (line, column) of the directive start
    pub location: Option<(usize, usize)>,
    /// Title of the template document the directive lives in
    pub document: Option<String>,
}

impl TagInvalid {
    pub fn new(contents: impl Into<String>, reason: impl Into<String>) -> Self {
        TagInvalid {
            contents: contents.into(),
            reason: reason.into(),
            location: None,
            document: None,
        }
    }

    /// Compute the 1-based line/column of `offset` within `text` and attach it. An existing
    /// location is kept, since it was computed against a more specific text.
    pub fn with_location(mut self, text: &str, offset: usize) -> Self {
        if self.location.is_none() {
            self.location = Some(line_column(text, offset));
        }
        self
    }

    pub fn with_document(mut self, title: impl Into<String>) -> Self {
        self.document = Some(title.into());
        self
    }
}

impl fmt::Display for TagInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(document) = &self.document {
            write!(f, " in {document} template")?;
        }
        if let Some((line, column)) = self.location {
            write!(f, " at ({line}:{column})")?;
        }
        write!(f, ". Tag contents: {}", self.contents)
    }
}

/// 1-based line and column of a byte offset. Lines are counted by `\n`; the column is the
/// character distance from the preceding line break.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let prefix = text.get(..offset).unwrap_or(text);
    let line = prefix.matches('\n').count() + 1;
    let column = match prefix.rfind('\n') {
        Some(nl) => prefix[nl + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, column)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum TraceDocError {
    #[error("Directive grammar error: {0}")]
    Grammar(TagInvalid),
    #[error("Unknown data source: {0}")]
    UnknownCategory(TagInvalid),
    #[error("Content creation failed in '{document}' for directive '{directive}': {reason}")]
    Dispatch {
        document: String,
        directive: String,
        reason: String,
    },
    #[error("Unknown trace entity: {0}")]
    UnknownEntity(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl TraceDocError {
    /// Grammar and category errors are fatal to the enclosing document and carry tag details.
    pub fn tag_invalid(&self) -> Option<&TagInvalid> {
        match self {
            TraceDocError::Grammar(invalid) | TraceDocError::UnknownCategory(invalid) => {
                Some(invalid)
            }
            _ => None,
        }
    }

    /// Attach a template title to grammar errors; other errors pass through.
    pub fn in_document(self, title: &str) -> Self {
        match self {
            TraceDocError::Grammar(invalid) => {
                TraceDocError::Grammar(invalid.with_document(title))
            }
            TraceDocError::UnknownCategory(invalid) => {
                TraceDocError::UnknownCategory(invalid.with_document(title))
            }
            other => other,
        }
    }

    /// Attach a line/column computed against `text` to grammar errors.
    pub fn located(self, text: &str, offset: usize) -> Self {
        match self {
            TraceDocError::Grammar(invalid) => {
                TraceDocError::Grammar(invalid.with_location(text, offset))
            }
            TraceDocError::UnknownCategory(invalid) => {
                TraceDocError::UnknownCategory(invalid.with_location(text, offset))
            }
            other => other,
        }
    }
}

impl From<TagInvalid> for TraceDocError {
    fn from(src: TagInvalid) -> TraceDocError {
        TraceDocError::Grammar(src)
    }
}

impl From<toml::de::Error> for TraceDocError {
    fn from(src: toml::de::Error) -> TraceDocError {
        TraceDocError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for TraceDocError {
    fn from(src: JsonError) -> TraceDocError {
        TraceDocError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for TraceDocError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => TraceDocError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => TraceDocError::PermissionDenied,
            _ => TraceDocError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for TraceDocError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => TraceDocError::Io("Directory walk failed: filesystem loop".to_string()),
        }
    }
}

impl From<fmt::Error> for TraceDocError {
    fn from(x: fmt::Error) -> Self {
        TraceDocError::Serialization(format!("{x}"))
    }
}

impl From<RegexError> for TraceDocError {
    fn from(x: RegexError) -> Self {
        TraceDocError::Serialization(format!("Regex parse failed: {x}"))
    }
}
