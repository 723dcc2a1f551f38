//! Directive (tag) model.
//!
//! A [`Tag`] is one directive occurrence inside a template document. Two textual forms exist:
//!
//! ```text
//! @@@SLMS:SystemRequirement(category=Safety)
//! block content, possibly spanning lines and holding further directives
//! @@@
//!
//! Inline @@Document:Title()@@ directives live on a single line.
//! ```
//!
//! The grammar itself lives in [`parser`]; this module holds the parsed values. Tags are
//! anchored either to a byte span of plain text ([`TagAnchor::Text`]) or to a content-control
//! node of a rich document ([`TagAnchor::Control`]). Both variants share parameter handling and
//! are committed back to their host through [`crate::document::TemplateDocument`].

pub mod parser;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{TagInvalid, TraceDocError};

pub use parser::{extract_tags, parse_directive, reinsert};

/// The external data category a directive pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataSource {
    /// Requirements, tests, risks and other tracked items
    #[serde(rename = "SLMS")]
    Slms,
    Source,
    Config,
    #[serde(rename = "OTS")]
    Ots,
    Post,
    Comment,
    /// Cross-reference recorded straight into the traceability engine
    Trace,
    Document,
    #[serde(rename = "Ref")]
    Reference,
    File,
    #[serde(rename = "AI")]
    Ai,
    Web,
    Unknown,
}

impl DataSource {
    pub const KNOWN: [DataSource; 12] = [
        DataSource::Slms,
        DataSource::Source,
        DataSource::Config,
        DataSource::Ots,
        DataSource::Post,
        DataSource::Comment,
        DataSource::Trace,
        DataSource::Document,
        DataSource::Reference,
        DataSource::File,
        DataSource::Ai,
        DataSource::Web,
    ];

    /// Case-insensitive lookup, falling back to [`DataSource::Unknown`].
    pub fn from_token(token: &str) -> DataSource {
        match token.trim().to_ascii_uppercase().as_str() {
            "SLMS" => DataSource::Slms,
            "SOURCE" => DataSource::Source,
            "CONFIG" => DataSource::Config,
            "OTS" => DataSource::Ots,
            "POST" => DataSource::Post,
            "COMMENT" => DataSource::Comment,
            "TRACE" => DataSource::Trace,
            "DOCUMENT" => DataSource::Document,
            "REF" | "REFERENCE" => DataSource::Reference,
            "FILE" => DataSource::File,
            "AI" => DataSource::Ai,
            "WEB" => DataSource::Web,
            _ => DataSource::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != DataSource::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Slms => "SLMS",
            DataSource::Source => "Source",
            DataSource::Config => "Config",
            DataSource::Ots => "OTS",
            DataSource::Post => "Post",
            DataSource::Comment => "Comment",
            DataSource::Trace => "Trace",
            DataSource::Document => "Document",
            DataSource::Reference => "Ref",
            DataSource::File => "File",
            DataSource::Ai => "AI",
            DataSource::Web => "Web",
            DataSource::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = TraceDocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match DataSource::from_token(s) {
            DataSource::Unknown => Err(TraceDocError::UnknownCategory(TagInvalid::new(
                s,
                format!("Unknown data source '{}'", s.trim()),
            ))),
            known => Ok(known),
        }
    }
}

/// Ordered directive parameters. Keys are stored upper-cased so lookups are case-insensitive;
/// inserting an existing key overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters(IndexMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Parameters::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.trim().to_uppercase(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.trim().to_uppercase()).map(String::as_str)
    }

    /// Boolean flag parameter (`restart=true`). Anything but `true` (any case) is false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&key.trim().to_uppercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagForm {
    Inline,
    Block,
}

/// Byte offsets into the text a tag was extracted from.
///
/// `start..end` covers the whole directive including delimiters (and, for block tags, the line
/// break ending the closing delimiter line). `content_start..content_end` is the substitutable
/// body: the interior of an inline tag, or the lines between a block's delimiter lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub content_start: usize,
    pub content_end: usize,
}

impl TextSpan {
    pub fn shifted(&self, delta: isize) -> TextSpan {
        let shift = |v: usize| (v as isize + delta).max(0) as usize;
        TextSpan {
            start: shift(self.start),
            end: shift(self.end),
            content_start: shift(self.content_start),
            content_end: shift(self.content_end),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagAnchor {
    Text(TextSpan),
    /// Identifier of a content-control node in a rich document
    Control(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    source: DataSource,
    directive: String,
    parameters: Parameters,
    /// The directive text as written: inline interior or block opening line
    raw: String,
    contents: String,
    form: TagForm,
    anchor: TagAnchor,
    modified: bool,
}

impl Tag {
    /// Build a tag from its directive text (`Source:Id(key=value)`), validating the grammar.
    pub fn parse(
        raw: &str,
        contents: impl Into<String>,
        form: TagForm,
        anchor: TagAnchor,
    ) -> Result<Tag, TraceDocError> {
        let (source, directive, parameters) = parse_directive(raw)?;
        Ok(Tag {
            source,
            directive,
            parameters,
            raw: raw.trim().to_string(),
            contents: contents.into(),
            form,
            anchor,
            modified: false,
        })
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Replace the substitutable body. The tag is then rendered from its contents instead of
    /// its original text on reinsertion.
    pub fn set_contents(&mut self, contents: impl Into<String>) {
        self.contents = contents.into();
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn form(&self) -> TagForm {
        self.form
    }

    pub fn is_inline(&self) -> bool {
        self.form == TagForm::Inline
    }

    pub fn anchor(&self) -> &TagAnchor {
        &self.anchor
    }

    pub fn span(&self) -> Option<&TextSpan> {
        match &self.anchor {
            TagAnchor::Text(span) => Some(span),
            TagAnchor::Control(_) => None,
        }
    }

    pub fn control_id(&self) -> Option<&str> {
        match &self.anchor {
            TagAnchor::Control(id) => Some(id),
            TagAnchor::Text(_) => None,
        }
    }

    /// Directives nested inside this tag's body. Spans are relative to [`Tag::contents`].
    ///
    /// Inline tags cannot nest, so they always yield nothing.
    pub fn nested_tags(&self) -> Result<Vec<Tag>, TraceDocError> {
        match self.form {
            TagForm::Inline => Ok(Vec::new()),
            TagForm::Block => extract_tags(&self.contents),
        }
    }

    /// `Source:Directive`, the key used in diagnostics and dispatch errors.
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.source, self.directive)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.source, self.directive, self.parameters)
    }
}
