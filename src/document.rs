//! Template documents.
//!
//! The resolution pipeline works against [`TemplateDocument`], which hides how tag contents
//! are committed back to the host document. [`TextDocument`] holds plain text and anchors its
//! tags to byte spans. [`ControlDocument`] models a rich document whose directives live in
//! content-control nodes, each identified by a control id.

use crate::{
    error::{line_column, TraceDocError},
    tag::{extract_tags, reinsert, Tag, TagAnchor, TagForm},
};

pub trait TemplateDocument {
    fn title(&self) -> &str;

    /// Directives currently present, in document order.
    fn tags(&self) -> &[Tag];

    fn tags_mut(&mut self) -> &mut [Tag];

    /// Commit modified tag contents into the document and extract the directives present
    /// afterwards.
    fn refresh(&mut self) -> Result<(), TraceDocError>;

    /// The document text with all modified tag contents applied.
    fn to_text(&self) -> String;

    /// 1-based line and column where the tag at `index` starts, as of the last refresh.
    fn location(&self, index: usize) -> Option<(usize, usize)>;
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    title: String,
    text: String,
    tags: Vec<Tag>,
}

impl TextDocument {
    /// Parse a plain-text template. Line endings are normalised to `\n`.
    pub fn from_string(title: impl Into<String>, text: &str) -> Result<Self, TraceDocError> {
        let title = title.into();
        let text = text.replace("\r\n", "\n");
        let tags = extract_tags(&text).map_err(|e| e.in_document(&title))?;
        Ok(TextDocument { title, text, tags })
    }

    /// Text as of the last refresh.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl TemplateDocument for TextDocument {
    fn title(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut [Tag] {
        &mut self.tags
    }

    fn refresh(&mut self) -> Result<(), TraceDocError> {
        self.text = reinsert(&self.text, &self.tags);
        self.tags = extract_tags(&self.text).map_err(|e| e.in_document(&self.title))?;
        Ok(())
    }

    fn to_text(&self) -> String {
        reinsert(&self.text, &self.tags)
    }

    fn location(&self, index: usize) -> Option<(usize, usize)> {
        let span = self.tags.get(index)?.span()?;
        Some(line_column(&self.text, span.start))
    }
}

/// One piece of a [`ControlDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Control {
        id: String,
        /// Directive text attached to the control, `Source:Id(params)`
        directive: String,
        contents: String,
        /// Set once the control's directive has been replaced by computed content
        resolved: bool,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(text.into())
    }

    pub fn control(
        id: impl Into<String>,
        directive: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        Segment::Control {
            id: id.into(),
            directive: directive.into(),
            contents: contents.into(),
            resolved: false,
        }
    }
}

/// A rich document made of text runs and content controls.
///
/// Each unresolved control contributes one control-anchored tag. Once a control's tag is
/// resolved its computed content becomes part of the document and is scanned for directives
/// like any text run.
#[derive(Debug, Clone)]
pub struct ControlDocument {
    title: String,
    segments: Vec<Segment>,
    tags: Vec<Tag>,
    /// Index of the segment each tag was extracted from
    owners: Vec<usize>,
}

impl ControlDocument {
    pub fn new(title: impl Into<String>, segments: Vec<Segment>) -> Result<Self, TraceDocError> {
        let mut document = ControlDocument {
            title: title.into(),
            segments,
            tags: Vec::new(),
            owners: Vec::new(),
        };
        document.extract()?;
        Ok(document)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Current contents of a control, looked up by id.
    pub fn control_contents(&self, control_id: &str) -> Option<&str> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Control { id, contents, .. } if id == control_id => Some(contents.as_str()),
            _ => None,
        })
    }

    fn extract(&mut self) -> Result<(), TraceDocError> {
        self.tags.clear();
        self.owners.clear();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Control {
                    id,
                    directive,
                    contents,
                    resolved: false,
                } => {
                    let tag = Tag::parse(
                        directive,
                        contents.as_str(),
                        TagForm::Block,
                        TagAnchor::Control(id.clone()),
                    )
                    .map_err(|e| e.in_document(&self.title))?;
                    self.tags.push(tag);
                    self.owners.push(index);
                }
                Segment::Control { contents, .. } | Segment::Text(contents) => {
                    let tags = extract_tags(contents).map_err(|e| e.in_document(&self.title))?;
                    self.owners.extend(std::iter::repeat(index).take(tags.len()));
                    self.tags.extend(tags);
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self) {
        let ControlDocument {
            segments,
            tags,
            owners,
            ..
        } = self;
        for (index, segment) in segments.iter_mut().enumerate() {
            let owned: Vec<Tag> = tags
                .iter()
                .zip(owners.iter())
                .filter(|(_, owner)| **owner == index)
                .map(|(tag, _)| tag.clone())
                .collect();
            match segment {
                Segment::Control {
                    contents,
                    resolved,
                    ..
                } if !*resolved => {
                    if let Some(tag) = owned.first().filter(|tag| tag.is_modified()) {
                        *contents = tag.contents().to_string();
                        *resolved = true;
                    }
                }
                Segment::Control { contents, .. } | Segment::Text(contents) => {
                    *contents = reinsert(contents, &owned);
                }
            }
        }
    }
}

impl TemplateDocument for ControlDocument {
    fn title(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut [Tag] {
        &mut self.tags
    }

    fn refresh(&mut self) -> Result<(), TraceDocError> {
        self.commit();
        self.extract()
    }

    fn to_text(&self) -> String {
        let mut committed = self.clone();
        committed.commit();
        committed
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.as_str(),
                Segment::Control { contents, .. } => contents.as_str(),
            })
            .collect()
    }

    /// Counted over the concatenated segments. A control-anchored tag is located at the
    /// start of its control.
    fn location(&self, index: usize) -> Option<(usize, usize)> {
        let tag = self.tags.get(index)?;
        let owner = *self.owners.get(index)?;
        let mut text = String::new();
        for segment in &self.segments[..owner] {
            match segment {
                Segment::Text(contents) | Segment::Control { contents, .. } => {
                    text.push_str(contents)
                }
            }
        }
        let offset = text.len() + tag.span().map(|span| span.start).unwrap_or(0);
        if let Some(Segment::Text(contents) | Segment::Control { contents, .. }) =
            self.segments.get(owner)
        {
            text.push_str(contents);
        }
        Some(line_column(&text, offset))
    }
}
