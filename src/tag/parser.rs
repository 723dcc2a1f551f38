//! Directive extraction, grammar validation and reconstruction.
//!
//! Extraction works on maximal runs of the `@` marker: a run of two delimits an inline
//! directive, a run of three delimits a block directive, anything longer is an error. Block
//! delimiters whose remaining line is blank close the innermost open block; all others open one.
//! Only outermost blocks are surfaced. Everything inside a block body, including inline and
//! block directives, stays in that block's contents until [`Tag::nested_tags`] is asked for it.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DataSource, Parameters, Tag, TagAnchor, TagForm, TextSpan};
use crate::error::{TagInvalid, TraceDocError};

const INLINE_MARKER: usize = 2;
const BLOCK_MARKER: usize = 3;

pub const NOT_FORMATTED: &str = "Directive is not formatted correctly";
pub const PREAMBLE_INVALID: &str = "Preamble section in directive not formatted correctly";
pub const PARAMETERS_INVALID: &str = "Parameter section in directive not formatted correctly";
pub const ELEMENT_INVALID: &str = "Malformed element in parameter section of directive";
pub const BLOCK_COUNT_ODD: &str = "Number of @@@ block delimiters is not even";
pub const INLINE_COUNT_ODD: &str = "Number of @@ inline delimiters is not even";
pub const BLOCK_UNBALANCED: &str = "Unbalanced block directive";
pub const INLINE_LINE_BREAK: &str = "Inline directives cannot contain line breaks";

static MARKER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@{2,}").expect("marker run pattern is a valid regex"));

/// Extract all top-level directives from `text`, in document order.
///
/// Every grammar violation is fatal and is reported with the 1-based line and column of the
/// offending directive within `text`.
pub fn extract_tags(text: &str) -> Result<Vec<Tag>, TraceDocError> {
    let mut block_markers = Vec::new();
    let mut inline_markers = Vec::new();
    for run in MARKER_RUN.find_iter(text) {
        match run.len() {
            INLINE_MARKER => inline_markers.push(run.start()),
            BLOCK_MARKER => block_markers.push(run.start()),
            n => {
                return Err(marker_error(
                    text,
                    run.start(),
                    format!("Invalid delimiter run of {n} markers"),
                ))
            }
        }
    }

    if block_markers.len() % 2 != 0 {
        let last = block_markers.last().copied().unwrap_or_default();
        return Err(marker_error(text, last, BLOCK_COUNT_ODD));
    }

    let mut open: Vec<usize> = Vec::new();
    let mut blocks: Vec<(usize, usize)> = Vec::new();
    for &pos in &block_markers {
        if is_block_closer(text, pos) {
            let opener = open
                .pop()
                .ok_or_else(|| marker_error(text, pos, BLOCK_UNBALANCED))?;
            if open.is_empty() {
                blocks.push((opener, pos));
            }
        } else {
            open.push(pos);
        }
    }
    if let Some(&pos) = open.last() {
        return Err(marker_error(text, pos, BLOCK_UNBALANCED));
    }

    let mut tags = Vec::with_capacity(blocks.len());
    let mut block_spans = Vec::with_capacity(blocks.len());
    for (opener, closer) in blocks {
        let tag = block_tag(text, opener, closer)?;
        if let Some(span) = tag.span() {
            block_spans.push(*span);
        }
        tags.push(tag);
    }

    let inline_markers: Vec<usize> = inline_markers
        .into_iter()
        .filter(|pos| !block_spans.iter().any(|span| span.contains(*pos)))
        .collect();
    if inline_markers.len() % 2 != 0 {
        let last = inline_markers.last().copied().unwrap_or_default();
        return Err(marker_error(text, last, INLINE_COUNT_ODD));
    }
    for pair in inline_markers.chunks_exact(2) {
        tags.push(inline_tag(text, pair[0], pair[1])?);
    }

    tags.sort_by_key(|tag| tag.span().map(|span| span.start).unwrap_or_default());
    tracing::debug!("[Parser] extracted {} tags", tags.len());
    Ok(tags)
}

/// Rebuild the document text, substituting the contents of every modified tag for its span.
///
/// Unmodified tags keep their original text, so `reinsert(text, &extract_tags(text)?)` is the
/// identity. Non-empty block contents are followed by a line break to keep the output
/// line-oriented. Control-anchored tags are not part of the text and are ignored.
pub fn reinsert(text: &str, tags: &[Tag]) -> String {
    let mut anchored: Vec<(&TextSpan, &Tag)> = tags
        .iter()
        .filter_map(|tag| tag.span().map(|span| (span, tag)))
        .collect();
    anchored.sort_by_key(|(span, _)| span.content_start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, tag) in anchored {
        let (Some(before), Some(original)) =
            (text.get(cursor..span.start), text.get(span.start..span.end))
        else {
            tracing::warn!(
                "[Parser] skipping tag {} with span {}..{} outside of reconstructed text",
                tag.qualified_id(),
                span.start,
                span.end
            );
            continue;
        };
        out.push_str(before);
        if tag.is_modified() {
            out.push_str(tag.contents());
            if tag.form() == TagForm::Block && !tag.contents().is_empty() {
                out.push('\n');
            }
        } else {
            out.push_str(original);
        }
        cursor = span.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());
    out
}

/// Parse directive text of the form `Source:DirectiveId(key=value,...)`.
///
/// The parameter list is optional; `()` yields no parameters. Keys and values are trimmed.
pub fn parse_directive(raw: &str) -> Result<(DataSource, String, Parameters), TraceDocError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| TraceDocError::Grammar(TagInvalid::new(trimmed, reason));

    let opens = trimmed.matches('(').count();
    let closes = trimmed.matches(')').count();
    if opens > 1 || closes > 1 || opens != closes {
        return Err(invalid(NOT_FORMATTED));
    }

    let (preamble, parameter_text) = match (trimmed.find('('), trimmed.find(')')) {
        (Some(open), Some(close)) => {
            if close < open || !trimmed[close + 1..].trim().is_empty() {
                return Err(invalid(NOT_FORMATTED));
            }
            (&trimmed[..open], Some(&trimmed[open + 1..close]))
        }
        _ => (trimmed, None),
    };

    if !preamble.contains(':') {
        return Err(invalid(NOT_FORMATTED));
    }
    let tokens: Vec<&str> = preamble.split(':').map(str::trim).collect();
    if tokens.len() != 2 || tokens.iter().any(|token| token.is_empty()) {
        return Err(invalid(PREAMBLE_INVALID));
    }

    let source = DataSource::from_token(tokens[0]);
    if !source.is_known() {
        return Err(TraceDocError::UnknownCategory(TagInvalid::new(
            trimmed,
            format!("Unknown data source '{}'", tokens[0]),
        )));
    }

    let parameters = match parameter_text {
        Some(text) => parse_parameters(trimmed, text)?,
        None => Parameters::new(),
    };
    Ok((source, tokens[1].to_string(), parameters))
}

fn parse_parameters(raw: &str, text: &str) -> Result<Parameters, TraceDocError> {
    let mut parameters = Parameters::new();
    if text.trim().is_empty() {
        return Ok(parameters);
    }
    let invalid = |reason: &str| TraceDocError::Grammar(TagInvalid::new(raw, reason));

    if text.matches('=').count() != text.matches(',').count() + 1 {
        return Err(invalid(PARAMETERS_INVALID));
    }
    for element in text.split(',') {
        let mut parts = element.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None)
                if !key.trim().is_empty() && !value.trim().is_empty() =>
            {
                parameters.insert(key, value.trim());
            }
            _ => return Err(invalid(ELEMENT_INVALID)),
        }
    }
    Ok(parameters)
}

fn is_block_closer(text: &str, marker: usize) -> bool {
    line_rest(text, marker + BLOCK_MARKER).trim().is_empty()
}

/// Text from `offset` to the end of its line, excluding the line break.
fn line_rest(text: &str, offset: usize) -> &str {
    let rest = text.get(offset..).unwrap_or_default();
    match rest.find('\n') {
        Some(nl) => &rest[..nl],
        None => rest,
    }
}

fn block_tag(text: &str, opener: usize, closer: usize) -> Result<Tag, TraceDocError> {
    let preamble_start = opener + BLOCK_MARKER;
    let raw = line_rest(text, preamble_start);
    let content_start = (preamble_start + raw.len() + 1).min(text.len());
    if closer < content_start {
        return Err(marker_error(text, opener, NOT_FORMATTED));
    }

    // The closing line may be indented; only whitespace before the delimiter is dropped.
    let closing_line_start = text[content_start..closer]
        .rfind('\n')
        .map(|nl| content_start + nl + 1)
        .unwrap_or(content_start);
    let content_end = if text[closing_line_start..closer].trim().is_empty() {
        closing_line_start
    } else {
        closer
    };

    let after_closer = closer + BLOCK_MARKER;
    let end = match text[after_closer..].find('\n') {
        Some(nl) => after_closer + nl + 1,
        None => text.len(),
    };

    let span = TextSpan {
        start: opener,
        end,
        content_start,
        content_end,
    };
    Tag::parse(
        raw,
        &text[content_start..content_end],
        TagForm::Block,
        TagAnchor::Text(span),
    )
    .map_err(|e| e.located(text, opener))
}

fn inline_tag(text: &str, open: usize, close: usize) -> Result<Tag, TraceDocError> {
    let content_start = open + INLINE_MARKER;
    let interior = &text[content_start..close];
    if interior.contains('\n') {
        return Err(marker_error(text, open, INLINE_LINE_BREAK));
    }
    let span = TextSpan {
        start: open,
        end: close + INLINE_MARKER,
        content_start,
        content_end: close,
    };
    Tag::parse(interior, interior, TagForm::Inline, TagAnchor::Text(span))
        .map_err(|e| e.located(text, open))
}

fn marker_error(text: &str, offset: usize, reason: impl Into<String>) -> TraceDocError {
    let line = line_rest(text, offset).trim();
    TraceDocError::Grammar(TagInvalid::new(line, reason).with_location(text, offset))
}
