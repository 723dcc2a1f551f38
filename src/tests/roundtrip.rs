//! Property tests for extraction and reconstruction

use super::helpers::*;
use crate::{
    dispatch::DispatchRegistry,
    document::{TemplateDocument, TextDocument},
    tag::{extract_tags, reinsert},
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Inline {
        before: String,
        directive: String,
        after: String,
    },
    Block {
        directive: String,
        body: Vec<String>,
    },
}

// ===================
// Strategies
// ===================

fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,:#*()=]{0,24}"
}

fn directive_strategy() -> impl Strategy<Value = String> {
    let source = prop::sample::select(vec!["SLMS", "Config", "Document", "Web", "OTS", "Comment"]);
    let params = prop::collection::vec(("[a-z]{1,6}", "[a-zA-Z0-9][a-zA-Z0-9 ]{0,7}"), 0..3);
    (source, "[A-Za-z][A-Za-z0-9]{0,10}", params).prop_map(|(source, id, params)| {
        let params: Vec<String> = params
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!("{source}:{id}({})", params.join(","))
    })
}

fn body_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        text_strategy(),
        (text_strategy(), directive_strategy()).prop_map(|(text, d)| format!("{text}@@{d}@@")),
    ]
}

fn piece_strategy() -> impl Strategy<Value = Piece> {
    prop_oneof![
        text_strategy().prop_map(Piece::Text),
        (text_strategy(), directive_strategy(), text_strategy()).prop_map(
            |(before, directive, after)| Piece::Inline {
                before,
                directive,
                after
            }
        ),
        (
            directive_strategy(),
            prop::collection::vec(body_line_strategy(), 0..4)
        )
            .prop_map(|(directive, body)| Piece::Block { directive, body }),
    ]
}

fn document_strategy() -> impl Strategy<Value = (String, usize)> {
    prop::collection::vec(piece_strategy(), 0..12).prop_map(|pieces| {
        let mut text = String::new();
        let mut directives = 0;
        for piece in pieces {
            match piece {
                Piece::Text(line) => text.push_str(&line),
                Piece::Inline {
                    before,
                    directive,
                    after,
                } => {
                    directives += 1;
                    text.push_str(&format!("{before}@@{directive}@@{after}"));
                }
                Piece::Block { directive, body } => {
                    directives += 1;
                    text.push_str(&format!("@@@{directive}\n"));
                    for line in body {
                        text.push_str(&line);
                        text.push('\n');
                    }
                    text.push_str("@@@");
                }
            }
            text.push('\n');
        }
        (text, directives)
    })
}

// ===================
// Property Test Functions
// ===================

/// Unmodified tags reconstruct the exact input, and only top-level directives surface.
fn check_unmodified_roundtrip(text: &str, directives: usize) -> Result<(), TestCaseError> {
    let tags = extract_tags(text);
    prop_assert!(tags.is_ok(), "extraction failed for {text:?}: {tags:?}");
    let tags = tags.unwrap_or_default();
    prop_assert_eq!(tags.len(), directives);
    prop_assert_eq!(reinsert(text, &tags), text);
    Ok(())
}

/// Replacing every top-level directive with marker-free text leaves no directive behind.
fn check_resolution_removes_directives(text: &str) -> Result<(), TestCaseError> {
    let mut tags = extract_tags(text).map_err(|e| TestCaseError::fail(e.to_string()))?;
    for tag in tags.iter_mut() {
        let replacement = tag.directive().to_lowercase();
        tag.set_contents(replacement);
    }
    let resolved = reinsert(text, &tags);
    let remaining = extract_tags(&resolved).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(remaining.is_empty(), "{resolved:?} still holds directives");
    Ok(())
}

/// Changing one tag leaves every other tag equal after re-extraction, apart from spans after
/// the change moving by the length difference.
fn check_single_change_reparse(
    text: &str,
    index: prop::sample::Index,
) -> Result<(), TestCaseError> {
    let mut tags = extract_tags(text).map_err(|e| TestCaseError::fail(e.to_string()))?;
    if tags.is_empty() {
        return Ok(());
    }
    let changed = index.index(tags.len());
    tags[changed].set_contents("resolved");
    let resolved = reinsert(text, &tags);
    let delta = resolved.len() as isize - text.len() as isize;

    let reparsed = extract_tags(&resolved).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(reparsed.len(), tags.len() - 1);
    for (position, original) in tags.iter().enumerate().filter(|(i, _)| *i != changed) {
        let again = &reparsed[if position < changed { position } else { position - 1 }];
        prop_assert_eq!(again.source(), original.source());
        prop_assert_eq!(again.directive(), original.directive());
        prop_assert_eq!(again.parameters(), original.parameters());
        let span = original.span().copied();
        let expected = if position < changed {
            span
        } else {
            span.map(|span| span.shifted(delta))
        };
        prop_assert_eq!(again.span().copied(), expected);
    }
    Ok(())
}

/// With nothing registered every directive becomes one placeholder in a single pass.
fn check_placeholders_converge(text: &str, directives: usize) -> Result<(), TestCaseError> {
    let harness = Harness::new().with_registry(DispatchRegistry::new());
    let mut document =
        TextDocument::from_string("SRS", text).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let outcome = harness
        .resolve("SRS", &mut document)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(outcome.converged);
    prop_assert_eq!(outcome.passes, usize::from(directives > 0));
    prop_assert_eq!(outcome.unresolved_count(), directives);
    prop_assert!(document.tags().is_empty());
    Ok(())
}

// ===================
// Proptest Wrappers
// ===================

proptest! {
    #[test]
    fn unmodified_roundtrip((text, directives) in document_strategy()) {
        check_unmodified_roundtrip(&text, directives)?;
    }

    #[test]
    fn resolution_removes_directives((text, _) in document_strategy()) {
        check_resolution_removes_directives(&text)?;
    }

    #[test]
    fn single_change_reparse(
        (text, _) in document_strategy(),
        index in any::<prop::sample::Index>(),
    ) {
        check_single_change_reparse(&text, index)?;
    }

    #[test]
    fn placeholders_converge((text, directives) in document_strategy()) {
        check_placeholders_converge(&text, directives)?;
    }
}
