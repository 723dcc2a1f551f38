//! Directive resolution.
//!
//! [`resolve_document`] is an explicit fixpoint: each pass gives every directive currently in
//! the document its computed content, in document order, then reconstructs the text and
//! re-extracts, since computed content may itself contain directives. Resolution stops when a
//! pass leaves no directive behind or after [`MAX_RESOLUTION_PASSES`] passes, whichever comes
//! first. Hitting the limit is reported as a diagnostic, not an error.
//!
//! Error handling per directive:
//! - no creator registered: a visible placeholder is inserted and a
//!   [`ProcessDiagnostic::UnresolvedDirective`] is emitted
//! - creator failure: the document is abandoned with [`TraceDocError::Dispatch`]
//! - grammar errors in produced content: the document is abandoned with the grammar error
//!
//! Trace links recorded while resolving are staged on the document's
//! [`crate::dispatch::DocumentState`] and committed to the engine only when resolution
//! returns `Ok`, so an abandoned document leaves no links behind.

pub mod compiler;
pub mod diagnostic;

pub use compiler::{CompilerStats, DocumentCompiler, GenerateResult};
pub use diagnostic::ProcessDiagnostic;

use serde::{Deserialize, Serialize};

use crate::{
    config::OutputFormat,
    dispatch::{CreatorContext, DispatchRegistry},
    document::TemplateDocument,
    error::{TagInvalid, TraceDocError},
    tag::{DataSource, Tag},
    trace::TraceLink,
};

pub const MAX_RESOLUTION_PASSES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub passes: usize,
    /// False when the pass limit stopped resolution
    pub converged: bool,
    pub diagnostics: Vec<ProcessDiagnostic>,
}

impl ResolveOutcome {
    pub fn unresolved_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.is_unresolved_directive())
            .count()
    }
}

pub fn resolve_document(
    document: &mut dyn TemplateDocument,
    registry: &DispatchRegistry,
    ctx: &CreatorContext<'_>,
) -> Result<ResolveOutcome, TraceDocError> {
    let mut outcome = ResolveOutcome::default();
    while !document.tags().is_empty() {
        if outcome.passes == MAX_RESOLUTION_PASSES {
            let remaining = document.tags().len();
            tracing::warn!(
                "[Pipeline] {} still holds {} directives after {} passes, giving up",
                document.title(),
                remaining,
                outcome.passes
            );
            outcome.diagnostics.push(ProcessDiagnostic::DepthLimitReached {
                document: document.title().to_string(),
                passes: outcome.passes,
                remaining,
            });
            ctx.engine.commit(ctx.state.take_links());
            return Ok(outcome);
        }
        outcome.passes += 1;
        tracing::debug!(
            "[Pipeline] {} pass {}: {} directives",
            document.title(),
            outcome.passes,
            document.tags().len()
        );

        let title = document.title().to_string();
        let locations: Vec<Option<(usize, usize)>> = (0..document.tags().len())
            .map(|index| document.location(index))
            .collect();
        for (tag, location) in document.tags_mut().iter_mut().zip(locations) {
            let content =
                resolve_tag(tag, &title, location, registry, ctx, &mut outcome.diagnostics)?;
            tag.set_contents(content);
        }
        document.refresh()?;
    }
    outcome.converged = true;
    ctx.engine.commit(ctx.state.take_links());
    Ok(outcome)
}

fn resolve_tag(
    tag: &Tag,
    title: &str,
    location: Option<(usize, usize)>,
    registry: &DispatchRegistry,
    ctx: &CreatorContext<'_>,
    diagnostics: &mut Vec<ProcessDiagnostic>,
) -> Result<String, TraceDocError> {
    if tag.source() == DataSource::Trace {
        return trace_reference(tag, title, location, ctx);
    }
    match registry.lookup(tag.source(), tag.directive()) {
        Some(creator) => creator
            .create(tag, ctx)
            .map_err(|e| dispatch_failure(e, title, tag)),
        None => {
            tracing::warn!(
                "[Pipeline] no content creator for {} in {title}",
                tag.qualified_id()
            );
            diagnostics.push(ProcessDiagnostic::unresolved(
                title,
                tag.source(),
                tag.directive(),
            ));
            Ok(placeholder(tag))
        }
    }
}

/// Text substituted for a directive nobody can resolve.
pub fn placeholder(tag: &Tag) -> String {
    format!(
        "UNABLE TO CREATE CONTENT, NO CONTENT CREATOR IS REGISTERED FOR '{}'",
        tag.qualified_id()
    )
}

/// `Trace:<Entity>(id=X)` records `(Entity, X) -> (document, X)` and renders a reference to X.
fn trace_reference(
    tag: &Tag,
    title: &str,
    location: Option<(usize, usize)>,
    ctx: &CreatorContext<'_>,
) -> Result<String, TraceDocError> {
    let id = tag.parameter("id").ok_or_else(|| {
        TraceDocError::Grammar(TagInvalid {
            location,
            ..TagInvalid::new(tag.raw(), "Trace directive is missing \"ID\" parameter")
                .with_document(title)
        })
    })?;
    let entity = ctx.engine.catalog().require(tag.directive())?;
    ctx.record_link(
        TraceLink::new(&entity.id, id, &ctx.document.id, id).in_document(&ctx.document.id),
    )?;

    let url = ctx.items.item(id).and_then(|item| item.link);
    Ok(match (ctx.project.output_format, url) {
        (OutputFormat::Html, Some(url)) => format!("<a href=\"{url}\">{id}</a>"),
        (OutputFormat::Asciidoc, Some(url)) => format!("({url}[{id}])"),
        _ => format!("({id})"),
    })
}

fn dispatch_failure(err: TraceDocError, title: &str, tag: &Tag) -> TraceDocError {
    let reason = match err {
        TraceDocError::Dispatch { reason, .. } => reason,
        other => other.to_string(),
    };
    tracing::warn!(
        "[Pipeline] content creation for {} in {title} failed: {reason}",
        tag.qualified_id()
    );
    TraceDocError::Dispatch {
        document: title.to_string(),
        directive: tag.qualified_id(),
        reason,
    }
}
