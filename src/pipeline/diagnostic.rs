//! Diagnostic types for document resolution.
//!
//! Diagnostics are non-fatal: the document is still produced, but the author should look at
//! the reported spot.

use serde::{Deserialize, Serialize};

use crate::tag::DataSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessDiagnostic {
    /// No creator is registered for the directive; a placeholder was inserted instead
    UnresolvedDirective {
        document: String,
        source: DataSource,
        directive: String,
    },

    /// Resolution stopped at the pass limit with directives still present
    DepthLimitReached {
        document: String,
        passes: usize,
        remaining: usize,
    },
}

impl ProcessDiagnostic {
    pub fn unresolved(
        document: impl Into<String>,
        source: DataSource,
        directive: impl Into<String>,
    ) -> Self {
        Self::UnresolvedDirective {
            document: document.into(),
            source,
            directive: directive.into(),
        }
    }

    pub fn is_unresolved_directive(&self) -> bool {
        matches!(self, Self::UnresolvedDirective { .. })
    }

    /// `(source, directive)` if this is an unresolved directive
    pub fn as_unresolved_directive(&self) -> Option<(DataSource, &str)> {
        match self {
            Self::UnresolvedDirective {
                source, directive, ..
            } => Some((*source, directive.as_str())),
            _ => None,
        }
    }

    pub fn is_depth_limit(&self) -> bool {
        matches!(self, Self::DepthLimitReached { .. })
    }
}

impl std::fmt::Display for ProcessDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedDirective {
                document,
                source,
                directive,
            } => write!(
                f,
                "Unresolved directive in {document}: no content creator for {source}:{directive}"
            ),
            Self::DepthLimitReached {
                document,
                passes,
                remaining,
            } => write!(
                f,
                "Resolution of {document} stopped after {passes} passes with {remaining} directives left"
            ),
        }
    }
}
