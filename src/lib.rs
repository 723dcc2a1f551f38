//! # tracedoc-core
//!
//! Generates controlled documentation from templates and keeps track of which items each
//! generated document covers.
//!
//! ## Overview
//!
//! Templates are plain text carrying embedded directives:
//!
//! ```text
//! Prepared by @@Config:CompanyName()@@ for @@Document:Title()@@.
//!
//! @@@SLMS:SystemRequirement(category=Safety)
//! this block is replaced by the listing
//! @@@
//! ```
//!
//! An inline directive is `@@<Source>:<Id>(<Key>=<Value>,...)@@` on a single line; a block
//! directive opens with `@@@<Source>:<Id>(...)` at the start of a region and closes with `@@@`
//! on a line of its own. Only outermost directives are resolved in a pass. Content produced by
//! a pass may itself carry directives, so resolution repeats until nothing is left or the pass
//! limit is reached.
//!
//! While documents are resolved the traceability engine records which item of which entity is
//! covered by which document. Afterwards it builds traceability matrices and reports gaps
//! (missing, extra or incorrect trace links) against the project's declared expectations.
//!
//! ## Architecture
//!
//! - **[`tag`]**: directive grammar, extraction and text reconstruction
//! - **[`document`]**: text templates and content-control documents behind one trait
//! - **[`dispatch`]**: content creators and the `(source, id)` registry, with built-ins
//! - **[`pipeline`]**: fixpoint resolution and the per-project [`pipeline::DocumentCompiler`]
//! - **[`trace`]**: entities, trace links, expectations and matrices
//! - **[`items`]**: the data provider seam and the JSON item catalog
//! - **[`config`]**: TOML project configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tracedoc_core::pipeline::DocumentCompiler;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut compiler = DocumentCompiler::from_config_file("project.toml")?;
//!
//!     for result in compiler.generate_all() {
//!         for diagnostic in &result.diagnostics {
//!             println!("{diagnostic}");
//!         }
//!         if let Some(err) = &result.error {
//!             eprintln!("{}: {err}", result.title);
//!         }
//!     }
//!
//!     println!("{}", compiler.matrix("SystemRequirement")?);
//!     Ok(())
//! }
//! ```
//!
//! ### Checking a template
//!
//! ```rust
//! use tracedoc_core::tag::extract_tags;
//!
//! let tags = extract_tags("Owner: @@Config:Owner()@@\n").unwrap();
//! assert_eq!(tags[0].qualified_id(), "Config:Owner");
//!
//! let err = extract_tags("@@Config:Owner()").unwrap_err();
//! assert!(err.tag_invalid().is_some());
//! ```

pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod items;
pub mod pipeline;
pub mod tag;
#[cfg(test)]
mod tests;
pub mod trace;

pub use error::*;
