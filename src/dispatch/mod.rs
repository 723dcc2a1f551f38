//! Content dispatch.
//!
//! A [`ContentCreator`] turns one directive into its substitution text. The
//! [`DispatchRegistry`] maps `(source, directive id)` to a creator and is built once per run,
//! then shared immutably by every document being generated. Lookup tries the exact directive
//! id first (case-insensitive), then a creator registered for the whole source.

pub mod builtin;

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    config::{DocumentConfig, ProjectConfig},
    error::TraceDocError,
    items::ItemSource,
    tag::{DataSource, Tag},
    trace::{TraceLink, TraceabilityEngine},
};

/// Everything a creator may consult while producing content for one directive.
pub struct CreatorContext<'a> {
    /// The document being generated
    pub document: &'a DocumentConfig,
    pub project: &'a ProjectConfig,
    pub engine: &'a TraceabilityEngine,
    pub items: &'a dyn ItemSource,
    pub state: &'a DocumentState,
}

impl<'a> CreatorContext<'a> {
    pub fn new(
        document: &'a DocumentConfig,
        project: &'a ProjectConfig,
        engine: &'a TraceabilityEngine,
        items: &'a dyn ItemSource,
        state: &'a DocumentState,
    ) -> Self {
        CreatorContext {
            document,
            project,
            engine,
            items,
            state,
        }
    }

    /// Stage a trace link for the document being generated. Staged links reach the engine
    /// only once the whole document resolves.
    pub fn record_link(&self, link: TraceLink) -> Result<TraceLink, TraceDocError> {
        let link = self.engine.canonicalize(link)?;
        self.state.stage_link(link.clone());
        Ok(link)
    }
}

/// Per-document scratch state. Never shared between documents.
#[derive(Debug, Default)]
pub struct DocumentState {
    entity_counts: Mutex<IndexMap<String, usize>>,
    staged_links: Mutex<Vec<TraceLink>>,
}

impl DocumentState {
    pub fn new() -> Self {
        DocumentState::default()
    }

    pub fn add_entities(&self, entity: &str, count: usize) {
        *self
            .entity_counts
            .lock()
            .entry(entity.to_string())
            .or_default() += count;
    }

    pub fn entity_count(&self, entity: &str) -> usize {
        self.entity_counts.lock().get(entity).copied().unwrap_or(0)
    }

    pub fn reset_entity_count(&self, entity: &str) {
        self.entity_counts.lock().shift_remove(entity);
    }

    pub fn stage_link(&self, link: TraceLink) {
        self.staged_links.lock().push(link);
    }

    pub fn staged_links(&self) -> Vec<TraceLink> {
        self.staged_links.lock().clone()
    }

    pub fn take_links(&self) -> Vec<TraceLink> {
        std::mem::take(&mut *self.staged_links.lock())
    }
}

pub trait ContentCreator: Send + Sync {
    fn create(&self, tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError>;
}

impl<F> ContentCreator for F
where
    F: Fn(&Tag, &CreatorContext<'_>) -> Result<String, TraceDocError> + Send + Sync,
{
    fn create(&self, tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
        self(tag, ctx)
    }
}

/// Failure raised from inside a creator. The pipeline fills in the document and directive.
pub fn creation_error(reason: impl Into<String>) -> TraceDocError {
    TraceDocError::Dispatch {
        document: String::new(),
        directive: String::new(),
        reason: reason.into(),
    }
}

#[derive(Clone, Default)]
pub struct DispatchRegistry {
    exact: HashMap<(DataSource, String), Arc<dyn ContentCreator>>,
    by_source: HashMap<DataSource, Arc<dyn ContentCreator>>,
}

impl DispatchRegistry {
    /// An empty registry: every directive resolves to a placeholder.
    pub fn new() -> Self {
        DispatchRegistry::default()
    }

    /// Registry holding the built-in creators; see [`builtin`].
    pub fn with_builtins() -> Self {
        builtin::register(DispatchRegistry::new())
    }

    pub fn register<C>(mut self, source: DataSource, directive: &str, creator: C) -> Self
    where
        C: ContentCreator + 'static,
    {
        self.exact
            .insert((source, directive.trim().to_uppercase()), Arc::new(creator));
        self
    }

    /// Register a creator answering every directive of `source` without an exact entry.
    pub fn register_source<C>(mut self, source: DataSource, creator: C) -> Self
    where
        C: ContentCreator + 'static,
    {
        self.by_source.insert(source, Arc::new(creator));
        self
    }

    pub fn lookup(&self, source: DataSource, directive: &str) -> Option<&dyn ContentCreator> {
        self.exact
            .get(&(source, directive.trim().to_uppercase()))
            .or_else(|| self.by_source.get(&source))
            .map(|creator| creator.as_ref())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<String> = self
            .exact
            .keys()
            .map(|(source, id)| format!("{source}:{id}"))
            .collect();
        exact.sort();
        let mut sources: Vec<&str> = self.by_source.keys().map(|s| s.as_str()).collect();
        sources.sort();
        f.debug_struct("DispatchRegistry")
            .field("exact", &exact)
            .field("by_source", &sources)
            .finish()
    }
}
