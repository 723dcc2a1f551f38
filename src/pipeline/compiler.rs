use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{resolve_document, ProcessDiagnostic, ResolveOutcome};
use crate::{
    config::{get_content, set_content, DocumentConfig, ProjectConfig},
    dispatch::{CreatorContext, DispatchRegistry, DocumentState},
    document::{TemplateDocument, TextDocument},
    error::TraceDocError,
    items::{ItemCatalog, ItemSource},
    trace::{TraceMatrix, TraceabilityEngine},
};

/// Generates every templated document of a project against one shared traceability engine.
///
/// ## Overview
///
/// The compiler owns the run: the project configuration, the immutable dispatch registry, the
/// data provider and the traceability engine. Documents with a template are queued in
/// declaration order. Each document is generated in isolation with its own tag set and
/// [`DocumentState`]; only the engine's link table is shared.
///
/// A document that fails (grammar error, creator failure, unreadable template) is reported in
/// its [`GenerateResult`] and does not stop the run. Matrices are requested from the engine
/// once generation is done, see [`DocumentCompiler::matrix`].
///
/// ```rust,no_run
/// use tracedoc_core::pipeline::DocumentCompiler;
///
/// # fn main() -> Result<(), tracedoc_core::TraceDocError> {
/// let mut compiler = DocumentCompiler::from_config_file("project.toml")?;
/// let results = compiler.generate_all();
/// compiler.write_results(&results)?;
/// println!("{}", compiler.matrix("SystemRequirement")?);
/// # Ok(())
/// # }
/// ```
pub struct DocumentCompiler {
    config: ProjectConfig,
    registry: DispatchRegistry,
    items: Arc<dyn ItemSource>,
    engine: Arc<TraceabilityEngine>,
    queue: VecDeque<String>,
    stats: CompilerStats,
}

/// Result of generating a single document
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub document_id: String,
    pub title: String,
    pub template: Option<PathBuf>,
    /// Generated text, absent when the document failed
    pub text: Option<String>,
    pub passes: usize,
    pub converged: bool,
    pub diagnostics: Vec<ProcessDiagnostic>,
    pub error: Option<TraceDocError>,
}

impl GenerateResult {
    fn new(document: &DocumentConfig, template: Option<PathBuf>) -> Self {
        GenerateResult {
            document_id: document.id.clone(),
            title: document.title.clone(),
            template,
            text: None,
            passes: 0,
            converged: false,
            diagnostics: Vec::new(),
            error: None,
        }
    }

    fn succeeded(mut self, text: String, outcome: ResolveOutcome) -> Self {
        self.text = Some(text);
        self.passes = outcome.passes;
        self.converged = outcome.converged;
        self.diagnostics = outcome.diagnostics;
        self
    }

    fn failed(mut self, error: TraceDocError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Output file name: the template's file name, or the document id.
    pub fn file_name(&self) -> String {
        self.template
            .as_ref()
            .and_then(|t| t.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.txt", self.document_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerStats {
    pub queued: usize,
    pub generated: usize,
    pub failed: usize,
    pub total_passes: usize,
    pub unresolved: usize,
    pub depth_limited: usize,
}

impl DocumentCompiler {
    /// Create a compiler for `config`, recording the data provider's own item links.
    pub fn new(
        config: ProjectConfig,
        registry: DispatchRegistry,
        items: Arc<dyn ItemSource>,
    ) -> Result<Self, TraceDocError> {
        let engine = config.engine()?;
        let recorded = engine.record_item_links(items.as_ref());
        let queue: VecDeque<String> = config
            .documents
            .values()
            .filter(|d| d.template.is_some())
            .map(|d| d.id.clone())
            .collect();
        tracing::info!(
            "[Compiler] {} documents queued, {} item links recorded",
            queue.len(),
            recorded
        );
        let stats = CompilerStats {
            queued: queue.len(),
            ..Default::default()
        };
        Ok(DocumentCompiler {
            config,
            registry,
            items,
            engine: Arc::new(engine),
            queue,
            stats,
        })
    }

    /// Load a project file and its item file, with the built-in creators.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, TraceDocError> {
        let config = ProjectConfig::load(path)?;
        let mut items = match &config.items {
            Some(path) => ItemCatalog::load(path)?,
            None => ItemCatalog::new(),
        };
        items.normalize(&config.entity_catalog()?)?;
        Self::new(config, DispatchRegistry::with_builtins(), Arc::new(items))
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<TraceabilityEngine> {
        &self.engine
    }

    pub fn items(&self) -> &dyn ItemSource {
        self.items.as_ref()
    }

    pub fn stats(&self) -> CompilerStats {
        self.stats
    }

    /// Resolve an already parsed document, e.g. a [`crate::document::ControlDocument`]
    /// supplied by a host.
    pub fn generate_document(
        &self,
        config: &DocumentConfig,
        document: &mut dyn TemplateDocument,
    ) -> Result<ResolveOutcome, TraceDocError> {
        let state = DocumentState::new();
        let ctx = CreatorContext::new(
            config,
            &self.config,
            &self.engine,
            self.items.as_ref(),
            &state,
        );
        resolve_document(document, &self.registry, &ctx)
    }

    /// Generate `config` from template text. Safe to call from several threads at once.
    pub fn generate_source(&self, config: &DocumentConfig, source: &str) -> GenerateResult {
        let result = GenerateResult::new(config, self.config.template_path(config));
        let generated = TextDocument::from_string(&config.title, source).and_then(|mut document| {
            let outcome = self.generate_document(config, &mut document)?;
            Ok((document.to_text(), outcome))
        });
        match generated {
            Ok((text, outcome)) => result.succeeded(text, outcome),
            Err(e) => result.failed(e),
        }
    }

    /// Generate the next queued document, or `None` when the queue is empty.
    pub fn generate_next(&mut self) -> Option<GenerateResult> {
        let id = self.queue.pop_front()?;
        let config = self.config.documents.get(&id)?.clone();
        tracing::info!("[Compiler] generating {} ({})", config.title, config.id);

        let result = match self.config.template_path(&config) {
            Some(path) => match get_content(&path) {
                Ok(source) => self.generate_source(&config, &source),
                Err(e) => GenerateResult::new(&config, Some(path)).failed(e),
            },
            None => GenerateResult::new(&config, None).failed(TraceDocError::NotFound(format!(
                "document {} has no template",
                config.id
            ))),
        };

        match &result.error {
            None => {
                self.stats.generated += 1;
                self.stats.total_passes += result.passes;
                self.stats.unresolved += result
                    .diagnostics
                    .iter()
                    .filter(|d| d.is_unresolved_directive())
                    .count();
                if !result.converged {
                    self.stats.depth_limited += 1;
                }
            }
            Some(e) => {
                tracing::warn!("[Compiler] {} failed: {e}", config.title);
                self.stats.failed += 1;
            }
        }
        Some(result)
    }

    pub fn generate_all(&mut self) -> Vec<GenerateResult> {
        let mut results = Vec::new();
        while let Some(result) = self.generate_next() {
            results.push(result);
        }
        tracing::info!(
            "[Compiler] generated {} documents, {} failed",
            self.stats.generated,
            self.stats.failed
        );
        results
    }

    /// Write successful results into the configured output directory.
    pub fn write_results(&self, results: &[GenerateResult]) -> Result<Vec<PathBuf>, TraceDocError> {
        self.write_results_to(results, &self.config.output_dir)
    }

    pub fn write_results_to(
        &self,
        results: &[GenerateResult],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, TraceDocError> {
        let mut written = Vec::new();
        for result in results {
            if let Some(text) = &result.text {
                let path = dir.join(result.file_name());
                set_content(&path, text)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    pub fn matrix(&self, truth: &str) -> Result<TraceMatrix, TraceDocError> {
        self.engine.matrix(truth, self.items.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::{ControlDocument, Segment},
        items::Item,
    };
    use std::thread;

    const PROJECT: &str = r#"
[truth.SystemRequirement]
name = "System Requirement"
abbreviation = "SYS"

[documents.Plan]
title = "Plan"
abbreviation = "PL"
template = "plan.txt"

[documents.Report]
title = "Report"
abbreviation = "RE"
template = "report.txt"

[documents.Archive]
title = "Archive"
abbreviation = "AR"
"#;

    fn compiler() -> DocumentCompiler {
        let config = ProjectConfig::from_toml_str(PROJECT).unwrap();
        let items = ItemCatalog::new()
            .with_item(Item::new("SYS-1", "SystemRequirement"))
            .with_item(Item::new("SYS-2", "SystemRequirement"));
        DocumentCompiler::new(config, DispatchRegistry::with_builtins(), Arc::new(items)).unwrap()
    }

    #[test]
    fn test_queue_skips_documents_without_template() {
        let compiler = compiler();
        assert_eq!(compiler.stats().queued, 2);
    }

    #[test]
    fn test_missing_templates_reported_per_document() {
        let mut compiler = compiler();
        let results = compiler.generate_all();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_ok()));
        assert!(matches!(results[0].error, Some(TraceDocError::NotFound(_))));
        assert_eq!(compiler.stats().failed, 2);
        assert!(compiler.generate_next().is_none());
    }

    #[test]
    fn test_generate_source_and_control_document() {
        let compiler = compiler();
        let plan = compiler.config().document("Plan").unwrap().clone();
        let result = compiler.generate_source(&plan, "@@Trace:SYS(id=SYS-1)@@");
        assert_eq!(result.text.as_deref(), Some("(SYS-1)"));
        assert_eq!(result.file_name(), "plan.txt");

        let report = compiler.config().document("Report").unwrap().clone();
        let mut document = ControlDocument::new(
            "Report",
            vec![Segment::control("c1", "Trace:SYS(id=SYS-2)", "")],
        )
        .unwrap();
        let outcome = compiler.generate_document(&report, &mut document).unwrap();
        assert!(outcome.converged);
        assert_eq!(document.control_contents("c1"), Some("(SYS-2)"));

        let matrix = compiler.matrix("SYS").unwrap();
        assert_eq!(matrix.cell("SYS-1", "Plan").unwrap().ids(), &["SYS-1".to_string()]);
        assert_eq!(matrix.cell("SYS-2", "Report").unwrap().ids(), &["SYS-2".to_string()]);
    }

    #[test]
    fn test_grammar_error_reported_in_result() {
        let compiler = compiler();
        let plan = compiler.config().document("Plan").unwrap().clone();
        let result = compiler.generate_source(&plan, "@@@SLMS:SYS()\nno closer");
        assert!(result.text.is_none());
        assert!(matches!(result.error, Some(TraceDocError::Grammar(_))));
    }

    #[test]
    fn test_documents_generate_concurrently() {
        let compiler = compiler();
        let plan = compiler.config().document("Plan").unwrap().clone();
        let report = compiler.config().document("Report").unwrap().clone();
        let (a, b) = thread::scope(|scope| {
            let a = scope.spawn(|| compiler.generate_source(&plan, "@@@SLMS:SYS()\n@@@\n"));
            let b = scope.spawn(|| compiler.generate_source(&report, "@@SLMS:SYS(id=SYS-2)@@"));
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(a.text.as_deref(), Some("SYS-1\nSYS-2\n"));
        assert_eq!(b.text.as_deref(), Some("SYS-2"));
        assert_eq!(compiler.engine().link_count(), 3);
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = compiler();
        let plan = compiler.config().document("Plan").unwrap().clone();
        let ok = compiler.generate_source(&plan, "Title: @@Document:Title()@@\n");
        let failed = compiler.generate_source(&plan, "@@Nope:x()@@");
        let written = compiler
            .write_results_to(&[ok, failed], &dir.path().join("out"))
            .unwrap();
        assert_eq!(written, vec![dir.path().join("out").join("plan.txt")]);
        assert_eq!(
            std::fs::read_to_string(&written[0]).unwrap(),
            "Title: Plan\n"
        );
    }
}
