//! Shared test utilities for resolution tests

use crate::{
    config::ProjectConfig,
    dispatch::{CreatorContext, DispatchRegistry, DocumentState},
    document::TemplateDocument,
    error::TraceDocError,
    items::{Item, ItemCatalog, ItemLinkKind},
    pipeline::{resolve_document, ResolveOutcome},
    trace::TraceabilityEngine,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub const TEST_PROJECT: &str = r#"
output_format = "asciidoc"

[truth.SystemRequirement]
name = "System Requirement"
abbreviation = "SYS"

[truth.SoftwareRequirement]
name = "Software Requirement"
abbreviation = "SWR"

[documents.SoftwareRequirementsSpecification]
title = "Software Requirements Specification"
abbreviation = "SRS"
identifier = "DOC-100"

[documents.VerificationPlan]
title = "Verification Plan"
abbreviation = "VP"

[trace.SystemRequirement]
SoftwareRequirement = "complete"
VerificationPlan = "optional"

[values]
CompanyName = "Acme Medical"
Intro = "Issued by @@Config:CompanyName()@@"
"#;

/// Two system requirements, one refined by a software requirement.
pub fn create_test_items() -> ItemCatalog {
    ItemCatalog::new()
        .with_item(
            Item::new("SYS-1", "SystemRequirement")
                .with_title("Alarm on occlusion")
                .with_category("Safety")
                .with_link("SWR-1", ItemLinkKind::Child),
        )
        .with_item(Item::new("SYS-2", "SystemRequirement").with_title("Battery status"))
        .with_item(
            Item::new("SWR-1", "SoftwareRequirement")
                .with_title("Pressure monitor")
                .with_url("https://tracker.example/SWR-1"),
        )
}

/// A project, its engine and items, ready to resolve documents.
pub struct Harness {
    pub project: ProjectConfig,
    pub engine: TraceabilityEngine,
    pub items: ItemCatalog,
    pub registry: DispatchRegistry,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let project = ProjectConfig::from_toml_str(TEST_PROJECT).unwrap();
        let engine = project.engine().unwrap();
        let items = create_test_items();
        engine.record_item_links(&items);
        Harness {
            project,
            engine,
            items,
            registry: DispatchRegistry::with_builtins(),
        }
    }

    pub fn with_registry(mut self, registry: DispatchRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Resolve `document` as the document configured under `alias`.
    pub fn resolve(
        &self,
        alias: &str,
        document: &mut dyn TemplateDocument,
    ) -> Result<ResolveOutcome, TraceDocError> {
        let config = self
            .project
            .document(alias)
            .ok_or_else(|| TraceDocError::UnknownEntity(alias.to_string()))?;
        let state = DocumentState::new();
        let ctx = CreatorContext::new(config, &self.project, &self.engine, &self.items, &state);
        resolve_document(document, &self.registry, &ctx)
    }
}
