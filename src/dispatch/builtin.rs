//! Built-in content creators.
//!
//! | Directive | Content |
//! |---|---|
//! | `Comment:*` | nothing, the region is dropped |
//! | `Document:Title` / `Abbreviation` / `Identifier` / `Template` / `Id` | property of the enclosing document |
//! | `Document:CountEntities(entity=X[,restart=true])` | items of `X` listed so far in this document |
//! | `Ref:<document>(title=true,abbr=true,id=true,template=true)` | properties of another document |
//! | `Config:<key>` | entry of the project's `[values]` table |
//! | `Post:TOC` / `PageBreak` / `RemoveParagraph` | post-processing markers for renderers |
//! | `SLMS:<entity>(category=..,id=..)` | listing of truth items, recording trace links |
//! | `SLMS:TraceabilityMatrix(truth=X)` | current trace matrix of `X` |
//! | `File:<path>` | contents of a file inside the template directory |
//!
//! `Trace` directives are handled by the pipeline itself.

use std::path::{Component, Path};

use super::{creation_error, CreatorContext, DispatchRegistry};
use crate::{
    config::get_content,
    error::TraceDocError,
    tag::{DataSource, Tag},
    trace::{EntityKind, TraceLink},
};

pub const TOC_MARKER: &str = "~TOC";
pub const PAGE_BREAK_MARKER: &str = "~PAGEBREAK";
pub const REMOVE_PARAGRAPH_MARKER: &str = "~REMOVEPARAGRAPH";

pub fn register(registry: DispatchRegistry) -> DispatchRegistry {
    registry
        .register_source(DataSource::Comment, comment)
        .register(DataSource::Document, "Title", document_property)
        .register(DataSource::Document, "Abbreviation", document_property)
        .register(DataSource::Document, "Identifier", document_property)
        .register(DataSource::Document, "Template", document_property)
        .register(DataSource::Document, "Id", document_property)
        .register(DataSource::Document, "CountEntities", count_entities)
        .register_source(DataSource::Reference, reference)
        .register_source(DataSource::Config, config_value)
        .register(DataSource::Post, "TOC", post_marker)
        .register(DataSource::Post, "PageBreak", post_marker)
        .register(DataSource::Post, "RemoveParagraph", post_marker)
        .register(DataSource::Slms, "TraceabilityMatrix", traceability_matrix)
        .register_source(DataSource::Slms, item_listing)
        .register_source(DataSource::File, file_contents)
}

fn comment(_tag: &Tag, _ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    Ok(String::new())
}

fn document_property(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let document = ctx.document;
    let value = match tag.directive().to_uppercase().as_str() {
        "TITLE" => document.title.clone(),
        "ABBREVIATION" => document.abbreviation.clone(),
        "IDENTIFIER" => document.identifier.clone(),
        "TEMPLATE" => document.template.clone().unwrap_or_default(),
        "ID" => document.id.clone(),
        other => return Err(creation_error(format!("no document property '{other}'"))),
    };
    Ok(value)
}

fn count_entities(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let alias = tag
        .parameter("entity")
        .ok_or_else(|| creation_error("missing \"entity\" parameter"))?;
    let entity = ctx.engine.catalog().require(alias)?;
    if tag.parameters().flag("restart") {
        ctx.state.reset_entity_count(&entity.id);
        return Ok(String::new());
    }
    Ok(ctx.state.entity_count(&entity.id).to_string())
}

fn reference(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let referenced = ctx.project.document(tag.directive()).ok_or_else(|| {
        creation_error(format!("no document '{}' is configured", tag.directive()))
    })?;

    let mut parts = Vec::new();
    for (key, value) in tag.parameters().iter() {
        if !value.eq_ignore_ascii_case("true") {
            continue;
        }
        let part = match key {
            "TITLE" => referenced.title.clone(),
            "ABBR" => referenced.abbreviation.clone(),
            "ID" => referenced.identifier.clone(),
            "TEMPLATE" => referenced.template.clone().unwrap_or_default(),
            other => {
                return Err(creation_error(format!(
                    "unknown reference parameter '{other}'"
                )))
            }
        };
        parts.push(part);
    }
    if parts.is_empty() {
        parts.push(referenced.title.clone());
    }

    ctx.record_link(
        TraceLink::new(
            &ctx.document.id,
            &ctx.document.id,
            &referenced.id,
            &referenced.id,
        )
        .in_document(&ctx.document.id),
    )?;
    Ok(parts.join(" "))
}

fn config_value(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    ctx.project.value(tag.directive()).ok_or_else(|| {
        creation_error(format!("no value configured for '{}'", tag.directive()))
    })
}

fn post_marker(tag: &Tag, _ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let marker = match tag.directive().to_uppercase().as_str() {
        "TOC" => TOC_MARKER,
        "PAGEBREAK" => PAGE_BREAK_MARKER,
        _ => REMOVE_PARAGRAPH_MARKER,
    };
    Ok(marker.to_string())
}

/// One line per item, `ID: Title`. Each listed item is traced to the enclosing document.
fn item_listing(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let entity = ctx.engine.catalog().require(tag.directive())?;
    if entity.kind != EntityKind::Truth {
        return Err(creation_error(format!(
            "'{}' is a document, not an item type",
            entity.id
        )));
    }

    let mut items = ctx.items.items(&entity.id);
    if let Some(category) = tag.parameter("category") {
        items.retain(|item| item.in_category(category));
    }
    if let Some(id) = tag.parameter("id") {
        items.retain(|item| item.id == id);
        if items.is_empty() {
            return Err(creation_error(format!("no {} item '{id}'", entity.name)));
        }
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        ctx.record_link(
            TraceLink::new(&entity.id, &item.id, &ctx.document.id, &item.id)
                .in_document(&ctx.document.id),
        )?;
        if item.title.is_empty() {
            lines.push(item.id.clone());
        } else {
            lines.push(format!("{}: {}", item.id, item.title));
        }
    }
    ctx.state.add_entities(&entity.id, items.len());
    tracing::debug!(
        "[Dispatch] listed {} {} items in {}",
        items.len(),
        entity.id,
        ctx.document.id
    );
    Ok(lines.join("\n"))
}

fn traceability_matrix(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let truth = tag
        .parameter("truth")
        .ok_or_else(|| creation_error("missing \"truth\" parameter"))?;
    let pending = ctx.state.staged_links();
    Ok(ctx
        .engine
        .matrix_with(truth, ctx.items, &pending)?
        .to_string())
}

/// Inserts a file from the template directory verbatim. Directives in the file are resolved
/// in the following pass. Paths must stay inside the template directory.
fn file_contents(tag: &Tag, ctx: &CreatorContext<'_>) -> Result<String, TraceDocError> {
    let relative = Path::new(tag.directive());
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(creation_error(format!(
            "'{}' is not a path inside the template directory",
            tag.directive()
        )));
    }
    let path = ctx.project.template_dir.join(relative);
    get_content(&path)
        .map(|content| content.replace("\r\n", "\n"))
        .map_err(|e| creation_error(format!("cannot read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DocumentConfig, ProjectConfig},
        dispatch::DocumentState,
        items::{Item, ItemCatalog},
        tag::{TagAnchor, TagForm},
        trace::TraceabilityEngine,
    };

    const PROJECT: &str = r#"
[truth.SystemRequirement]
name = "System Requirement"
abbreviation = "SYS"

[documents.SystemRequirementsSpecification]
title = "System Requirements Specification"
abbreviation = "SysRS"
identifier = "DOC-7"
template = "sysrs.adoc"

[documents.TestPlan]
title = "Test Plan"
abbreviation = "TP"

[values]
CompanyName = "Acme"
"#;

    struct Fixture {
        project: ProjectConfig,
        engine: TraceabilityEngine,
        items: ItemCatalog,
        state: DocumentState,
        registry: DispatchRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let project = ProjectConfig::from_toml_str(PROJECT).unwrap();
            let engine = project.engine().unwrap();
            let items = ItemCatalog::new()
                .with_item(
                    Item::new("SYS-1", "SystemRequirement")
                        .with_title("Power on")
                        .with_category("Safety"),
                )
                .with_item(Item::new("SYS-2", "SystemRequirement").with_title("Log events"));
            Fixture {
                project,
                engine,
                items,
                state: DocumentState::new(),
                registry: DispatchRegistry::with_builtins(),
            }
        }

        fn document(&self) -> &DocumentConfig {
            self.project.document("SysRS").unwrap()
        }

        fn create(&self, raw: &str) -> Result<String, TraceDocError> {
            let tag = Tag::parse(raw, "", TagForm::Inline, TagAnchor::Control("c".into()))?;
            let ctx = CreatorContext::new(
                self.document(),
                &self.project,
                &self.engine,
                &self.items,
                &self.state,
            );
            let creator = self
                .registry
                .lookup(tag.source(), tag.directive())
                .ok_or_else(|| creation_error("unregistered"))?;
            let content = creator.create(&tag, &ctx)?;
            self.engine.commit(self.state.take_links());
            Ok(content)
        }
    }

    #[test]
    fn test_document_properties() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.create("Document:Title()").unwrap(),
            "System Requirements Specification"
        );
        assert_eq!(fixture.create("document:abbreviation").unwrap(), "SysRS");
        assert_eq!(fixture.create("Document:Identifier()").unwrap(), "DOC-7");
        assert_eq!(fixture.create("Document:Template()").unwrap(), "sysrs.adoc");
        assert_eq!(
            fixture.create("Document:Id()").unwrap(),
            "SystemRequirementsSpecification"
        );
        assert!(fixture
            .registry
            .lookup(DataSource::Document, "Bogus")
            .is_none());
    }

    #[test]
    fn test_comment_and_post() {
        let fixture = Fixture::new();
        assert_eq!(fixture.create("Comment:anything(a=b)").unwrap(), "");
        assert_eq!(fixture.create("Post:TOC()").unwrap(), TOC_MARKER);
        assert_eq!(fixture.create("Post:pagebreak()").unwrap(), PAGE_BREAK_MARKER);
        assert!(fixture.registry.lookup(DataSource::Post, "Other").is_none());
    }

    #[test]
    fn test_config_value() {
        let fixture = Fixture::new();
        assert_eq!(fixture.create("Config:CompanyName()").unwrap(), "Acme");
        let err = fixture.create("Config:Nope()").unwrap_err();
        assert!(matches!(err, TraceDocError::Dispatch { .. }));
    }

    #[test]
    fn test_item_listing_records_links_and_counts() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.create("SLMS:SYS()").unwrap(),
            "SYS-1: Power on\nSYS-2: Log events"
        );
        assert_eq!(
            fixture.create("SLMS:SystemRequirement(category=safety)").unwrap(),
            "SYS-1: Power on"
        );
        assert_eq!(fixture.engine.link_count(), 3);
        assert_eq!(
            fixture.create("Document:CountEntities(entity=SYS)").unwrap(),
            "3"
        );
        assert_eq!(
            fixture
                .create("Document:CountEntities(entity=SYS,restart=true)")
                .unwrap(),
            ""
        );
        assert_eq!(
            fixture.create("Document:CountEntities(entity=SYS)").unwrap(),
            "0"
        );

        let matrix = fixture
            .engine
            .matrix("SystemRequirement", &fixture.items)
            .unwrap();
        assert_eq!(
            matrix.cell("SYS-1", "SysRS").unwrap().ids(),
            &["SYS-1".to_string()]
        );
    }

    #[test]
    fn test_item_listing_errors() {
        let fixture = Fixture::new();
        assert!(matches!(
            fixture.create("SLMS:Anomaly()").unwrap_err(),
            TraceDocError::UnknownEntity(_)
        ));
        assert!(matches!(
            fixture.create("SLMS:TestPlan()").unwrap_err(),
            TraceDocError::Dispatch { .. }
        ));
        assert!(fixture.create("SLMS:SYS(id=SYS-9)").is_err());
    }

    #[test]
    fn test_reference() {
        let fixture = Fixture::new();
        assert_eq!(fixture.create("Ref:TP()").unwrap(), "Test Plan");
        assert_eq!(
            fixture.create("Ref:SysRS(abbr=true,id=true)").unwrap(),
            "SysRS DOC-7"
        );
        assert!(fixture.create("Ref:TP(color=true)").is_err());
        assert!(fixture.create("Ref:Unknown()").is_err());

        let links = fixture.engine.links_for_document("TestPlan");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, "SystemRequirementsSpecification");
    }

    #[test]
    fn test_file_contents_stay_in_template_dir() {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(templates.join("parts")).unwrap();
        std::fs::write(templates.join("parts").join("note.txt"), "hello\r\nworld").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();

        let mut fixture = Fixture::new();
        fixture.project.template_dir = templates.clone();
        assert_eq!(
            fixture.create("File:parts/note.txt()").unwrap(),
            "hello\nworld"
        );
        assert_eq!(
            fixture.create("File:./parts/note.txt()").unwrap(),
            "hello\nworld"
        );

        for raw in ["File:../secret.txt()", "File:parts/../../secret.txt()"] {
            match fixture.create(raw).unwrap_err() {
                TraceDocError::Dispatch { reason, .. } => {
                    assert!(reason.contains("not a path inside"), "{raw}: {reason}")
                }
                other => panic!("{raw}: expected dispatch error, got {other:?}"),
            }
        }
        let absolute = format!("File:{}()", dir.path().join("secret.txt").display());
        assert!(fixture.create(&absolute).is_err());
        assert!(fixture.create("File:missing.txt()").is_err());
    }

    #[test]
    fn test_traceability_matrix_output() {
        let fixture = Fixture::new();
        fixture.create("SLMS:SYS(id=SYS-2)").unwrap();
        let table = fixture
            .create("SLMS:TraceabilityMatrix(truth=SYS)")
            .unwrap();
        assert!(table.contains("| SYS-1 | MISSING |"));
        assert!(table.contains("| SYS-2 | SYS-2 |"));
        assert!(fixture.create("SLMS:TraceabilityMatrix()").is_err());
    }
}
