//! Project configuration.
//!
//! A project is described by one TOML file naming the truth entities, the documents to
//! generate, the trace expectations between them, and free-form values for `Config`
//! directives. Tables keep their declaration order, which drives document generation order
//! and matrix column order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

use crate::{
    error::TraceDocError,
    trace::{EntityCatalog, EntityKind, TraceEntity, TraceExpectation, TraceabilityEngine},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
    Asciidoc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruthConfig {
    pub name: String,
    pub abbreviation: String,
}

/// A document of the project: either generated from a template, or a trace target only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Key of the `[documents.*]` table; doubles as the document's trace entity id
    #[serde(skip)]
    pub id: String,
    pub title: String,
    pub abbreviation: String,
    #[serde(default)]
    pub identifier: String,
    /// Template file name, relative to the template directory
    #[serde(default)]
    pub template: Option<String>,
}

impl DocumentConfig {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        abbreviation: impl Into<String>,
    ) -> Self {
        DocumentConfig {
            id: id.into(),
            title: title.into(),
            abbreviation: abbreviation.into(),
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// JSON item file used as the local data provider
    #[serde(default)]
    pub items: Option<PathBuf>,
    #[serde(default)]
    pub truth: IndexMap<String, TruthConfig>,
    #[serde(default)]
    pub documents: IndexMap<String, DocumentConfig>,
    /// truth entity -> other entity -> expectation
    #[serde(default)]
    pub trace: IndexMap<String, IndexMap<String, TraceExpectation>>,
    #[serde(default)]
    pub values: IndexMap<String, toml::Value>,
}

impl ProjectConfig {
    /// Parse a configuration. Relative paths stay relative; see [`ProjectConfig::load`].
    pub fn from_toml_str(content: &str) -> Result<Self, TraceDocError> {
        let mut config: ProjectConfig = toml::from_str(content)?;
        for (id, document) in config.documents.iter_mut() {
            document.id = id.clone();
        }
        // Surfaces duplicate aliases and dangling trace declarations early.
        config.engine()?;
        Ok(config)
    }

    /// Read a configuration file, resolving its relative paths against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TraceDocError> {
        let path = path.as_ref();
        let mut config = Self::from_toml_str(&get_content(path)?)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.template_dir = root.join(&config.template_dir);
        config.output_dir = root.join(&config.output_dir);
        config.items = config.items.as_ref().map(|items| root.join(items));
        tracing::debug!(
            "[Config] loaded {} documents and {} truth entities from {:?}",
            config.documents.len(),
            config.truth.len(),
            path
        );
        Ok(config)
    }

    pub fn entity_catalog(&self) -> Result<EntityCatalog, TraceDocError> {
        let mut catalog = EntityCatalog::new();
        for (id, truth) in &self.truth {
            catalog.register(TraceEntity::new(
                id,
                &truth.name,
                &truth.abbreviation,
                EntityKind::Truth,
            ))?;
        }
        for (id, document) in &self.documents {
            catalog.register(TraceEntity::new(
                id,
                &document.title,
                &document.abbreviation,
                EntityKind::Document,
            ))?;
        }
        Ok(catalog)
    }

    /// A fresh traceability engine with this project's entities and expectations.
    pub fn engine(&self) -> Result<TraceabilityEngine, TraceDocError> {
        let mut engine = TraceabilityEngine::new(self.entity_catalog()?);
        for (truth, others) in &self.trace {
            for (other, expectation) in others {
                engine
                    .expect(truth, other, expectation.clone())
                    .map_err(|e| {
                        TraceDocError::Config(format!("[trace.{truth}] entry '{other}': {e}"))
                    })?;
            }
        }
        Ok(engine)
    }

    /// Look a document up by id, title or abbreviation.
    pub fn document(&self, alias: &str) -> Option<&DocumentConfig> {
        let alias = alias.trim();
        self.documents.get(alias).or_else(|| {
            self.documents.values().find(|d| {
                d.id.eq_ignore_ascii_case(alias)
                    || d.title.eq_ignore_ascii_case(alias)
                    || d.abbreviation.eq_ignore_ascii_case(alias)
            })
        })
    }

    pub fn template_path(&self, document: &DocumentConfig) -> Option<PathBuf> {
        document
            .template
            .as_ref()
            .map(|template| self.template_dir.join(template))
    }

    /// A `[values]` entry rendered as text. Keys match case-insensitively.
    pub fn value(&self, key: &str) -> Option<String> {
        let value = self.values.get(key).or_else(|| {
            self.values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })?;
        Some(match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

pub fn get_content<P: AsRef<Path>>(path: P) -> Result<String, TraceDocError> {
    tracing::debug!("Reading {:?}", path.as_ref());
    Ok(read_to_string(path)?)
}

pub fn set_content<P: AsRef<Path>>(path: P, text: &str) -> Result<(), TraceDocError> {
    if let Some(parent) = path.as_ref().parent() {
        create_dir_all(parent)?;
    }
    tracing::debug!("Writing {:?}", path.as_ref());
    Ok(write(path, text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
output_format = "html"
items = "items.json"

[truth.SystemRequirement]
name = "System Requirement"
abbreviation = "SYS"

[truth.SoftwareRequirement]
name = "Software Requirement"
abbreviation = "SWR"

[documents.SoftwareRequirementsSpecification]
title = "Software Requirements Specification"
abbreviation = "SRS"
identifier = "DOC-001"
template = "srs.adoc"

[documents.RiskAssessment]
title = "Risk Assessment"
abbreviation = "RA"

[trace.SystemRequirement]
SoftwareRequirement = "complete"
RiskAssessment = "optional"
SRS = ["Safety"]

[values]
CompanyName = "Acme"
Revision = 3
"#;

    #[test]
    fn test_parse_project() {
        let config = ProjectConfig::from_toml_str(PROJECT).unwrap();
        assert_eq!(config.output_format, OutputFormat::Html);
        assert_eq!(config.template_dir, PathBuf::from("templates"));
        assert_eq!(
            config.documents.keys().collect::<Vec<_>>(),
            vec!["SoftwareRequirementsSpecification", "RiskAssessment"]
        );
        let srs = config.document("srs").unwrap();
        assert_eq!(srs.id, "SoftwareRequirementsSpecification");
        assert_eq!(srs.identifier, "DOC-001");
        assert_eq!(
            config.template_path(srs),
            Some(PathBuf::from("templates/srs.adoc"))
        );
        assert!(config.document("Risk Assessment").unwrap().template.is_none());
        assert_eq!(config.value("companyname").as_deref(), Some("Acme"));
        assert_eq!(config.value("Revision").as_deref(), Some("3"));
        assert!(config.value("Missing").is_none());
    }

    #[test]
    fn test_engine_expectations() {
        let config = ProjectConfig::from_toml_str(PROJECT).unwrap();
        let engine = config.engine().unwrap();
        assert_eq!(engine.catalog().len(), 4);
        assert_eq!(
            engine.expectation("SystemRequirement", "RiskAssessment"),
            TraceExpectation::Optional
        );
        assert_eq!(
            engine.expectation("SystemRequirement", "SoftwareRequirementsSpecification"),
            TraceExpectation::Categories(vec!["Safety".to_string()])
        );
    }

    #[test]
    fn test_unknown_trace_entity_rejected() {
        let content = format!("{PROJECT}\n[trace.Anomaly]\nSYS = \"complete\"\n");
        let err = ProjectConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, TraceDocError::Config(_)), "{err:?}");
    }

    #[test]
    fn test_duplicate_abbreviation_rejected() {
        let content = format!("{PROJECT}\n[truth.SafetyRequirement]\nname = \"Safety\"\nabbreviation = \"SRS\"\n");
        let err = ProjectConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, TraceDocError::Config(_)), "{err:?}");
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        set_content(&path, PROJECT).unwrap();
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.template_dir, dir.path().join("templates"));
        assert_eq!(config.output_dir, dir.path().join("output"));
        assert_eq!(config.items, Some(dir.path().join("items.json")));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProjectConfig::load("/nonexistent/project.toml").unwrap_err();
        assert!(matches!(err, TraceDocError::NotFound(_)));
    }
}
