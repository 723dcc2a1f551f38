//! Traceability model: entity catalog, recorded links, expectations and detected issues.
//!
//! The [`engine::TraceabilityEngine`] owns the link table for one run and derives matrices and
//! issues from it on request.

pub mod engine;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TraceDocError;

pub use engine::{MatrixRow, TraceCell, TraceMatrix, TraceabilityEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Tracked item type supplied by a data provider
    Truth,
    /// A generated document that references truth items
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntity {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub kind: EntityKind,
}

impl TraceEntity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        abbreviation: impl Into<String>,
        kind: EntityKind,
    ) -> Self {
        TraceEntity {
            id: id.into(),
            name: name.into(),
            abbreviation: abbreviation.into(),
            kind,
        }
    }

    pub fn answers_to(&self, alias: &str) -> bool {
        let alias = alias.trim();
        self.id.eq_ignore_ascii_case(alias)
            || self.name.eq_ignore_ascii_case(alias)
            || self.abbreviation.eq_ignore_ascii_case(alias)
    }
}

impl fmt::Display for TraceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.abbreviation)
    }
}

/// The run's entity catalog, resolved by id, display name or abbreviation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCatalog {
    entities: IndexMap<String, TraceEntity>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        EntityCatalog::default()
    }

    /// Add an entity. Every alias of the new entity must be unused by earlier entities.
    pub fn register(&mut self, entity: TraceEntity) -> Result<(), TraceDocError> {
        for alias in [&entity.id, &entity.name, &entity.abbreviation] {
            if let Some(existing) = self.resolve(alias) {
                return Err(TraceDocError::Config(format!(
                    "Trace entity '{}' reuses the name or abbreviation '{alias}' of '{}'",
                    entity.id, existing.id
                )));
            }
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn resolve(&self, alias: &str) -> Option<&TraceEntity> {
        self.entities
            .get(alias)
            .or_else(|| self.entities.values().find(|e| e.answers_to(alias)))
    }

    /// Like [`EntityCatalog::resolve`], failing with [`TraceDocError::UnknownEntity`].
    pub fn require(&self, alias: &str) -> Result<&TraceEntity, TraceDocError> {
        self.resolve(alias)
            .ok_or_else(|| TraceDocError::UnknownEntity(alias.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntity> {
        self.entities.values()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &TraceEntity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// A recorded edge `(source, source_id) -> (target, target_id)`.
///
/// Entities are stored by canonical id. `document` names the document entity the link was
/// recorded while generating, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceLink {
    pub source: String,
    pub source_id: String,
    pub target: String,
    pub target_id: String,
    pub document: Option<String>,
}

impl TraceLink {
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        target: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        TraceLink {
            source: source.into(),
            source_id: source_id.into(),
            target: target.into(),
            target_id: target_id.into(),
            document: None,
        }
    }

    pub fn in_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// If one end of this link is `(entity, _)`, the other end.
    pub fn counterpart(&self, entity: &str) -> Option<(&str, &str, &str)> {
        if self.source == entity {
            Some((
                self.source_id.as_str(),
                self.target.as_str(),
                self.target_id.as_str(),
            ))
        } else if self.target == entity {
            Some((
                self.target_id.as_str(),
                self.source.as_str(),
                self.source_id.as_str(),
            ))
        } else {
            None
        }
    }
}

impl fmt::Display for TraceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_id, self.target, self.target_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceIssueKind {
    Missing,
    Extra,
    PossiblyMissing,
    PossiblyExtra,
    Incorrect,
}

impl fmt::Display for TraceIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TraceIssueKind::Missing => "Missing",
            TraceIssueKind::Extra => "Extra",
            TraceIssueKind::PossiblyMissing => "Possibly missing",
            TraceIssueKind::PossiblyExtra => "Possibly extra",
            TraceIssueKind::Incorrect => "Incorrect",
        };
        f.write_str(label)
    }
}

/// A detected inconsistency between the recorded links and the expected structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceIssue {
    pub kind: TraceIssueKind,
    /// Entity on the referencing side
    pub source: String,
    /// The truth entity of the matrix
    pub target: String,
    pub item_id: String,
}

impl fmt::Display for TraceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TraceIssueKind::Missing | TraceIssueKind::PossiblyMissing => write!(
                f,
                "{}: {} item {} has no trace to {}",
                self.kind, self.target, self.item_id, self.source
            ),
            TraceIssueKind::Extra | TraceIssueKind::PossiblyExtra => write!(
                f,
                "{}: {} traces to {} which is not a {} item",
                self.kind, self.source, self.item_id, self.target
            ),
            TraceIssueKind::Incorrect => write!(
                f,
                "{}: {} traces to {} as a {} item, but it belongs to another entity",
                self.kind, self.source, self.item_id, self.target
            ),
        }
    }
}

/// How strongly one entity is expected to trace to a truth entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExpectation", into = "RawExpectation")]
pub enum TraceExpectation {
    /// Every truth item must be traced
    Complete,
    /// Tracing is advisory
    Optional,
    /// Only truth items in one of these categories must be traced
    Categories(Vec<String>),
}

impl TraceExpectation {
    /// Whether a missing trace from `item` is structural, advisory, or not expected at all.
    pub fn missing_kind(&self, category: Option<&str>) -> Option<TraceIssueKind> {
        match self {
            TraceExpectation::Complete => Some(TraceIssueKind::Missing),
            TraceExpectation::Optional => Some(TraceIssueKind::PossiblyMissing),
            TraceExpectation::Categories(categories) => category
                .filter(|c| categories.iter().any(|x| x.eq_ignore_ascii_case(c)))
                .map(|_| TraceIssueKind::Missing),
        }
    }

    pub fn extra_kind(&self) -> TraceIssueKind {
        match self {
            TraceExpectation::Optional => TraceIssueKind::PossiblyExtra,
            _ => TraceIssueKind::Extra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawExpectation {
    Keyword(String),
    Categories(Vec<String>),
}

impl TryFrom<RawExpectation> for TraceExpectation {
    type Error = String;

    fn try_from(raw: RawExpectation) -> Result<Self, Self::Error> {
        match raw {
            RawExpectation::Keyword(word) => match word.trim().to_ascii_lowercase().as_str() {
                "" | "all" | "complete" => Ok(TraceExpectation::Complete),
                "optional" => Ok(TraceExpectation::Optional),
                other => Err(format!(
                    "unknown trace expectation '{other}', expected \"complete\", \"optional\" or a list of categories"
                )),
            },
            RawExpectation::Categories(categories) => {
                Ok(TraceExpectation::Categories(categories))
            }
        }
    }
}

impl From<TraceExpectation> for RawExpectation {
    fn from(expectation: TraceExpectation) -> Self {
        match expectation {
            TraceExpectation::Complete => RawExpectation::Keyword("complete".to_string()),
            TraceExpectation::Optional => RawExpectation::Keyword("optional".to_string()),
            TraceExpectation::Categories(c) => RawExpectation::Categories(c),
        }
    }
}
