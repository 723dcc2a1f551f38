use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashSet, fmt};

use super::{
    EntityCatalog, EntityKind, TraceEntity, TraceExpectation, TraceIssue, TraceIssueKind,
    TraceLink,
};
use crate::{error::TraceDocError, items::ItemSource};

/// Link table and matrix builder for one generation run.
///
/// Links are only ever appended. Appends go through a single lock so documents may be
/// generated on several threads against one shared engine; matrices are computed from a
/// snapshot of the table and never modify it.
#[derive(Debug)]
pub struct TraceabilityEngine {
    catalog: EntityCatalog,
    /// truth entity id -> other entity id -> expectation
    expectations: IndexMap<String, IndexMap<String, TraceExpectation>>,
    links: Mutex<Vec<TraceLink>>,
}

impl TraceabilityEngine {
    pub fn new(catalog: EntityCatalog) -> Self {
        TraceabilityEngine {
            catalog,
            expectations: IndexMap::new(),
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    /// Declare how `other` is expected to trace to `truth`. Entities without a declaration
    /// that nevertheless record links are treated as [`TraceExpectation::Complete`].
    pub fn expect(
        &mut self,
        truth: &str,
        other: &str,
        expectation: TraceExpectation,
    ) -> Result<(), TraceDocError> {
        let truth = self.catalog.require(truth)?.id.clone();
        let other = self.catalog.require(other)?.id.clone();
        self.expectations
            .entry(truth)
            .or_default()
            .insert(other, expectation);
        Ok(())
    }

    pub fn expectation(&self, truth: &str, other: &str) -> TraceExpectation {
        self.expectations
            .get(truth)
            .and_then(|others| others.get(other))
            .cloned()
            .unwrap_or(TraceExpectation::Complete)
    }

    pub fn record_link(
        &self,
        source: &str,
        source_id: &str,
        target: &str,
        target_id: &str,
    ) -> Result<TraceLink, TraceDocError> {
        self.record(TraceLink::new(source, source_id, target, target_id))
    }

    /// Append a link, canonicalising both entity aliases.
    pub fn record(&self, link: TraceLink) -> Result<TraceLink, TraceDocError> {
        let link = self.canonicalize(link)?;
        tracing::debug!("[Trace] recorded link {link}");
        self.links.lock().push(link.clone());
        Ok(link)
    }

    /// Replace entity and document aliases of `link` by their catalog ids.
    pub fn canonicalize(&self, link: TraceLink) -> Result<TraceLink, TraceDocError> {
        let source = self.catalog.require(&link.source)?.id.clone();
        let target = self.catalog.require(&link.target)?.id.clone();
        let document = link
            .document
            .as_deref()
            .map(|d| self.catalog.require(d).map(|e| e.id.clone()))
            .transpose()?;
        Ok(TraceLink {
            source,
            target,
            document,
            ..link
        })
    }

    /// Append links that were canonicalised while a document was being generated.
    pub fn commit(&self, links: Vec<TraceLink>) -> usize {
        let committed = links.len();
        if committed > 0 {
            tracing::debug!("[Trace] committed {committed} links");
            self.links.lock().extend(links);
        }
        committed
    }

    /// Record every item-to-item link the data provider knows about. Links to items the
    /// provider cannot find are skipped. Returns the number of links recorded.
    pub fn record_item_links(&self, items: &dyn ItemSource) -> usize {
        let mut recorded = 0;
        for entity in self.catalog.of_kind(EntityKind::Truth) {
            for item in items.items(&entity.id) {
                for item_link in &item.links {
                    if !item_link.kind.is_structural() {
                        continue;
                    }
                    let Some(target) = items.item(&item_link.target) else {
                        tracing::warn!(
                            "[Trace] item {} links to unknown item {}",
                            item.id,
                            item_link.target
                        );
                        continue;
                    };
                    let link = TraceLink::new(&entity.id, &item.id, &target.entity, &target.id);
                    match self.record(link) {
                        Ok(_) => recorded += 1,
                        Err(e) => tracing::warn!(
                            "[Trace] item {} links to {} of unregistered entity: {e}",
                            item.id,
                            target.id
                        ),
                    }
                }
            }
        }
        recorded
    }

    /// Snapshot of all links in recording order.
    pub fn links(&self) -> Vec<TraceLink> {
        self.links.lock().clone()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }

    pub fn links_for_document(&self, document: &str) -> Vec<TraceLink> {
        let Some(document) = self.catalog.resolve(document) else {
            return Vec::new();
        };
        self.links
            .lock()
            .iter()
            .filter(|link| {
                link.document.as_deref() == Some(document.id.as_str())
                    || link.target == document.id
            })
            .cloned()
            .collect()
    }

    /// Align every entity tracing to `truth` against the truth items and detect issues.
    ///
    /// Rows follow the provider's order of truth items. Columns are the declared expectations
    /// of `truth` followed by any other entity with a recorded link to it. Within a cell, ids
    /// appear in recording order without duplicates.
    pub fn matrix(
        &self,
        truth: &str,
        items: &dyn ItemSource,
    ) -> Result<TraceMatrix, TraceDocError> {
        self.matrix_with(truth, items, &[])
    }

    /// Like [`Self::matrix`], with `pending` links of the document in progress appended after
    /// the committed ones.
    pub fn matrix_with(
        &self,
        truth: &str,
        items: &dyn ItemSource,
        pending: &[TraceLink],
    ) -> Result<TraceMatrix, TraceDocError> {
        let truth = self.catalog.require(truth)?.clone();
        let links: Vec<TraceLink> = self
            .links
            .lock()
            .iter()
            .chain(pending)
            .filter(|link| link.counterpart(&truth.id).is_some())
            .cloned()
            .collect();

        let mut column_ids: Vec<String> = self
            .expectations
            .get(&truth.id)
            .map(|others| others.keys().cloned().collect())
            .unwrap_or_default();
        for link in &links {
            if let Some((_, other, _)) = link.counterpart(&truth.id) {
                if other != truth.id && !column_ids.iter().any(|c| c == other) {
                    column_ids.push(other.to_string());
                }
            }
        }
        column_ids.retain(|c| c != &truth.id);

        let mut issues = IssueList::default();
        let truth_items = items.items(&truth.id);
        let known: HashSet<&str> = truth_items.iter().map(|i| i.id.as_str()).collect();

        let mut rows = Vec::with_capacity(truth_items.len());
        for item in &truth_items {
            let mut cells = Vec::with_capacity(column_ids.len());
            for column in &column_ids {
                let mut linked: Vec<String> = Vec::new();
                for link in &links {
                    if let Some((truth_id, other, other_id)) = link.counterpart(&truth.id) {
                        if truth_id == item.id
                            && other == column
                            && !linked.iter().any(|l| l == other_id)
                        {
                            linked.push(other_id.to_string());
                        }
                    }
                }
                if !linked.is_empty() {
                    cells.push(TraceCell::Linked(linked));
                    continue;
                }
                let expectation = self.expectation(&truth.id, column);
                match expectation.missing_kind(item.category.as_deref()) {
                    Some(TraceIssueKind::Missing) => {
                        issues.push(TraceIssueKind::Missing, column, &truth.id, &item.id);
                        cells.push(TraceCell::Missing);
                    }
                    Some(kind) => {
                        issues.push(kind, column, &truth.id, &item.id);
                        cells.push(TraceCell::Linked(Vec::new()));
                    }
                    None => cells.push(TraceCell::Linked(Vec::new())),
                }
            }
            rows.push(MatrixRow {
                item_id: item.id.clone(),
                title: item.title.clone(),
                cells,
            });
        }

        for link in &links {
            let Some((truth_id, other, _)) = link.counterpart(&truth.id) else {
                continue;
            };
            if other == truth.id || known.contains(truth_id) {
                continue;
            }
            let kind = match items.item(truth_id) {
                Some(found) if found.entity != truth.id => TraceIssueKind::Incorrect,
                _ => self.expectation(&truth.id, other).extra_kind(),
            };
            issues.push(kind, other, &truth.id, truth_id);
        }

        let columns = column_ids
            .iter()
            .filter_map(|id| self.catalog.resolve(id).cloned())
            .collect();
        let matrix = TraceMatrix {
            truth,
            columns,
            rows,
            issues: issues.into_vec(),
        };
        tracing::debug!(
            "[Trace] matrix for {}: {} rows, {} issues",
            matrix.truth.id,
            matrix.rows.len(),
            matrix.issues.len()
        );
        Ok(matrix)
    }
}

#[derive(Default)]
struct IssueList {
    seen: HashSet<TraceIssue>,
    ordered: Vec<TraceIssue>,
}

impl IssueList {
    fn push(&mut self, kind: TraceIssueKind, source: &str, target: &str, item_id: &str) {
        let issue = TraceIssue {
            kind,
            source: source.to_string(),
            target: target.to_string(),
            item_id: item_id.to_string(),
        };
        if self.seen.insert(issue.clone()) {
            self.ordered.push(issue);
        }
    }

    fn into_vec(self) -> Vec<TraceIssue> {
        self.ordered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceCell {
    /// A structurally required trace is absent
    Missing,
    Linked(Vec<String>),
}

impl TraceCell {
    pub fn ids(&self) -> &[String] {
        match self {
            TraceCell::Missing => &[],
            TraceCell::Linked(ids) => ids,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TraceCell::Missing)
    }
}

impl fmt::Display for TraceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceCell::Missing => f.write_str("MISSING"),
            TraceCell::Linked(ids) if ids.is_empty() => f.write_str("N/A"),
            TraceCell::Linked(ids) => f.write_str(&ids.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    pub item_id: String,
    pub title: String,
    /// One cell per [`TraceMatrix::columns`] entry
    pub cells: Vec<TraceCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceMatrix {
    pub truth: TraceEntity,
    pub columns: Vec<TraceEntity>,
    pub rows: Vec<MatrixRow>,
    pub issues: Vec<TraceIssue>,
}

impl TraceMatrix {
    pub fn row(&self, item_id: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|row| row.item_id == item_id)
    }

    pub fn cell(&self, item_id: &str, entity: &str) -> Option<&TraceCell> {
        let column = self.columns.iter().position(|c| c.answers_to(entity))?;
        self.row(item_id)?.cells.get(column)
    }

    pub fn issues_of(&self, kind: TraceIssueKind) -> impl Iterator<Item = &TraceIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }
}

/// Pipe table followed by the issue list.
impl fmt::Display for TraceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "| {}", self.truth.name)?;
        for column in &self.columns {
            write!(f, " | {}", column.name)?;
        }
        writeln!(f, " |")?;
        write!(f, "|---")?;
        for _ in &self.columns {
            write!(f, "|---")?;
        }
        writeln!(f, "|")?;
        for row in &self.rows {
            write!(f, "| {}", row.item_id)?;
            for cell in &row.cells {
                write!(f, " | {cell}")?;
            }
            writeln!(f, " |")?;
        }
        writeln!(f)?;
        if self.issues.is_empty() {
            writeln!(f, "No trace issues found.")
        } else {
            writeln!(f, "Trace issues:")?;
            for issue in &self.issues {
                writeln!(f, "- {issue}")?;
            }
            Ok(())
        }
    }
}
