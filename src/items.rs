//! Data-provider boundary.
//!
//! Trackers (requirement managers, issue trackers, local files) are external collaborators;
//! everything the core needs from them is the [`ItemSource`] trait. [`ItemCatalog`] is the
//! in-memory implementation, loadable from a JSON item file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{config::get_content, error::TraceDocError, trace::EntityCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLinkKind {
    Parent,
    Child,
    Related,
    Tests,
    TestedBy,
    RiskControl,
}

impl ItemLinkKind {
    /// Whether the link establishes trace coverage. `Related` links are informational only.
    pub fn is_structural(self) -> bool {
        !matches!(self, ItemLinkKind::Related)
    }
}

/// A typed association from one item to another, as stored by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLink {
    pub target: String,
    pub kind: ItemLinkKind,
}

/// One tracked record: a requirement, test, risk, anomaly...
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// Id of the trace entity this item belongs to
    pub entity: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    /// External URL of the item in its tracker
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub links: Vec<ItemLink>,
}

impl Item {
    pub fn new(id: impl Into<String>, entity: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            entity: entity.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_link(mut self, target: impl Into<String>, kind: ItemLinkKind) -> Self {
        self.links.push(ItemLink {
            target: target.into(),
            kind,
        });
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(category))
            .unwrap_or(false)
    }
}

/// Supplies typed items to capabilities and to the traceability engine.
///
/// Implementations may block on remote trackers; retries and timeouts are their concern.
pub trait ItemSource: Send + Sync {
    /// All items of `entity`, in the tracker's natural order.
    fn items(&self, entity: &str) -> Vec<Item>;

    fn item(&self, id: &str) -> Option<Item>;
}

/// Ordered, in-memory item store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCatalog {
    items: IndexMap<String, Item>,
}

#[derive(Deserialize)]
struct ItemFile {
    items: Vec<Item>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        ItemCatalog::default()
    }

    /// Insert an item, replacing any earlier item with the same id.
    pub fn insert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.clone(), item)
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.insert(item);
        self
    }

    /// Parse `{"items": [...]}` JSON.
    pub fn from_json_str(json: &str) -> Result<Self, TraceDocError> {
        let file: ItemFile = serde_json::from_str(json)?;
        let mut catalog = ItemCatalog::new();
        for item in file.items {
            if let Some(previous) = catalog.insert(item) {
                tracing::warn!("[Items] duplicate item id '{}' replaced", previous.id);
            }
        }
        Ok(catalog)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TraceDocError> {
        Self::from_json_str(&get_content(path)?)
    }

    /// Rewrite each item's entity to the canonical id of the catalog entity it names, so item
    /// files may refer to entities by name or abbreviation.
    pub fn normalize(&mut self, entities: &EntityCatalog) -> Result<(), TraceDocError> {
        for item in self.items.values_mut() {
            let entity = entities
                .resolve(&item.entity)
                .ok_or_else(|| TraceDocError::UnknownEntity(item.entity.clone()))?;
            item.entity = entity.id.clone();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

impl ItemSource for ItemCatalog {
    fn items(&self, entity: &str) -> Vec<Item> {
        self.items
            .values()
            .filter(|item| item.entity.eq_ignore_ascii_case(entity))
            .cloned()
            .collect()
    }

    fn item(&self, id: &str) -> Option<Item> {
        self.items.get(id).cloned()
    }
}
