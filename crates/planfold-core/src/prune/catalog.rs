//! Catalog contract for partitioned tables.
//!
//! The pruner needs one read per partitioned class: the partitioning kind,
//! the key attribute, and per-child bounds. The in-memory implementation
//! backs tests and the CLI's JSON catalog files.

use crate::value::DbValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("catalog read failed for class '{class}': {detail}")]
    Fetch { class: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Hash,
    Range,
    List,
}

/// Lifecycle state of one partition child. REORG reuses and renames
/// partitions in place; an explicit state replaces the original's
/// sentinel markers in the catalog value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    #[default]
    Active,
    Reused,
    Renamed,
    Dropped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionPart {
    pub name: String,
    #[serde(default)]
    pub state: PartState,
    #[serde(flatten)]
    pub bounds: PartBounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum PartBounds {
    /// Selected by `hash(key) mod size`; no per-part bounds.
    Hash,
    /// `(min, max]`; `None` min is −∞ and `None` max is +∞.
    Range {
        min: Option<DbValue>,
        max: Option<DbValue>,
    },
    /// Equality-matching value set.
    List { values: Vec<DbValue> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionScheme {
    pub kind: PartitionKind,
    pub key_attr: String,
    pub parts: Vec<PartitionPart>,
}

impl PartitionScheme {
    /// Children that can hold rows at all.
    pub fn live_parts(&self) -> impl Iterator<Item = (usize, &PartitionPart)> {
        self.parts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state != PartState::Dropped)
    }
}

/// The pruner's view of the schema manager.
pub trait Catalog {
    /// `Ok(None)` when the class is not partitioned.
    fn partition_scheme(&self, class: &str) -> Result<Option<PartitionScheme>, CatalogError>;
}

/// Table-driven catalog for tests and CLI catalog files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default)]
    pub tables: HashMap<String, PartitionScheme>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: impl Into<String>, scheme: PartitionScheme) {
        self.tables.insert(class.into(), scheme);
    }

    /// HASH partitioning into `size` children named `{class}__p{i}`.
    pub fn hash(class: &str, key_attr: &str, size: usize) -> PartitionScheme {
        PartitionScheme {
            kind: PartitionKind::Hash,
            key_attr: key_attr.to_string(),
            parts: (0..size)
                .map(|i| PartitionPart {
                    name: format!("{class}__p{i}"),
                    state: PartState::Active,
                    bounds: PartBounds::Hash,
                })
                .collect(),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn partition_scheme(&self, class: &str) -> Result<Option<PartitionScheme>, CatalogError> {
        Ok(self.tables.get(class).cloned())
    }
}

/// A catalog with no partitioned tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl Catalog for EmptyCatalog {
    fn partition_scheme(&self, _class: &str) -> Result<Option<PartitionScheme>, CatalogError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_catalog_roundtrips_json() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(
            "t",
            PartitionScheme {
                kind: PartitionKind::Range,
                key_attr: "k".into(),
                parts: vec![
                    PartitionPart {
                        name: "t__p0".into(),
                        state: PartState::Active,
                        bounds: PartBounds::Range {
                            min: None,
                            max: Some(DbValue::Int(10)),
                        },
                    },
                    PartitionPart {
                        name: "t__p1".into(),
                        state: PartState::Dropped,
                        bounds: PartBounds::Range {
                            min: Some(DbValue::Int(10)),
                            max: None,
                        },
                    },
                ],
            },
        );
        let json = serde_json::to_string(&catalog).unwrap();
        let back: MemoryCatalog = serde_json::from_str(&json).unwrap();
        let scheme = back.partition_scheme("t").unwrap().unwrap();
        assert_eq!(scheme.kind, PartitionKind::Range);
        assert_eq!(scheme.live_parts().count(), 1);
    }

    #[test]
    fn hash_helper_names_children() {
        let scheme = MemoryCatalog::hash("t", "k", 4);
        assert_eq!(scheme.parts.len(), 4);
        assert_eq!(scheme.parts[3].name, "t__p3");
    }
}
