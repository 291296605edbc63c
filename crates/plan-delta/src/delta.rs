//! Tagged delta representation.
//!
//! A delta describes the difference between two plain-data values. "No
//! change" is represented as `Option<Delta>::None` by the functions in
//! [`crate::diff`] and [`crate::patch`], so the variants here only ever
//! describe an actual edit.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The difference between two plain-data values.
///
/// Deltas serialize as ordinary JSON (externally tagged), so they can be
/// persisted as document fields and round-tripped through any JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delta {
    /// Wholesale replacement with the target value. Produced for scalars,
    /// arrays, and any value whose shape class changed.
    Replace(Value),
    /// Per-key edits of a map. Keys absent from the map are unchanged.
    Map(IndexMap<String, FieldDelta>),
}

/// The edit applied to a single key of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDelta {
    /// The key exists in both states; apply the nested delta to its value.
    Edit(Delta),
    /// The key exists only in the target state; insert this value.
    Add(Value),
    /// The key exists only in the source state; delete it.
    Remove,
}

impl Delta {
    /// Returns `true` when this delta is a map of per-key edits.
    pub fn is_map(&self) -> bool {
        matches!(self, Delta::Map(_))
    }

    /// Returns `true` when this delta replaces the whole value.
    pub fn is_replace(&self) -> bool {
        matches!(self, Delta::Replace(_))
    }
}
