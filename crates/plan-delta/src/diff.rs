//! Structural diff: compute the delta from one value to another.

use indexmap::IndexMap;
use serde_json::Value;

use crate::delta::{Delta, FieldDelta};

/// Computes the delta from `from` to `to`.
///
/// Returns `None` when the two values are deeply equal. Maps are diffed
/// per key; everything else (scalars, arrays, values whose shape class
/// changed) is replaced wholesale.
///
/// Map keys whose target value is `null` are skipped entirely: a field set
/// to `null` cannot be distinguished from an absent field. This is an
/// accepted limitation of the persisted delta format, not a defect.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use plan_delta::{diff, patch};
///
/// let base = json!({"a": {"b": 1, "c": 2}, "f": 5});
/// let edited = json!({"a": {"b": 1, "c": 3}, "f": 5});
///
/// let delta = diff(&base, &edited);
/// assert!(delta.is_some());
/// assert_eq!(patch(&base, delta.as_ref()), edited);
///
/// assert_eq!(diff(&base, &base), None);
/// ```
pub fn diff(from: &Value, to: &Value) -> Option<Delta> {
    let (Value::Object(from_map), Value::Object(to_map)) = (from, to) else {
        return (from != to).then(|| Delta::Replace(to.clone()));
    };

    let mut fields: IndexMap<String, FieldDelta> = IndexMap::new();

    for (key, to_val) in to_map {
        if to_val.is_null() {
            continue;
        }
        match from_map.get(key) {
            Some(from_val) => {
                if let Some(sub) = diff(from_val, to_val) {
                    fields.insert(key.clone(), FieldDelta::Edit(sub));
                }
            }
            None => {
                fields.insert(key.clone(), FieldDelta::Add(to_val.clone()));
            }
        }
    }

    for key in from_map.keys() {
        if !to_map.contains_key(key) {
            fields.insert(key.clone(), FieldDelta::Remove);
        }
    }

    (!fields.is_empty()).then(|| Delta::Map(fields))
}
