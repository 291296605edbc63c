//! Delta application: `patch`, `patch_inplace`, and `transfer`.

use serde_json::Value;

use crate::delta::{Delta, FieldDelta};
use crate::diff::diff;

/// Applies `delta` to `from` and returns the result. `from` is not mutated.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use plan_delta::{diff, patch};
///
/// let a = json!({"x": 1, "y": 2});
/// let b = json!({"x": 1, "z": [3, 4]});
///
/// let delta = diff(&a, &b);
/// assert_eq!(patch(&a, delta.as_ref()), b);
/// ```
pub fn patch(from: &Value, delta: Option<&Delta>) -> Value {
    match delta {
        None => from.clone(),
        Some(Delta::Replace(value)) => value.clone(),
        Some(delta) => {
            let mut out = from.clone();
            patch_inplace(&mut out, delta);
            out
        }
    }
}

/// Applies `delta` to `target` in place.
///
/// Returns `false` when the delta is a map of per-key edits but `target` is
/// not a map: the shapes are incompatible and the caller should replace the
/// whole value instead. An `Add` for a key that already exists is a no-op,
/// and a nested `Edit` whose target slot has an incompatible shape is
/// skipped; both only arise from deltas that are stale with respect to the
/// value they are applied to.
pub fn patch_inplace(target: &mut Value, delta: &Delta) -> bool {
    match delta {
        Delta::Replace(value) => {
            *target = value.clone();
            true
        }
        Delta::Map(fields) => {
            let Value::Object(map) = target else {
                return false;
            };
            for (key, field) in fields {
                match field {
                    FieldDelta::Edit(sub) => {
                        if let Some(slot) = map.get_mut(key) {
                            patch_inplace(slot, sub);
                        }
                    }
                    FieldDelta::Add(value) => {
                        if !map.contains_key(key) {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                    FieldDelta::Remove => {
                        map.remove(key);
                    }
                }
            }
            true
        }
    }
}

/// Mutates `to` so that it becomes structurally equal to `from`.
///
/// Returns `true` when `to` was changed, `false` when the two values were
/// already equal.
pub fn transfer(from: &Value, to: &mut Value) -> bool {
    match diff(to, from) {
        Some(delta) => {
            if !patch_inplace(to, &delta) {
                *to = from.clone();
            }
            true
        }
        None => false,
    }
}
