//! Copy-on-write wrapper for edit sessions.

use serde_json::Value;

use crate::patch::transfer;

/// A working copy of a document under active edit.
///
/// Construction deep-clones the original; all edits go to the owned working
/// copy via [`Editable::object_mut`]. The original is only touched inside
/// [`Editable::apply`], which the owner calls with the original it wants to
/// commit into; holding the `&mut` there is what rules out two sessions
/// committing into the same original at once.
#[derive(Debug, Clone)]
pub struct Editable {
    working: Value,
}

impl Editable {
    /// Starts an edit session over a clone of `original`.
    pub fn new(original: &Value) -> Self {
        Self {
            working: original.clone(),
        }
    }

    /// The working copy.
    pub fn object(&self) -> &Value {
        &self.working
    }

    /// The working copy, for mutation.
    pub fn object_mut(&mut self) -> &mut Value {
        &mut self.working
    }

    /// Commits the edits by mutating `original` to match the working copy.
    ///
    /// Returns whether anything changed. This is the sole commit point; no
    /// notification or persistence happens here. That is the owner's next,
    /// explicit step.
    pub fn apply(&self, original: &mut Value) -> bool {
        transfer(&self.working, original)
    }

    /// Discards local edits by resynchronizing the working copy from the
    /// (possibly externally changed) original.
    ///
    /// Returns whether the working copy changed.
    pub fn reset(&mut self, original: &Value) -> bool {
        transfer(original, &mut self.working)
    }
}
