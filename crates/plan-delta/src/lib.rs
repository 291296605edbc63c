//! plan-delta — structural deltas over plain JSON documents.
//!
//! A personalized copy of a shared document is persisted as the difference
//! from the shared baseline, not as a full copy. This crate provides the
//! delta representation ([`Delta`]), the diff/patch/transfer engine, and the
//! copy-on-write [`Editable`] wrapper used during edit sessions.
//!
//! All values are plain data: string-keyed maps, arrays, and scalars.
//! Arrays and scalars are always replaced wholesale, because element
//! identity and order inside arrays cannot be assumed stable; no positional
//! diffing is attempted.

pub mod delta;
pub mod diff;
pub mod editable;
pub mod patch;

pub use delta::{Delta, FieldDelta};
pub use diff::diff;
pub use editable::Editable;
pub use patch::{patch, patch_inplace, transfer};
