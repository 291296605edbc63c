//! plan-sync — ordered change propagation for personalized plan overlays.
//!
//! The companion to `plan-delta`: where that crate computes and applies
//! structural deltas, this one moves them. It provides the
//! dependency-ordered [`TopoEmitter`], the serialized [`ChangePipeline`]
//! that pushes recomputed deltas to storage in strict arrival order, the
//! [`ReplicationGuard`] that tells this session's writes apart from writes
//! replicated in from elsewhere, the [`DocumentStore`] contract a storage
//! backend must satisfy (with an in-memory implementation), and the
//! [`PlanProvider`] that composes all of it over base plans and user
//! overlay documents.

pub mod emitter;
pub mod pipeline;
pub mod provider;
pub mod replica;
pub mod store;

pub use emitter::{DependencySpec, EmitError, Subscription, TopoEmitter};
pub use pipeline::{ChangePipeline, ChangeSink, PipelineError};
pub use provider::{PlanProvider, ProviderEvent, UserDocBody, SETTINGS_DOC_ID};
pub use replica::{GuardSignal, ReplicationGuard};
pub use store::{
    ChangeBatch, Document, DocumentStore, GuardedStore, MemoryStore, RevisionId, StoreError,
};
