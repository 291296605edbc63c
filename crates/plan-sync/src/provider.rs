//! Plan provider: working plans from deltas, deltas from plans.
//!
//! Base plans are shared and treated as immutable; each personalized plan
//! is persisted as an overlay document holding only the delta from its
//! base. The provider materializes working plans by patching base plans
//! with their stored deltas, recomputes and pushes deltas when the change
//! pipeline asks it to persist, and rebuilds everything from storage when
//! the replication guard reports a write from another session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use plan_delta::{diff, patch, Delta, Editable};

use crate::pipeline::ChangeSink;
use crate::replica::GuardSignal;
use crate::store::{Document, DocumentStore, GuardedStore, RevisionId, StoreError};

/// Well-known id of the settings document in the user's own dataset.
pub const SETTINGS_DOC_ID: &str = "user-settings";

/// Persisted body of a document in the user's own dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doctype", rename_all = "kebab-case")]
pub enum UserDocBody {
    /// A personalized plan, stored as the delta from its base plan. The
    /// document id equals the base plan's id.
    UserPlan { delta: Option<Delta> },
    /// Free-form user settings.
    UserSettings {
        #[serde(flatten)]
        settings: Value,
    },
}

/// Events published by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// All working plans were recomputed from storage.
    Rebuilt,
}

struct OverlayRecord {
    rev: RevisionId,
    delta: Option<Delta>,
}

struct ProviderState {
    /// Base plans are assumed immutable, so they are fetched once.
    base_cache: HashMap<String, Value>,
    overlay_docs: HashMap<String, OverlayRecord>,
    working_plans: HashMap<String, Value>,
    settings: Value,
    original_settings: Value,
    settings_rev: Option<RevisionId>,
}

fn default_settings() -> Value {
    json!({})
}

/// Owns the working plans and the overlay documents they are persisted as.
pub struct PlanProvider {
    base: Arc<dyn DocumentStore>,
    own: Arc<GuardedStore>,
    state: Mutex<ProviderState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl PlanProvider {
    /// `base` holds the shared base plans; `own` is the user's replicated
    /// dataset, with its guard already watching the change feed.
    pub fn new(base: Arc<dyn DocumentStore>, own: Arc<GuardedStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            base,
            own,
            state: Mutex::new(ProviderState {
                base_cache: HashMap::new(),
                overlay_docs: HashMap::new(),
                working_plans: HashMap::new(),
                settings: default_settings(),
                original_settings: default_settings(),
                settings_rev: None,
            }),
            events,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Recomputes every working plan from base plans and stored deltas.
    ///
    /// Runs at startup and after every externally observed change to the
    /// user's dataset.
    pub async fn rebuild(&self) -> Result<(), StoreError> {
        let settings_doc = match self.own.store().get(SETTINGS_DOC_ID).await {
            Ok(doc) => Some(doc),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let (settings_rev, settings) = match settings_doc {
            Some(doc) => match serde_json::from_value::<UserDocBody>(doc.body.clone()) {
                Ok(UserDocBody::UserSettings { settings }) => (doc.rev, settings),
                _ => {
                    warn!("malformed settings document; falling back to defaults");
                    (doc.rev, default_settings())
                }
            },
            None => (None, default_settings()),
        };

        let mut plan_docs = Vec::new();
        for doc in self.own.store().all().await? {
            if doc.id == SETTINGS_DOC_ID {
                continue;
            }
            if let Ok(UserDocBody::UserPlan { delta }) =
                serde_json::from_value::<UserDocBody>(doc.body.clone())
            {
                plan_docs.push((doc.id, doc.rev, delta));
            }
        }

        {
            let mut state = self.state.lock();
            state.overlay_docs.clear();
            state.working_plans.clear();
            state.settings = settings.clone();
            state.original_settings = settings;
            state.settings_rev = settings_rev;
        }

        for (id, rev, delta) in plan_docs {
            let Some(rev) = rev else { continue };
            let base = self.base_plan(&id).await?;
            let working = patch(&base, delta.as_ref());
            let mut state = self.state.lock();
            state.working_plans.insert(id.clone(), working);
            state.overlay_docs.insert(id.clone(), OverlayRecord { rev, delta });
            debug!(plan = %id, "working plan recreated");
        }

        let _ = self.events.send(ProviderEvent::Rebuilt);
        Ok(())
    }

    /// Returns the base plan with the given id, fetching it on first use.
    pub async fn base_plan(&self, id: &str) -> Result<Value, StoreError> {
        if let Some(cached) = self.state.lock().base_cache.get(id) {
            return Ok(cached.clone());
        }
        let doc = self.base.get(id).await?;
        let mut state = self.state.lock();
        state.base_cache.insert(id.to_string(), doc.body.clone());
        Ok(doc.body)
    }

    /// Recomputes all deltas from base and working plans and pushes the
    /// changed overlay documents (and the settings document, when edited).
    ///
    /// Overlay documents whose working plan was discarded are deleted.
    /// Every write goes through the guard so its change-stream echo is
    /// classified as self-caused.
    pub async fn persist_deltas(&self) -> Result<(), StoreError> {
        let doomed: Vec<(String, RevisionId)> = {
            let state = self.state.lock();
            state
                .overlay_docs
                .iter()
                .filter(|(id, _)| !state.working_plans.contains_key(*id))
                .map(|(id, record)| (id.clone(), record.rev.clone()))
                .collect()
        };
        for (id, rev) in doomed {
            debug!(plan = %id, "deleting overlay document");
            self.own.note_remove(&id, &rev).await?;
            self.state.lock().overlay_docs.remove(&id);
        }

        let ids: Vec<String> = self.state.lock().working_plans.keys().cloned().collect();
        for id in ids {
            let base = self.base_plan(&id).await?;
            let update = {
                let state = self.state.lock();
                match state.working_plans.get(&id) {
                    None => None,
                    Some(working) => {
                        let new_delta = diff(&base, working);
                        let unchanged = state
                            .overlay_docs
                            .get(&id)
                            .is_some_and(|record| record.delta == new_delta);
                        if unchanged {
                            None
                        } else {
                            let rev = state.overlay_docs.get(&id).map(|r| r.rev.clone());
                            Some((rev, new_delta))
                        }
                    }
                }
            };
            let Some((rev, new_delta)) = update else { continue };

            let body = serde_json::to_value(UserDocBody::UserPlan {
                delta: new_delta.clone(),
            })
            .map_err(|e| StoreError::Write(format!("encode overlay document: {e}")))?;

            debug!(plan = %id, "pushing overlay document");
            let new_rev = self
                .own
                .note_put(&Document {
                    id: id.clone(),
                    rev,
                    body,
                })
                .await?;
            self.state.lock().overlay_docs.insert(
                id,
                OverlayRecord {
                    rev: new_rev,
                    delta: new_delta,
                },
            );
        }

        let settings_update = {
            let state = self.state.lock();
            (state.settings != state.original_settings)
                .then(|| (state.settings_rev.clone(), state.settings.clone()))
        };
        if let Some((rev, settings)) = settings_update {
            let body = serde_json::to_value(UserDocBody::UserSettings {
                settings: settings.clone(),
            })
            .map_err(|e| StoreError::Write(format!("encode settings document: {e}")))?;

            debug!("pushing settings document");
            let new_rev = self
                .own
                .note_put(&Document {
                    id: SETTINGS_DOC_ID.to_string(),
                    rev,
                    body,
                })
                .await?;
            let mut state = self.state.lock();
            state.settings_rev = Some(new_rev);
            state.original_settings = settings;
        }

        Ok(())
    }

    /// Brings a base plan into the working set. The overlay document (with
    /// a null delta, until the user edits something) is created on the
    /// next persistence pass.
    pub async fn adopt_plan(&self, id: &str) -> Result<(), StoreError> {
        let base = self.base_plan(id).await?;
        self.state.lock().working_plans.insert(id.to_string(), base);
        Ok(())
    }

    /// Drops a plan from the working set; its overlay document is deleted
    /// on the next persistence pass. Returns whether the plan was present.
    pub fn discard_plan(&self, id: &str) -> bool {
        self.state.lock().working_plans.remove(id).is_some()
    }

    /// Starts an edit session over the working plan with the given id.
    pub fn edit_plan(&self, id: &str) -> Option<Editable> {
        self.state.lock().working_plans.get(id).map(Editable::new)
    }

    /// Commits an edit session into the working plan. Returns whether
    /// anything changed; the caller is expected to follow a `true` with a
    /// change notification on the pipeline.
    pub fn commit_plan(&self, id: &str, session: &Editable) -> bool {
        let mut state = self.state.lock();
        match state.working_plans.get_mut(id) {
            Some(plan) => session.apply(plan),
            None => false,
        }
    }

    pub fn working_plan(&self, id: &str) -> Option<Value> {
        self.state.lock().working_plans.get(id).cloned()
    }

    pub fn plan_ids(&self) -> Vec<String> {
        self.state.lock().working_plans.keys().cloned().collect()
    }

    /// Resets a plan to its base state by nulling out the stored delta and
    /// rebuilding.
    pub async fn reset_plan(&self, id: &str) -> Result<(), StoreError> {
        let doc = self.own.store().get(id).await?;
        let body = serde_json::to_value(UserDocBody::UserPlan { delta: None })
            .map_err(|e| StoreError::Write(format!("encode overlay document: {e}")))?;
        self.own
            .note_put(&Document {
                id: doc.id,
                rev: doc.rev,
                body,
            })
            .await?;
        self.rebuild().await
    }

    pub fn settings(&self) -> Value {
        self.state.lock().settings.clone()
    }

    /// Replaces the working settings; persisted on the next persistence
    /// pass if they differ from the stored ones.
    pub fn set_settings(&self, settings: Value) {
        self.state.lock().settings = settings;
    }

    /// Reacts to guard signals: every `External` triggers a full rebuild.
    /// Must be called from within a runtime.
    pub fn watch_external(self: &Arc<Self>) -> JoinHandle<()> {
        let mut signals = self.own.signals();
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(GuardSignal::External) => {
                        warn!("external change to the user dataset; rebuilding working plans");
                        if let Err(e) = provider.rebuild().await {
                            warn!(error = %e, "rebuild after external change failed");
                        }
                    }
                    Ok(GuardSignal::Any) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl ChangeSink for PlanProvider {
    async fn persist(&self) -> Result<(), StoreError> {
        self.persist_deltas().await
    }
}
