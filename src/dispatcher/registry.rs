//! Sharded concurrent stage registry (§4.6, §9: "a sharded
//! concurrent map owned by the Dispatcher").
//!
//! Every stage's existence is decided by one atomic `DashMap` insert: the
//! caller that wins the race gets to construct and run `on_create`, every
//! other concurrent caller sees `AlreadyExists` (§8, scenario S2,
//! "concurrent get_or_create on the same brand-new stage_id creates exactly
//! one stage").

// Layer 1: Standard library imports
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

// Layer 3: Internal module imports
use crate::context::RuntimeContext;
use crate::error::StageError;
use crate::stage::cell::StageCell;
use crate::stage::handler::{ActorFactory, StageTypeFactory};
use crate::util::StageId;

/// A registered `stage_type`'s paired factories: one to build the stage's
/// own logic, one to build a fresh actor for each authenticating session.
pub struct StageTypeRegistration {
    pub stage_factory: StageTypeFactory,
    pub actor_factory: ActorFactory,
}

/// Owns every live [`StageCell`] and every registered `stage_type`.
pub struct DispatcherRegistry {
    stages: DashMap<StageId, Arc<StageCell>>,
    stage_types: DashMap<String, Arc<StageTypeRegistration>>,
    ctx: Arc<RuntimeContext>,
    self_ref: Weak<DispatcherRegistry>,
}

impl DispatcherRegistry {
    pub fn new(ctx: Arc<RuntimeContext>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            stages: DashMap::new(),
            stage_types: DashMap::new(),
            ctx,
            self_ref: weak.clone(),
        })
    }

    pub fn register_stage_type(
        &self,
        name: impl Into<String>,
        stage_factory: StageTypeFactory,
        actor_factory: ActorFactory,
    ) {
        self.stage_types
            .insert(name.into(), Arc::new(StageTypeRegistration { stage_factory, actor_factory }));
    }

    pub fn get(&self, stage_id: StageId) -> Option<Arc<StageCell>> {
        self.stages.get(&stage_id).map(|entry| entry.clone())
    }

    /// The registration for `stage_type`, used by the session adapter to
    /// build a fresh actor before the auth handshake (§4.5 step 2).
    pub fn registration(&self, stage_type: &str) -> Option<Arc<StageTypeRegistration>> {
        self.stage_types.get(stage_type).map(|entry| entry.clone())
    }

    pub fn stage_type_name_of(&self, stage_id: StageId) -> Option<String> {
        self.stages.get(&stage_id).map(|cell| cell.stage_type_name().to_string())
    }

    /// Snapshot of every live stage, used by [`crate::runtime::Runtime::shutdown`]
    /// to drain each one with a deadline (§5, "drains in reverse").
    pub fn all_cells(&self) -> Vec<Arc<StageCell>> {
        self.stages.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Atomically creates a stage iff `stage_id` is absent. The losing side
    /// of a race gets `Err(AlreadyExists)`; it is not a bug, it is the
    /// expected outcome of concurrent `get_or_create` on the same id.
    pub fn try_insert(&self, stage_id: StageId, stage_type: &str) -> Result<Arc<StageCell>, StageError> {
        let registration = self
            .stage_types
            .get(stage_type)
            .ok_or_else(|| StageError::InvalidStageType(stage_type.to_string()))?
            .clone();

        match self.stages.entry(stage_id) {
            Entry::Occupied(_) => Err(StageError::AlreadyExists(stage_id)),
            Entry::Vacant(vacant) => {
                let stage_impl = (registration.stage_factory)();
                let cell = StageCell::new(stage_id, stage_type.to_string(), stage_impl, self.ctx.clone(), self.self_ref.clone());
                vacant.insert(cell.clone());
                Ok(cell)
            }
        }
    }

    pub fn remove(&self, stage_id: StageId) -> Option<Arc<StageCell>> {
        self.stages.remove(&stage_id).map(|(_, cell)| cell)
    }

    /// Removes the stage, cancels every timer it owns, and enqueues a final
    /// `DestroyMessage`. Exposed here (not just on [`crate::dispatcher::Dispatcher`])
    /// so `StageSender::close_stage` can call it through the same
    /// `Weak<DispatcherRegistry>` every stage already carries.
    pub fn destroy(&self, stage_id: StageId) -> bool {
        match self.remove(stage_id) {
            Some(cell) => {
                self.ctx.timer_manager.cancel_all_for(stage_id);
                cell.enqueue(crate::stage::message::StageMessage::DestroyMessage);
                true
            }
            None => false,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
