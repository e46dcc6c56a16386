//! Callbacks, cancellation and shared progress
//!
//! These let the executor report to a UI and ask for confirmation
//! without depending on any terminal crate.

use crate::error::RemoteError;
use crate::planner::{Direction, ExecutionPlan};
use crate::types::{ResourceId, ResourceOutcome, ResourceState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Progress callback for execution operations
///
/// Methods take `&self` because workers report concurrently when a plan
/// runs level by level.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first request of a plan
    fn on_plan_start(&self, total: usize, direction: Direction);

    /// Called right before a request is issued for a resource
    fn on_resource_start(&self, id: &ResourceId, state: ResourceState);

    /// Called once the resource reached its final state for this run
    fn on_resource_complete(&self, id: &ResourceId, state: ResourceState);

    /// Called after the last request of a plan
    fn on_plan_complete(&self);
}

/// Confirmation callback for destructive operations
pub trait ConfirmCallback {
    /// Ask the user to confirm an action; `true` means go ahead
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&self, _total: usize, _direction: Direction) {}
    fn on_resource_start(&self, _id: &ResourceId, _state: ResourceState) {}
    fn on_resource_complete(&self, _id: &ResourceId, _state: ResourceState) {}
    fn on_plan_complete(&self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}

/// Cooperative cancellation flag
///
/// Once cancelled the executor issues no new requests. Requests already
/// in flight finish and are recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-slot state records for one plan
///
/// One mutex guards the whole summary. Each slot is written only by the
/// worker that owns it.
#[derive(Debug)]
pub struct PlanProgress {
    slots: Mutex<Vec<ResourceOutcome>>,
}

impl PlanProgress {
    /// Every slot starts in `initial`
    pub fn new(plan: &ExecutionPlan, initial: ResourceState) -> Self {
        let slots = plan
            .steps()
            .iter()
            .map(|step| ResourceOutcome {
                id: step.id.clone(),
                state: initial,
                error: None,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    pub fn set(&self, slot: usize, state: ResourceState) {
        let mut slots = self.lock();
        slots[slot].state = state;
        if !state.is_failed() {
            slots[slot].error = None;
        }
    }

    pub fn fail(&self, slot: usize, error: RemoteError) {
        let mut slots = self.lock();
        slots[slot].state = ResourceState::Failed;
        slots[slot].error = Some(error);
    }

    pub fn state(&self, slot: usize) -> ResourceState {
        self.lock()[slot].state
    }

    pub fn any_failed(&self) -> bool {
        self.lock().iter().any(|o| o.state.is_failed())
    }

    /// Copy of every slot, in plan order
    pub fn snapshot(&self) -> Vec<ResourceOutcome> {
        self.lock().clone()
    }

    pub fn into_outcomes(self) -> Vec<ResourceOutcome> {
        match self.slots.into_inner() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResourceOutcome>> {
        lock(&self.slots)
    }
}

/// Lock a mutex, recovering the data if a worker panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
