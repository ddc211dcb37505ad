//! Target-function contract and worker-local state.
//!
//! Handles that coordinate across workers (the admission controller, or any
//! other `Send + Sync` object registered in [`SharedResources`]) are handed to
//! each worker once, when the worker starts. Per-call payloads carry only the
//! item's own arguments; target functions look the shared handles up in the
//! [`WorkerContext`] they receive.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{AdmissionController, AppResult};

/// Shared handles distributed to every worker at start-up.
#[derive(Clone)]
pub struct SharedResources {
    admission: AdmissionController,
    handles: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for SharedResources {
    fn default() -> Self {
        Self {
            admission: AdmissionController::unbounded(),
            handles: HashMap::new(),
        }
    }
}

impl fmt::Debug for SharedResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResources")
            .field("admission", &self.admission)
            .field("handles", &self.handles.len())
            .finish()
    }
}

impl SharedResources {
    /// Resources with an unbounded admission controller and no extra handles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `admission` as the session's admission controller.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = admission;
        self
    }

    /// Register an extra handle, replacing any previous handle of the same type.
    #[must_use]
    pub fn insert<T: Any + Send + Sync>(mut self, handle: Arc<T>) -> Self {
        self.handles.insert(TypeId::of::<T>(), handle);
        self
    }

    /// The session's admission controller.
    #[must_use]
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Look up a registered handle by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.handles
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|handle| handle.downcast::<T>().ok())
    }
}

/// State a worker builds once at start-up and lends to every call it runs.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    worker_id: usize,
    resources: SharedResources,
}

impl WorkerContext {
    /// Context for worker `worker_id`.
    #[must_use]
    pub const fn new(worker_id: usize, resources: SharedResources) -> Self {
        Self {
            worker_id,
            resources,
        }
    }

    /// Index of the worker running the call (`0` on the sequential path).
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The session's admission controller.
    #[must_use]
    pub const fn admission(&self) -> &AdmissionController {
        self.resources.admission()
    }

    /// Look up a shared handle by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resources.get::<T>()
    }
}

/// Target function run once per work item.
///
/// Errors are local to the item: the scheduler records them to the item's
/// log and reports them in that item's result.
pub trait TaskExecutor<P, R>: Send + Sync + 'static {
    /// Run the target function on one payload.
    ///
    /// # Errors
    ///
    /// Any error the target function raises.
    fn execute(&self, payload: P, ctx: &WorkerContext) -> AppResult<R>;
}

impl<P, R, F> TaskExecutor<P, R> for F
where
    F: Fn(P, &WorkerContext) -> AppResult<R> + Send + Sync + 'static,
{
    fn execute(&self, payload: P, ctx: &WorkerContext) -> AppResult<R> {
        self(payload, ctx)
    }
}

/// A payload that is its own target function.
pub type BoxedTask<R> = Box<dyn FnOnce(&WorkerContext) -> AppResult<R> + Send>;

/// Executor for items that each carry their own target function.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallBoxed;

impl<R: 'static> TaskExecutor<BoxedTask<R>, R> for CallBoxed {
    fn execute(&self, payload: BoxedTask<R>, ctx: &WorkerContext) -> AppResult<R> {
        payload(ctx)
    }
}
