//!
//! Bulk Task Descriptors
//!
//! A bulk task is a `Runnable` plus an invocation count N; the scheduler
//! expands it into N work items. This module defines:
//!
//! - `TaskId` - dense, monotonically assigned bulk task identifier
//! - `Runnable` - the callable contract the engine drives
//! - `TaskDescriptor` - per-bulk-task bookkeeping (completion, dependencies)
//! - `TaskTable` - the append-only descriptor store, indexed by `TaskId`
//!
//! Descriptors are never removed: dependency registration must be able to
//! inspect any previously returned id, finished or not.
//!

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// Identifier for a submitted bulk task.
///
/// Ids are assigned in strict submission order, starting at 0, and are never
/// reused within a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Position of this task's descriptor in the table.
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// The callable contract a bulk task executes.
///
/// The engine guarantees each index in `[0, total)` is passed to `run_task`
/// exactly once, that invocations of a dependency finish before any
/// invocation of a dependent begins, and nothing else: invocations of one
/// bulk task may run concurrently on different worker threads, in any order.
///
/// `run_task` is called with no scheduler lock held; it may block, but
/// blocking only reduces throughput.
pub trait Runnable: Send + Sync {
    fn run_task(&self, index: usize, total: usize);
}

/// Per-bulk-task state, guarded by the coordinator mutex.
pub(crate) struct TaskDescriptor {
    /// Shared handle to the caller's runnable. Held until the scheduler is
    /// dropped so late dependency lookups stay valid.
    pub(crate) runnable: Arc<dyn Runnable>,
    /// Invocation count N. Zero is valid: the task completes without ever
    /// reaching a worker.
    pub(crate) total: usize,
    /// Invocations finished so far. `0 <= completed <= total`.
    pub(crate) completed: usize,
    /// Predecessor bulk tasks not yet finished at submission time.
    pub(crate) remaining_deps: usize,
    /// Later submissions that declared this task as a dependency.
    pub(crate) successors: SmallVec<[TaskId; 4]>,
    /// Set by the completion cascade once every invocation has finished and
    /// successors have been notified. Tracked explicitly rather than as
    /// `completed == total`, which holds from birth for zero-total tasks.
    pub(crate) finished: bool,
}

/// Append-only store of descriptors, dense over `TaskId`.
pub(crate) struct TaskTable {
    tasks: Vec<TaskDescriptor>,
}

impl TaskTable {
    pub(crate) fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Allocate the next id and insert a fresh descriptor for it.
    pub(crate) fn insert(&mut self, runnable: Arc<dyn Runnable>, total: usize) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(TaskDescriptor {
            runnable,
            total,
            completed: 0,
            remaining_deps: 0,
            successors: SmallVec::new(),
            finished: false,
        });
        id
    }

    /// Number of bulk tasks submitted so far.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn get(&self, id: TaskId) -> &TaskDescriptor {
        match self.tasks.get(id.index()) {
            Some(task) => task,
            None => panic!("unknown {id}: ids are only valid for previously submitted bulk tasks"),
        }
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> &mut TaskDescriptor {
        match self.tasks.get_mut(id.index()) {
            Some(task) => task,
            None => panic!("unknown {id}: ids are only valid for previously submitted bulk tasks"),
        }
    }
}
