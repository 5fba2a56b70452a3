//!
//! The Coordinator
//!
//! `TaskScheduler` owns every piece of mutable scheduling state behind a
//! single mutex: the descriptor table, the ready queue, the
//! outstanding-invocation count, and the shutdown flag. Two condvars pair
//! with that mutex:
//!
//! - `work_available` wakes workers after an enqueue (broadcast, since one
//!   enqueue usually adds many work items)
//! - `quiescent` wakes `sync` callers when the outstanding count hits zero
//!
//! Lifecycle: construction spawns the worker pool; `Drop` waits for
//! quiescence, raises the shutdown flag under the mutex, broadcasts, and
//! joins every worker.
//!
//! Submission and `sync` may be called concurrently from any number of
//! threads; the mutex serializes them.
//!

use std::any::Any;
use std::panic;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::config::{SchedulerConfig, WaitMode};
use crate::queue::ReadyQueue;
use crate::task::{Runnable, TaskId, TaskTable};
use crate::worker;

/// Mutable scheduler state. All fields are guarded by `Shared::state`.
pub(crate) struct SchedState {
    pub(crate) table: TaskTable,
    pub(crate) ready: ReadyQueue,
    /// Invocations not yet completed, summed over every submitted bulk
    /// task: queued, executing, and still blocked behind dependencies.
    /// `sync` returns when this reaches zero.
    pub(crate) outstanding: usize,
    /// Lifetime completed-invocation count, for the stats surface.
    pub(crate) completed_invocations: u64,
    pub(crate) shutdown: bool,
    /// First payload captured from a panicking invocation, re-raised by the
    /// next `sync`.
    pub(crate) panic_payload: Option<Box<dyn Any + Send>>,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<SchedState>,
    pub(crate) work_available: Condvar,
    pub(crate) quiescent: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SchedState {
                table: TaskTable::new(),
                ready: ReadyQueue::new(),
                outstanding: 0,
                completed_invocations: 0,
                shutdown: false,
                panic_payload: None,
            }),
            work_available: Condvar::new(),
            quiescent: Condvar::new(),
        }
    }
}

/// Propagate completion of `id` through the dependency graph.
///
/// Worklist-driven: a long chain of zero-total bulk tasks finishes in one
/// pass without call-stack recursion. Newly ready nonzero tasks are
/// expanded into the ready queue; workers are woken once at the end if
/// anything was enqueued.
pub(crate) fn finish_task(state: &mut SchedState, shared: &Shared, id: TaskId) {
    let mut worklist = vec![id];
    let mut enqueued = false;

    while let Some(done) = worklist.pop() {
        let task = state.table.get_mut(done);
        task.finished = true;
        // Successors of a finished task never grow again: submission only
        // registers edges on unfinished dependencies.
        let successors = std::mem::take(&mut task.successors);
        trace!(task = %done, "bulk task finished");

        for succ in successors {
            let task = state.table.get_mut(succ);
            task.remaining_deps -= 1;
            if task.remaining_deps > 0 {
                continue;
            }
            if task.total > 0 {
                let total = task.total;
                state.ready.push_task(succ, total);
                enqueued = true;
            } else {
                worklist.push(succ);
            }
        }
    }

    if enqueued {
        shared.work_available.notify_all();
    }
}

/// Snapshot of the engine's counters, taken under the coordinator mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Bulk tasks submitted over the scheduler's lifetime.
    pub submitted_tasks: usize,
    /// Invocations completed over the scheduler's lifetime.
    pub completed_invocations: u64,
    /// Invocations yet to complete (queued, executing, or blocked).
    pub outstanding_invocations: usize,
    /// Work items currently sitting in the ready queue.
    pub queued_items: usize,
}

/// A bulk-synchronous task execution engine.
///
/// Bulk tasks are submitted as an `Arc<dyn Runnable>` plus an invocation
/// count; the engine invokes `run_task(index, total)` once per index on a
/// fixed pool of worker threads. Submissions may declare dependencies on
/// previously returned `TaskId`s, and `sync` blocks until everything
/// submitted has completed.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    wait_mode: WaitMode,
}

impl TaskScheduler {
    /// Start an engine with `num_threads` workers and default tuning.
    ///
    /// Panics if `num_threads` is zero.
    pub fn new(num_threads: usize) -> Self {
        Self::with_config(SchedulerConfig {
            num_threads,
            ..SchedulerConfig::default()
        })
    }

    /// Start an engine from an explicit configuration.
    ///
    /// Panics if `config.num_threads` is zero.
    pub fn with_config(config: SchedulerConfig) -> Self {
        assert!(
            config.num_threads > 0,
            "scheduler requires at least one worker thread"
        );

        let shared = Arc::new(Shared::new());
        let mut workers = Vec::with_capacity(config.num_threads);

        for _ in 0..config.num_threads {
            let shared = Arc::clone(&shared);
            let handle = match config.wait_mode {
                WaitMode::Sleep => thread::spawn(move || worker::worker_loop(shared)),
                WaitMode::Spin => thread::spawn(move || worker::worker_loop_spin(shared)),
            };
            workers.push(handle);
        }

        debug!(
            num_threads = config.num_threads,
            wait_mode = ?config.wait_mode,
            "scheduler started"
        );

        Self {
            shared,
            workers,
            wait_mode: config.wait_mode,
        }
    }

    /// Run a bulk task with no dependencies and wait for it to finish.
    ///
    /// Equivalent to `run_async_with_deps(runnable, total, &[])` followed by
    /// `sync()`. A `total` of zero returns immediately.
    pub fn run(&self, runnable: Arc<dyn Runnable>, total: usize) {
        self.run_async_with_deps(runnable, total, &[]);
        self.sync();
    }

    /// Submit a bulk task that may only start after `deps` have finished.
    ///
    /// Returns immediately with the new task's id. Dependencies that already
    /// finished impose no constraint. Every id in `deps` must have been
    /// returned by this scheduler; an unknown id is a programming error and
    /// panics. A task depending on itself is a caller error the engine does
    /// not detect.
    pub fn run_async_with_deps(
        &self,
        runnable: Arc<dyn Runnable>,
        total: usize,
        deps: &[TaskId],
    ) -> TaskId {
        let mut state = self.shared.state.lock().unwrap();

        let id = state.table.insert(runnable, total);
        let mut remaining = 0;
        for &dep in deps {
            let dep_task = state.table.get_mut(dep);
            if !dep_task.finished {
                dep_task.successors.push(id);
                remaining += 1;
            }
        }
        state.table.get_mut(id).remaining_deps = remaining;
        state.outstanding += total;

        trace!(task = %id, total, blocked_on = remaining, "bulk task submitted");

        if remaining == 0 {
            if total > 0 {
                state.ready.push_task(id, total);
                self.shared.work_available.notify_all();
            } else {
                // Nothing to invoke and nothing to wait for: complete the
                // task right here so successors observe it as finished.
                finish_task(&mut state, &self.shared, id);
            }
        }

        id
    }

    /// Block until every invocation of every submitted bulk task completes.
    ///
    /// Returns immediately when the engine is already quiescent. If any
    /// invocation panicked since the last `sync`, the first captured payload
    /// is re-raised here once quiescence is reached.
    pub fn sync(&self) {
        let payload = match self.wait_mode {
            WaitMode::Sleep => {
                let mut state = self.shared.state.lock().unwrap();
                while state.outstanding > 0 {
                    state = self.shared.quiescent.wait(state).unwrap();
                }
                state.panic_payload.take()
            }
            WaitMode::Spin => loop {
                let mut state = self.shared.state.lock().unwrap();
                if state.outstanding == 0 {
                    break state.panic_payload.take();
                }
                drop(state);
                thread::yield_now();
            },
        };

        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock().unwrap();
        SchedulerStats {
            submitted_tasks: state.table.len(),
            completed_invocations: state.completed_invocations,
            outstanding_invocations: state.outstanding,
            queued_items: state.ready.len(),
        }
    }

    /// Number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Pending work must finish before workers are told to exit. The
        // quiescence condvar is signaled by both worker loop variants, so a
        // sleeping wait is correct in spin mode too.
        let mut state = self.shared.state.lock().unwrap();
        while state.outstanding > 0 {
            state = self.shared.quiescent.wait(state).unwrap();
        }
        if state.panic_payload.take().is_some() {
            error!("an invocation panicked and no sync observed it; discarding the payload");
        }
        state.shutdown = true;
        drop(state);

        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        debug!("scheduler stopped");
    }
}
