//!
//! Worker Pool Loops
//!
//! Each worker thread runs one of these loops until the shutdown flag is
//! raised. One iteration: claim a work item under the coordinator mutex,
//! invoke the runnable with the mutex released, then reacquire it for
//! completion accounting. An invocation panic is contained to its item so
//! the accounting still advances; the first payload is parked in the shared
//! state for the next `sync` to re-raise.
//!

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, MutexGuard};
use std::thread;

use tracing::warn;

use crate::queue::WorkItem;
use crate::scheduler::{finish_task, SchedState, Shared};

/// Condvar-based worker: parks while the ready queue is empty.
///
/// The wait predicate re-checks both queue emptiness and the shutdown flag
/// on every wake, so spurious wakeups and shutdown broadcasts are handled
/// by the same loop.
pub(crate) fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut state = shared.state.lock().unwrap();
        while state.ready.is_empty() && !state.shutdown {
            state = shared.work_available.wait(state).unwrap();
        }
        if state.shutdown {
            return;
        }
        let Some(item) = state.ready.pop() else {
            continue;
        };
        execute(&shared, state, item);
    }
}

/// Yield-polling worker for `WaitMode::Spin`.
pub(crate) fn worker_loop_spin(shared: Arc<Shared>) {
    loop {
        let mut state = shared.state.lock().unwrap();
        if state.shutdown {
            return;
        }
        match state.ready.pop() {
            Some(item) => execute(&shared, state, item),
            None => {
                drop(state);
                thread::yield_now();
            }
        }
    }
}

/// Invoke one work item and account for its completion.
///
/// Takes the held state guard, releases it for the invocation itself, and
/// reacquires it afterwards. Completion of the item's bulk task triggers the
/// dependency cascade; reaching zero outstanding invocations wakes every
/// `sync` caller.
fn execute(shared: &Shared, state: MutexGuard<'_, SchedState>, item: WorkItem) {
    let task = state.table.get(item.task);
    let runnable = Arc::clone(&task.runnable);
    let total = task.total;
    drop(state);

    let result = panic::catch_unwind(AssertUnwindSafe(|| runnable.run_task(item.index, total)));

    let mut state = shared.state.lock().unwrap();
    if let Err(payload) = result {
        warn!(task = %item.task, index = item.index, "invocation panicked");
        if state.panic_payload.is_none() {
            state.panic_payload = Some(payload);
        }
    }

    let task = state.table.get_mut(item.task);
    task.completed += 1;
    let task_done = task.completed == task.total;
    state.completed_invocations += 1;
    state.outstanding -= 1;

    if task_done {
        finish_task(&mut state, shared, item.task);
    }
    if state.outstanding == 0 {
        shared.quiescent.notify_all();
    }
}
