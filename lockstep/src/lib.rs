//!
//! lockstep - A Bulk-Synchronous Task Execution Engine
//!
//! Schedules *bulk tasks*: a `Runnable` invoked `total` times with indices
//! `0..total`, concurrently and in arbitrary order, on a fixed pool of
//! worker threads. Bulk tasks may depend on previously submitted bulk
//! tasks, and `sync` blocks the caller until everything submitted has
//! completed.
//!
//! Modules:
//!
//! - task: ids, the `Runnable` contract, and the descriptor store
//! - queue: the FIFO ready-work queue
//! - worker: the worker-thread loops
//! - scheduler: the public coordinator, `TaskScheduler`
//! - config: pool sizing and wait-mode tuning
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use lockstep::{Runnable, TaskScheduler};
//!
//! struct Count(AtomicUsize);
//!
//! impl Runnable for Count {
//!     fn run_task(&self, _index: usize, _total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let scheduler = TaskScheduler::new(4);
//! let counter = Arc::new(Count(AtomicUsize::new(0)));
//! scheduler.run(counter.clone(), 100);
//! assert_eq!(counter.0.load(Ordering::SeqCst), 100);
//! ```
//!

pub mod config;
mod queue;
pub mod scheduler;
pub mod task;
mod worker;

pub use config::{ConfigError, SchedulerConfig, WaitMode};
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use task::{Runnable, TaskId};
