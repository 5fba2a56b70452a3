//!
//! lockstep-probe - Instrumented Runnables
//!
//! `Runnable` implementations that observe engine behavior from inside
//! invocations, for use in lockstep's tests:
//!
//! - `CountingProbe` - counts invocations with an atomic
//! - `IndexRecorder` - one sentinel slot per index; detects duplicate and
//!   missing invocations
//! - `SequenceLog` / `LabeledProbe` - labeled events stamped with a shared
//!   monotonic sequence, for dependency-ordering assertions
//! - `ConcurrencyGauge` - current and peak simultaneous invocations
//! - `FailingProbe` - panics at one chosen index, counts the rest
//!
//! Probes are deliberately clock-free: ordering assertions compare sequence
//! stamps taken under a lock, which the engine's happens-before guarantees
//! make strictly comparable across dependent bulk tasks.
//!

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lockstep::Runnable;

/// Counts invocations.
pub struct CountingProbe {
    count: AtomicUsize,
}

impl CountingProbe {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Runnable for CountingProbe {
    fn run_task(&self, _index: usize, _total: usize) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sentinel marking an index slot that no invocation has written yet.
const EMPTY: usize = usize::MAX;

/// Records each invocation into a per-index slot.
///
/// A second write to the same slot is counted as a duplicate; a slot still
/// holding the sentinel after `sync` means the index was never invoked.
pub struct IndexRecorder {
    slots: Vec<AtomicUsize>,
    duplicates: AtomicUsize,
}

impl IndexRecorder {
    pub fn new(total: usize) -> Self {
        let mut slots = Vec::with_capacity(total);
        slots.resize_with(total, || AtomicUsize::new(EMPTY));
        Self {
            slots,
            duplicates: AtomicUsize::new(0),
        }
    }

    /// Value written at `index`, or `None` if the index never ran.
    pub fn get(&self, index: usize) -> Option<usize> {
        match self.slots[index].load(Ordering::SeqCst) {
            EMPTY => None,
            value => Some(value),
        }
    }

    /// Number of invocations that hit an already-written slot.
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    /// Number of slots no invocation ever wrote.
    pub fn missing(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.load(Ordering::SeqCst) == EMPTY)
            .count()
    }
}

impl Runnable for IndexRecorder {
    fn run_task(&self, index: usize, _total: usize) {
        let previous = self.slots[index].swap(index, Ordering::SeqCst);
        if previous != EMPTY {
            self.duplicates.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// One recorded invocation: which probe, which index, and when relative to
/// every other event in the same log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub label: String,
    pub index: usize,
    pub stamp: u64,
}

/// Shared, lock-stamped event log.
///
/// Stamps are assigned under the log's mutex, so for two bulk tasks linked
/// by a dependency edge every stamp of the predecessor is strictly below
/// every stamp of the successor.
pub struct SequenceLog {
    events: Mutex<Vec<Event>>,
}

impl SequenceLog {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, label: &str, index: usize) {
        let mut events = self.events.lock().unwrap();
        let stamp = events.len() as u64;
        events.push(Event {
            label: label.to_string(),
            index,
            stamp,
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn stamps_for(&self, label: &str) -> Vec<u64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.label == label)
            .map(|event| event.stamp)
            .collect()
    }

    /// True when every `earlier` event precedes every `later` event.
    /// Vacuously true if either label recorded nothing.
    pub fn all_before(&self, earlier: &str, later: &str) -> bool {
        let earlier = self.stamps_for(earlier);
        let later = self.stamps_for(later);
        match (earlier.iter().max(), later.iter().min()) {
            (Some(last_earlier), Some(first_later)) => last_earlier < first_later,
            _ => true,
        }
    }
}

impl Default for SequenceLog {
    fn default() -> Self {
        Self::new()
    }
}

/// A runnable that records its invocations into a shared `SequenceLog`
/// under a fixed label.
pub struct LabeledProbe {
    label: String,
    log: Arc<SequenceLog>,
}

impl LabeledProbe {
    pub fn new(label: impl Into<String>, log: Arc<SequenceLog>) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }
}

impl Runnable for LabeledProbe {
    fn run_task(&self, index: usize, _total: usize) {
        self.log.record(&self.label, index);
    }
}

/// Tracks how many invocations run at the same time.
///
/// Each invocation holds its slot for `hold` so overlap is observable even
/// for trivially fast work.
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    hold: Duration,
}

impl ConcurrencyGauge {
    pub fn new(hold: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            hold,
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Runnable for ConcurrencyGauge {
    fn run_task(&self, _index: usize, _total: usize) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.hold);
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Panics at exactly one index and counts every other invocation.
pub struct FailingProbe {
    panic_index: usize,
    successes: AtomicUsize,
}

impl FailingProbe {
    pub fn new(panic_index: usize) -> Self {
        Self {
            panic_index,
            successes: AtomicUsize::new(0),
        }
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }
}

impl Runnable for FailingProbe {
    fn run_task(&self, index: usize, _total: usize) {
        if index == self.panic_index {
            panic!("intentional probe failure at index {index}");
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
    }
}
