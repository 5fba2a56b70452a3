///
/// End-to-End Scheduler Scenarios
///
/// Exercises the engine through its public API with the instrumented
/// runnables from lockstep-probe: fan-out counting, dependency diamonds,
/// zero-total chains, large bulk tasks with duplicate detection, drop with
/// pending work, panic containment, spin mode, concurrent submitters, and
/// a seeded layered-DAG stress run.
///
/// Ordering assertions compare SequenceLog stamps, not clock samples: the
/// engine orders a dependency's last invocation before a dependent's first,
/// and the log's mutex makes the stamps strictly comparable across threads.
///
/// Run all:  `cargo test --test scenarios`
/// Run one:  `cargo test --test scenarios diamond`
///

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lockstep::{Runnable, SchedulerConfig, TaskId, TaskScheduler, WaitMode};
use lockstep_probe::{
    ConcurrencyGauge, CountingProbe, FailingProbe, IndexRecorder, LabeledProbe, SequenceLog,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Noop;

impl Runnable for Noop {
    fn run_task(&self, _index: usize, _total: usize) {}
}

#[test]
fn test_counter_fan_out() {
    let scheduler = TaskScheduler::new(4);
    let counter = Arc::new(CountingProbe::new());

    scheduler.run(counter.clone(), 1000);

    assert_eq!(counter.count(), 1000);
    let stats = scheduler.stats();
    assert_eq!(stats.submitted_tasks, 1);
    assert_eq!(stats.completed_invocations, 1000);
    assert_eq!(stats.outstanding_invocations, 0);
    assert_eq!(stats.queued_items, 0);
}

#[test]
fn test_run_equals_submit_then_sync() {
    let scheduler = TaskScheduler::new(4);
    let run_counter = Arc::new(CountingProbe::new());
    let async_counter = Arc::new(CountingProbe::new());

    scheduler.run(run_counter.clone(), 64);
    scheduler.run_async_with_deps(async_counter.clone(), 64, &[]);
    scheduler.sync();

    assert_eq!(run_counter.count(), async_counter.count());
}

#[test]
fn test_sync_idempotent_on_quiesced_engine() {
    let scheduler = TaskScheduler::new(2);
    let counter = Arc::new(CountingProbe::new());

    scheduler.run_async_with_deps(counter.clone(), 10, &[]);
    scheduler.sync();
    let first = scheduler.stats();

    scheduler.sync();
    assert_eq!(scheduler.stats(), first);
    assert_eq!(counter.count(), 10);
}

#[test]
fn test_diamond_dependency() {
    let scheduler = TaskScheduler::new(2);
    let log = Arc::new(SequenceLog::new());

    let a = scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("A", log.clone())), 1, &[]);
    let b = scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("B", log.clone())), 1, &[a]);
    let c = scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("C", log.clone())), 1, &[a]);
    let _d =
        scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("D", log.clone())), 1, &[b, c]);
    scheduler.sync();

    assert_eq!(log.events().len(), 4);
    assert!(log.all_before("A", "B"));
    assert!(log.all_before("A", "C"));
    assert!(log.all_before("B", "D"));
    assert!(log.all_before("C", "D"));
}

#[test]
fn test_zero_total_chain() {
    let scheduler = TaskScheduler::new(2);

    let mut prev = scheduler.run_async_with_deps(Arc::new(Noop), 0, &[]);
    for _ in 1..100 {
        prev = scheduler.run_async_with_deps(Arc::new(Noop), 0, &[prev]);
    }
    let counter = Arc::new(CountingProbe::new());
    scheduler.run_async_with_deps(counter.clone(), 1, &[prev]);
    scheduler.sync();

    assert_eq!(counter.count(), 1);
    let stats = scheduler.stats();
    assert_eq!(stats.submitted_tasks, 101);
    assert_eq!(stats.completed_invocations, 1);
    assert_eq!(stats.outstanding_invocations, 0);
}

#[test]
fn test_large_bulk_task_exactly_once() {
    let scheduler = TaskScheduler::new(8);
    let recorder = Arc::new(IndexRecorder::new(100_000));

    scheduler.run(recorder.clone(), 100_000);

    assert_eq!(recorder.duplicates(), 0, "some index ran more than once");
    assert_eq!(recorder.missing(), 0, "some index never ran");
    for index in [0, 1, 4_999, 50_000, 99_999] {
        assert_eq!(recorder.get(index), Some(index));
    }
}

#[test]
fn test_interleaved_async_and_sync() {
    let scheduler = TaskScheduler::new(4);
    let log = Arc::new(SequenceLog::new());

    let a = scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("A", log.clone())), 10, &[]);
    scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("B", log.clone())), 10, &[a]);
    scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("C", log.clone())), 10, &[]);
    scheduler.sync();

    assert_eq!(log.events().len(), 30);
    assert!(log.all_before("A", "B"));
    assert_eq!(log.stamps_for("C").len(), 10);
}

#[test]
fn test_drop_waits_for_pending_work() {
    let counter = Arc::new(CountingProbe::new());
    {
        let scheduler = TaskScheduler::new(4);
        scheduler.run_async_with_deps(counter.clone(), 50, &[]);
        // Dropped with work still pending: the destructor syncs first.
    }
    assert_eq!(counter.count(), 50);
}

#[test]
#[should_panic(expected = "intentional probe failure")]
fn test_invocation_panic_resurfaces_in_sync() {
    let scheduler = TaskScheduler::new(2);
    scheduler.run_async_with_deps(Arc::new(FailingProbe::new(3)), 10, &[]);
    scheduler.sync();
}

#[test]
fn test_panic_does_not_stall_completion() {
    let scheduler = TaskScheduler::new(2);
    let failing = Arc::new(FailingProbe::new(0));
    let after = Arc::new(CountingProbe::new());

    let failing_id = scheduler.run_async_with_deps(failing.clone(), 8, &[]);
    scheduler.run_async_with_deps(after.clone(), 4, &[failing_id]);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.sync()));
    assert!(result.is_err(), "sync should re-raise the invocation panic");

    // Accounting advanced past the panic: the dependent still ran, the
    // engine is quiescent, and a second sync has nothing left to raise.
    assert_eq!(failing.successes(), 7);
    assert_eq!(after.count(), 4);
    let stats = scheduler.stats();
    assert_eq!(stats.completed_invocations, 12);
    assert_eq!(stats.outstanding_invocations, 0);
    scheduler.sync();
}

#[test]
fn test_pool_runs_invocations_in_parallel() {
    let scheduler = TaskScheduler::new(4);
    let gauge = Arc::new(ConcurrencyGauge::new(Duration::from_millis(20)));

    scheduler.run(gauge.clone(), 8);

    // Allow single-core CI; overlap just must never exceed the pool size.
    assert!(gauge.peak() >= 1);
    assert!(gauge.peak() <= 4);
}

#[test]
fn test_spin_mode_runs_to_quiescence() {
    let scheduler = TaskScheduler::with_config(SchedulerConfig {
        num_threads: 2,
        wait_mode: WaitMode::Spin,
    });
    let counter = Arc::new(CountingProbe::new());
    let log = Arc::new(SequenceLog::new());

    let a = scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("A", log.clone())), 5, &[]);
    scheduler.run_async_with_deps(Arc::new(LabeledProbe::new("B", log.clone())), 5, &[a]);
    scheduler.run(counter.clone(), 100);

    assert_eq!(counter.count(), 100);
    assert_eq!(log.events().len(), 10);
    assert!(log.all_before("A", "B"));
}

#[test]
fn test_concurrent_submitters() {
    let scheduler = Arc::new(TaskScheduler::new(4));
    let counter = Arc::new(CountingProbe::new());
    let ids = Arc::new(Mutex::new(Vec::new()));

    let mut submitters = Vec::new();
    for _ in 0..4 {
        let scheduler = Arc::clone(&scheduler);
        let counter = Arc::clone(&counter);
        let ids = Arc::clone(&ids);
        submitters.push(thread::spawn(move || {
            for _ in 0..25 {
                let id = scheduler.run_async_with_deps(counter.clone(), 10, &[]);
                ids.lock().unwrap().push(id);
            }
        }));
    }
    for handle in submitters {
        handle.join().unwrap();
    }
    scheduler.sync();

    assert_eq!(counter.count(), 4 * 25 * 10);
    let mut ids = ids.lock().unwrap().clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100, "ids must be unique across submitters");
}

#[test]
fn test_layered_dag_stress() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    const LAYERS: usize = 6;
    const WIDTH: usize = 8;

    let mut rng = StdRng::seed_from_u64(0x10C4_57E9);
    let scheduler = TaskScheduler::new(4);
    let log = Arc::new(SequenceLog::new());

    let mut totals: Vec<(String, usize)> = Vec::new();
    let mut previous_layer: Vec<(TaskId, String, usize)> = Vec::new();
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut expected_events = 0usize;

    for layer in 0..LAYERS {
        let mut current = Vec::new();
        for slot in 0..WIDTH {
            let label = format!("t{layer}x{slot}");
            let total = rng.gen_range(0..=4);

            let mut deps = Vec::new();
            for (dep_id, dep_label, dep_total) in &previous_layer {
                if rng.gen_bool(0.4) {
                    deps.push(*dep_id);
                    if *dep_total > 0 && total > 0 {
                        edges.push((dep_label.clone(), label.clone()));
                    }
                }
            }

            let id = scheduler.run_async_with_deps(
                Arc::new(LabeledProbe::new(label.clone(), log.clone())),
                total,
                &deps,
            );
            expected_events += total;
            totals.push((label.clone(), total));
            current.push((id, label, total));
        }
        previous_layer = current;
    }
    scheduler.sync();

    assert_eq!(log.events().len(), expected_events);
    for (label, total) in &totals {
        assert_eq!(
            log.stamps_for(label).len(),
            *total,
            "{label} must run exactly {total} times"
        );
    }
    for (earlier, later) in &edges {
        assert!(
            log.all_before(earlier, later),
            "{earlier} must fully precede {later}"
        );
    }
}

#[test]
fn test_single_worker_drains_fifo() {
    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }
    impl Runnable for Recorder {
        fn run_task(&self, index: usize, _total: usize) {
            self.seen.lock().unwrap().push(index);
        }
    }

    // With one worker there is no reordering by races: the pop order is the
    // execution order, and FIFO expansion makes it 0, 1, 2, ...
    let scheduler = TaskScheduler::new(1);
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });

    scheduler.run(recorder.clone(), 16);

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(*seen, (0..16).collect::<Vec<_>>());
}
