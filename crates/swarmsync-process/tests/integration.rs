use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use swarmsync_process::{
    AsyncComponent, ExecutorOptions, Process, ProcessComponent, ProcessError, ProcessExecutionError,
    ProcessExecutor, ProcessListener, ProcessState, ProcessStep, RollbackReason, SequentialProcess, Step,
    StepContext,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal { Arc::new(Mutex::new(Vec::new())) }

fn entries(journal: &Journal) -> Vec<String> { journal.lock().unwrap().clone() }

struct Record {
    label:   &'static str,
    fail:    bool,
    journal: Journal,
}

impl Record {
    fn ok(label: &'static str, journal: &Journal) -> Arc<Step<Self>> {
        Step::new(Self {
            label,
            fail: false,
            journal: journal.clone(),
        })
    }

    fn failing(label: &'static str, journal: &Journal) -> Arc<Step<Self>> {
        Step::new(Self {
            label,
            fail: true,
            journal: journal.clone(),
        })
    }
}

impl ProcessStep for Record {
    fn name(&self) -> &str { self.label }

    fn execute(&self, _ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        self.journal.lock().unwrap().push(format!("exec {}", self.label));
        if self.fail {
            return Err(ProcessExecutionError::new(format!("{} broke", self.label)));
        }
        Ok(())
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> Result<(), ProcessExecutionError> {
        self.journal.lock().unwrap().push(format!("undo {}", self.label));
        Ok(())
    }
}

#[derive(Default)]
struct Outcome {
    succeeded: AtomicUsize,
    failed:    Mutex<Vec<RollbackReason>>,
}

impl Outcome {
    fn failures(&self) -> usize { self.failed.lock().unwrap().len() }

    fn total(&self) -> usize { self.succeeded.load(Ordering::SeqCst) + self.failures() }
}

impl ProcessListener for Outcome {
    fn on_succeeded(&self) { self.succeeded.fetch_add(1, Ordering::SeqCst); }

    fn on_failed(&self, reason: &RollbackReason) { self.failed.lock().unwrap().push(reason.clone()); }
}

fn executor() -> ProcessExecutor { ProcessExecutor::new(ExecutorOptions::new().workers(4)).unwrap() }

#[test]
fn start_is_a_one_way_gate() {
    let journal = journal();
    let process = SequentialProcess::new("root");
    process.add(Record::ok("a", &journal)).unwrap();

    process.start().unwrap();
    let err = process.start().unwrap_err();
    assert!(matches!(err, ProcessError::InvalidState { state: ProcessState::Succeeded, .. }));
    assert_eq!(entries(&journal), vec!["exec a"]);
}

#[test]
fn sequential_runs_in_order() {
    let journal = journal();
    let process = SequentialProcess::new("root");
    for label in ["a", "b", "c"] {
        process.add(Record::ok(label, &journal)).unwrap();
    }
    let outcome = Arc::new(Outcome::default());
    process.attach_listener(outcome.clone());

    process.start().unwrap();

    assert_eq!(process.state(), ProcessState::Succeeded);
    assert_eq!(entries(&journal), vec!["exec a", "exec b", "exec c"]);
    assert_eq!(outcome.succeeded.load(Ordering::SeqCst), 1);
    assert_eq!(process.progress(), 1.0);
}

#[test]
fn failure_compensates_started_children_in_reverse() {
    let journal = journal();
    let a = Record::ok("a", &journal);
    let b = Record::failing("b", &journal);
    let c = Record::ok("c", &journal);
    let process = SequentialProcess::with_children("root", [
        a.clone() as Arc<dyn ProcessComponent>,
        b.clone(),
        c.clone(),
    ])
    .unwrap();
    let outcome = Arc::new(Outcome::default());
    process.attach_listener(outcome.clone());

    process.start().unwrap();

    assert_eq!(entries(&journal), vec!["exec a", "exec b", "undo b", "undo a"]);
    assert_eq!(process.state(), ProcessState::Failed);
    assert_eq!(a.state(), ProcessState::Failed);
    assert_eq!(b.state(), ProcessState::Failed);
    assert_eq!(c.state(), ProcessState::Ready);

    let failed = outcome.failed.lock().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].component(), b.id());
    assert_eq!(failed[0].hint(), "b broke");
    assert_eq!(outcome.succeeded.load(Ordering::SeqCst), 0);
}

#[test]
fn nested_failure_rolls_back_from_the_root() {
    let journal = journal();
    let inner = SequentialProcess::new("inner");
    inner.add(Record::ok("x", &journal)).unwrap();
    inner.add(Record::failing("y", &journal)).unwrap();

    let root = SequentialProcess::new("root");
    root.add(Record::ok("a", &journal)).unwrap();
    root.add(inner.clone()).unwrap();
    root.add(Record::ok("z", &journal)).unwrap();

    let root_outcome = Arc::new(Outcome::default());
    let inner_outcome = Arc::new(Outcome::default());
    root.attach_listener(root_outcome.clone());
    inner.attach_listener(inner_outcome.clone());

    root.start().unwrap();

    assert_eq!(entries(&journal), vec!["exec a", "exec x", "exec y", "undo y", "undo x", "undo a"]);
    assert_eq!(root.state(), ProcessState::Failed);
    assert_eq!(inner.state(), ProcessState::Failed);
    assert_eq!(root_outcome.failures(), 1);
    assert_eq!(inner_outcome.failures(), 1);
    assert_eq!(root_outcome.failed.lock().unwrap()[0].component_name(), "y");
}

#[test]
fn cancel_twice_is_a_noop() {
    let journal = journal();
    let process = SequentialProcess::new("root");
    process.add(Record::ok("a", &journal)).unwrap();
    process.start().unwrap();

    let outcome = Arc::new(Outcome::default());
    process.attach_listener(outcome.clone());
    let reason = RollbackReason::new(process.id(), "user", "cancelled by user");
    process.cancel(reason.clone()).unwrap();
    process.cancel(reason).unwrap();

    assert_eq!(process.state(), ProcessState::Failed);
    assert_eq!(entries(&journal), vec!["exec a", "undo a"]);
    assert_eq!(outcome.failures(), 1);
}

#[test]
fn step_can_schedule_follow_up_work() {
    struct Planner(Journal);

    impl ProcessStep for Planner {
        fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
            ctx.insert_after_self(Record::ok("next", &self.0))?;
            ctx.append_to_parent(Record::ok("last", &self.0))?;
            Ok(())
        }
    }

    let journal = journal();
    let process = SequentialProcess::new("root");
    process.add(Step::new(Planner(journal.clone()))).unwrap();
    process.add(Record::ok("planned", &journal)).unwrap();

    process.start().unwrap();

    assert_eq!(process.state(), ProcessState::Succeeded);
    assert_eq!(entries(&journal), vec!["exec next", "exec planned", "exec last"]);
    assert_eq!(process.len(), 4);
}

#[test]
fn async_failure_reaches_decorator_listeners() {
    let journal = journal();
    let failing = Record::failing("remote", &journal);
    let wrapped_outcome = Arc::new(Outcome::default());
    failing.attach_listener(wrapped_outcome.clone());

    let component = AsyncComponent::new(failing.clone(), executor());
    let outcome = Arc::new(Outcome::default());
    component.attach_listener(outcome.clone());

    component.start().unwrap();
    component.await_completion(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(component.state(), ProcessState::Failed);
    assert_eq!(failing.state(), ProcessState::Failed);
    assert_eq!(wrapped_outcome.failures(), 1);
    assert_eq!(outcome.failures(), 1);
    assert_eq!(outcome.failed.lock().unwrap()[0].hint(), "remote broke");
    assert_eq!(entries(&journal), vec!["exec remote", "undo remote"]);
}

#[test]
fn async_failure_rolls_back_sequential_parent() {
    let journal = journal();
    let first = Record::ok("first", &journal);
    let remote = AsyncComponent::new(Record::failing("remote", &journal), executor());

    let root = SequentialProcess::new("root");
    root.add(first.clone()).unwrap();
    root.add(remote.clone()).unwrap();
    let outcome = Arc::new(Outcome::default());
    root.attach_listener(outcome.clone());

    root.start().unwrap();
    root.await_completion(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(root.state(), ProcessState::Failed);
    assert_eq!(remote.state(), ProcessState::Failed);
    assert_eq!(first.state(), ProcessState::Failed);
    assert_eq!(outcome.total(), 1);
    assert!(entries(&journal).contains(&"undo first".to_string()));
}

#[test]
fn async_success_lets_parent_succeed() {
    let journal = journal();
    let root = SequentialProcess::new("root");
    root.add(AsyncComponent::new(Record::ok("one", &journal), executor())).unwrap();
    root.add(AsyncComponent::new(Record::ok("two", &journal), executor())).unwrap();
    let outcome = Arc::new(Outcome::default());
    root.attach_listener(outcome.clone());

    root.start().unwrap();

    assert_eq!(root.state(), ProcessState::Succeeded);
    assert_eq!(outcome.succeeded.load(Ordering::SeqCst), 1);
    let mut seen = entries(&journal);
    seen.sort();
    assert_eq!(seen, vec!["exec one", "exec two"]);
}

#[test]
fn concurrent_sibling_failures_compensate_once() {
    struct Gate {
        label:   &'static str,
        barrier: Arc<Barrier>,
        journal: Journal,
    }

    impl ProcessStep for Gate {
        fn name(&self) -> &str { self.label }

        fn execute(&self, _ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
            self.barrier.wait();
            Err(ProcessExecutionError::new(format!("{} broke", self.label)))
        }

        fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> Result<(), ProcessExecutionError> {
            self.journal.lock().unwrap().push(format!("undo {}", self.label));
            Ok(())
        }
    }

    let journal = journal();
    let barrier = Arc::new(Barrier::new(2));
    let executor = executor();
    let root = SequentialProcess::new("root");
    root.add(Record::ok("base", &journal)).unwrap();
    for label in ["left", "right"] {
        let gate = Step::new(Gate {
            label,
            barrier: barrier.clone(),
            journal: journal.clone(),
        });
        root.add(AsyncComponent::new(gate, executor.clone())).unwrap();
    }
    let outcome = Arc::new(Outcome::default());
    root.attach_listener(outcome.clone());

    root.start().unwrap();
    root.await_completion(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(root.state(), ProcessState::Failed);
    assert_eq!(outcome.total(), 1);
    let seen = entries(&journal);
    assert_eq!(seen.iter().filter(|e| *e == "undo base").count(), 1);
    assert_eq!(seen.iter().filter(|e| *e == "undo left").count(), 1);
    assert_eq!(seen.iter().filter(|e| *e == "undo right").count(), 1);
}

#[test]
fn pause_holds_the_process_between_children() {
    struct Checkpointed {
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl ProcessStep for Checkpointed {
        fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
            self.entered.wait();
            self.release.wait();
            ctx.checkpoint();
            Ok(())
        }
    }

    let journal = journal();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let first = Step::new(Checkpointed {
        entered: entered.clone(),
        release: release.clone(),
    });
    let root = SequentialProcess::new("root");
    root.add(first.clone()).unwrap();
    root.add(Record::ok("second", &journal)).unwrap();

    let runner = {
        let root = root.clone();
        std::thread::spawn(move || root.start())
    };

    entered.wait();
    root.pause().unwrap();
    assert_eq!(root.state(), ProcessState::Paused);
    assert_eq!(first.state(), ProcessState::Paused);
    release.wait();

    std::thread::sleep(Duration::from_millis(50));
    assert!(entries(&journal).is_empty());

    root.resume().unwrap();
    runner.join().unwrap().unwrap();

    assert_eq!(root.state(), ProcessState::Succeeded);
    assert_eq!(entries(&journal), vec!["exec second"]);
}

#[test]
fn await_times_out_without_cancelling() {
    struct Slow;

    impl ProcessStep for Slow {
        fn execute(&self, _ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        }
    }

    let component = AsyncComponent::new(Step::new(Slow), executor());
    component.start().unwrap();

    let err = component.await_completion(Some(Duration::from_millis(10))).unwrap_err();
    assert!(matches!(err, ProcessError::Timeout(_)));

    component.await_completion(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(component.state(), ProcessState::Succeeded);
}

#[test]
fn nested_async_components_share_a_single_worker() {
    let journal = journal();
    let executor = ProcessExecutor::new(ExecutorOptions::new().workers(1)).unwrap();

    let deepest = SequentialProcess::new("deepest");
    deepest
        .add(AsyncComponent::new(Record::ok("leaf", &journal), executor.clone()))
        .unwrap();
    let middle = SequentialProcess::new("middle");
    middle
        .add(AsyncComponent::new(Record::ok("side", &journal), executor.clone()))
        .unwrap();
    middle.add(AsyncComponent::new(deepest, executor.clone())).unwrap();
    let root = AsyncComponent::new(middle, executor.clone());

    root.start().unwrap();
    root.await_completion(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(root.state(), ProcessState::Succeeded);
    assert_eq!(entries(&journal), vec!["exec side", "exec leaf"]);
}

#[test]
fn nested_async_failure_on_a_single_worker_rolls_back_everything() {
    let journal = journal();
    let executor = ProcessExecutor::new(ExecutorOptions::new().workers(1)).unwrap();

    let inner = SequentialProcess::new("inner");
    inner
        .add(AsyncComponent::new(Record::ok("stored", &journal), executor.clone()))
        .unwrap();
    inner
        .add(AsyncComponent::new(Record::failing("broken", &journal), executor.clone()))
        .unwrap();
    let root = AsyncComponent::new(inner, executor.clone());
    let outcome = Arc::new(Outcome::default());
    root.attach_listener(outcome.clone());

    root.start().unwrap();
    root.await_completion(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(root.state(), ProcessState::Failed);
    assert_eq!(outcome.total(), 1);
    let seen = entries(&journal);
    assert!(seen.contains(&"undo stored".to_string()), "{seen:?}");
    assert!(seen.contains(&"undo broken".to_string()), "{seen:?}");
}

#[test]
fn cancelled_async_component_never_starts_its_work() {
    let journal = journal();
    let executor = ProcessExecutor::new(ExecutorOptions::new().workers(1)).unwrap();

    // Keep the only worker busy so the component stays queued.
    let (hold, held) = std::sync::mpsc::channel::<()>();
    executor
        .spawn(move || {
            let _ = held.recv();
        })
        .unwrap();

    let wrapped = Record::ok("late", &journal);
    let component = AsyncComponent::new(wrapped.clone(), executor.clone());
    let outcome = Arc::new(Outcome::default());
    component.attach_listener(outcome.clone());

    component.start().unwrap();
    component
        .cancel(RollbackReason::new(component.id(), "test", "user gave up"))
        .unwrap();
    assert_eq!(component.state(), ProcessState::Failed);

    drop(hold);
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(wrapped.state(), ProcessState::Ready);
    assert!(entries(&journal).is_empty());
    assert_eq!(outcome.total(), 1);
}
