#![allow(missing_docs)]

mod common;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveTime;
use common::{context, ok, Script, ScriptedStore};
use futures::future::BoxFuture;
use slotrace::events::{EngineEvent, MemorySink};
use slotrace::scheduler::RunResult;
use slotrace::{
    ActiveWindow, CycleRunner, EngineError, InstantSleeper, ManualClock, PeriodScheduler, PeriodState,
    RunOutcome, Signal, Sleeper, StatusRetryPolicy, Transition, WallClock,
};

/// Sleeper that moves a manual clock forward instead of waiting.
#[derive(Debug, Clone)]
struct ClockSleeper {
    clock: ManualClock,
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl ClockSleeper {
    fn new(clock: ManualClock) -> Self {
        Self { clock, calls: Arc::new(Mutex::new(Vec::new())) }
    }

    fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

impl Sleeper for ClockSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.calls.lock().unwrap().push(duration);
        self.clock.advance_secs(duration.as_secs() as i64);
        Box::pin(tokio::task::yield_now())
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn window() -> Vec<ActiveWindow> {
    vec![ActiveWindow::parse(0, "09:58", "10:02").unwrap()]
}

/// Launcher running a cycle runner that never finds a slot, recording outcomes.
fn slotless_launcher(
    launches: Arc<AtomicUsize>,
    outcomes: Arc<Mutex<Vec<RunOutcome>>>,
) -> impl Fn(Signal) -> BoxFuture<'static, RunResult> + Send + Sync + 'static {
    let store = Arc::new(ScriptedStore::new().with_slots(Script::always(ok(Vec::new()))));
    let policy = StatusRetryPolicy::builder().with_sleeper(InstantSleeper).build();
    let runner = Arc::new(CycleRunner::new(store, policy));
    move |stop: Signal| -> BoxFuture<'static, RunResult> {
        launches.fetch_add(1, Ordering::SeqCst);
        let runner = runner.clone();
        let outcomes = outcomes.clone();
        Box::pin(async move {
            let outcome = runner.run(&context(), &stop, &Signal::new()).await;
            outcomes.lock().unwrap().push(outcome);
            Ok(outcome)
        })
    }
}

#[tokio::test]
async fn window_activates_once_and_stop_ends_runner_out_of_period() {
    let launches = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let clock = ManualClock::at(9, 58, 0);
    let sink = MemorySink::new();
    let mut scheduler = PeriodScheduler::new(
        window(),
        Arc::new(slotless_launcher(launches.clone(), outcomes.clone())),
        Arc::new(clock.clone()),
        Arc::new(InstantSleeper),
    )
    .with_sink(sink.clone());

    assert_eq!(scheduler.tick().await, vec![Transition::Activate { window: 0 }]);
    assert_eq!(scheduler.state(), PeriodState::Active { window: 0 });
    let stop = scheduler.active_stop().unwrap();
    assert!(!stop.is_posted());

    for now in [hm(9, 59), hm(10, 0), hm(10, 1)] {
        clock.set(now);
        assert!(scheduler.tick().await.is_empty());
        assert!(!stop.is_posted());
    }
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    clock.set(hm(10, 2));
    assert_eq!(scheduler.tick().await, vec![Transition::Deactivate { window: 0 }]);
    assert!(stop.is_posted());
    assert_eq!(scheduler.state(), PeriodState::Idle);
    assert!(scheduler.active_stop().is_none());

    let retired = scheduler.take_retired();
    assert_eq!(retired.len(), 1);
    let (idx, handle) = retired.into_iter().next().unwrap();
    assert_eq!(idx, 0);
    assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::OutOfPeriod);
    assert_eq!(*outcomes.lock().unwrap(), vec![RunOutcome::OutOfPeriod]);
    assert_eq!(
        sink.events(),
        vec![EngineEvent::WindowOpened { window: 0 }, EngineEvent::WindowClosed { window: 0 }]
    );

    clock.set(hm(10, 3));
    assert!(scheduler.tick().await.is_empty());
    assert_eq!(launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn each_window_gets_a_fresh_stop_signal() {
    let launches = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let clock = ManualClock::at(5, 59, 0);
    let mut scheduler = PeriodScheduler::new(
        vec![
            ActiveWindow::parse(0, "05:59", "06:10").unwrap(),
            ActiveWindow::parse(1, "08:28", "08:35").unwrap(),
        ],
        Arc::new(slotless_launcher(launches.clone(), outcomes.clone())),
        Arc::new(clock.clone()),
        Arc::new(InstantSleeper),
    );

    scheduler.tick().await;
    let first = scheduler.active_stop().unwrap();
    clock.set(hm(6, 10));
    scheduler.tick().await;
    clock.set(hm(8, 28));
    assert_eq!(scheduler.tick().await, vec![Transition::Activate { window: 1 }]);
    let second = scheduler.active_stop().unwrap();

    assert!(first.is_posted());
    assert!(!second.is_posted());
    assert!(!first.same_as(&second));
    assert_eq!(launches.load(Ordering::SeqCst), 2);

    for (_, handle) in scheduler.take_retired() {
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::OutOfPeriod);
    }
    second.post();
}

#[tokio::test]
async fn no_window_runs_once_immediately() {
    let launches = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(ScriptedStore::new());
    let policy = StatusRetryPolicy::builder().with_sleeper(InstantSleeper).build();
    let runner = Arc::new(CycleRunner::new(store, policy));
    let counter = launches.clone();
    let launcher = move |stop: Signal| -> BoxFuture<'static, RunResult> {
        counter.fetch_add(1, Ordering::SeqCst);
        let runner = runner.clone();
        Box::pin(async move { Ok(runner.run(&context(), &stop, &Signal::new()).await) })
    };
    // a clock far from any boundary: no alignment wait may happen
    let scheduler = PeriodScheduler::new(
        Vec::new(),
        Arc::new(launcher),
        Arc::new(ManualClock::at(3, 17, 42)),
        Arc::new(InstantSleeper),
    );

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome, RunOutcome::Succeeded { winners: 2, after_stop: false });
    assert_eq!(launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn alignment_waits_for_the_minute_boundary() {
    let clock = ManualClock::at(9, 57, 30);
    let launches = Arc::new(AtomicUsize::new(0));
    let scheduler = PeriodScheduler::new(
        window(),
        Arc::new(slotless_launcher(launches, Arc::new(Mutex::new(Vec::new())))),
        Arc::new(clock.clone()),
        Arc::new(ClockSleeper::new(clock.clone())),
    );

    scheduler.align_to_minute().await;

    assert_eq!(clock.now(), hm(9, 58));
}

#[tokio::test]
async fn run_loop_opens_and_closes_the_window() {
    let clock = ManualClock::at(9, 57, 30);
    let launches = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = MemorySink::new();
    let scheduler = PeriodScheduler::new(
        window(),
        Arc::new(slotless_launcher(launches.clone(), outcomes.clone())),
        Arc::new(clock.clone()),
        Arc::new(ClockSleeper::new(clock.clone())),
    )
    .with_sink(sink.clone());

    let running = tokio::spawn(scheduler.run());
    common::eventually(|| !outcomes.lock().unwrap().is_empty()).await;
    running.abort();

    let events = sink.events();
    assert_eq!(events[0], EngineEvent::WindowOpened { window: 0 });
    assert_eq!(events[1], EngineEvent::WindowClosed { window: 0 });
    assert_eq!(outcomes.lock().unwrap()[0], RunOutcome::OutOfPeriod);
}

#[tokio::test]
async fn adjacent_windows_hand_over_in_one_tick() {
    let launches = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let clock = ManualClock::at(10, 0, 0);
    let sink = MemorySink::new();
    let mut scheduler = PeriodScheduler::new(
        vec![
            ActiveWindow::parse(0, "10:00", "10:30").unwrap(),
            ActiveWindow::parse(1, "10:30", "11:00").unwrap(),
        ],
        Arc::new(slotless_launcher(launches.clone(), outcomes)),
        Arc::new(clock.clone()),
        Arc::new(InstantSleeper),
    )
    .with_sink(sink.clone());

    scheduler.tick().await;
    let first = scheduler.active_stop().unwrap();
    clock.set(hm(10, 30));

    assert_eq!(
        scheduler.tick().await,
        vec![Transition::Deactivate { window: 0 }, Transition::Activate { window: 1 }]
    );
    assert_eq!(scheduler.state(), PeriodState::Active { window: 1 });
    assert!(first.is_posted());
    assert!(!scheduler.active_stop().unwrap().is_posted());
    assert_eq!(launches.load(Ordering::SeqCst), 2);
    assert_eq!(
        sink.events(),
        vec![
            EngineEvent::WindowOpened { window: 0 },
            EngineEvent::WindowClosed { window: 0 },
            EngineEvent::WindowOpened { window: 1 },
        ]
    );
    for (_, handle) in scheduler.take_retired() {
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::OutOfPeriod);
    }
}

#[tokio::test]
async fn failed_runner_is_relaunched_inside_its_window() {
    let launches = Arc::new(AtomicUsize::new(0));
    let ended = Arc::new(AtomicUsize::new(0));
    let clock = ManualClock::at(9, 58, 0);
    let (counter, done) = (launches.clone(), ended.clone());
    let launcher = move |_stop: Signal| -> BoxFuture<'static, RunResult> {
        counter.fetch_add(1, Ordering::SeqCst);
        let done = done.clone();
        Box::pin(async move {
            done.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::NoAddress)
        })
    };
    let mut scheduler = PeriodScheduler::new(
        vec![ActiveWindow::parse(0, "09:58", "10:30").unwrap()],
        Arc::new(launcher),
        Arc::new(clock.clone()),
        Arc::new(InstantSleeper),
    );

    assert_eq!(scheduler.tick().await, vec![Transition::Activate { window: 0 }]);
    common::eventually(|| ended.load(Ordering::SeqCst) == 1).await;

    clock.set(hm(9, 59));
    assert_eq!(scheduler.tick().await, vec![Transition::Activate { window: 0 }]);
    assert_eq!(scheduler.state(), PeriodState::Active { window: 0 });
    assert_eq!(launches.load(Ordering::SeqCst), 2);

    common::eventually(|| ended.load(Ordering::SeqCst) == 2).await;
    clock.set(hm(10, 0));
    assert_eq!(scheduler.tick().await, vec![Transition::Activate { window: 0 }]);
    assert_eq!(launches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn successful_runner_keeps_its_window_active() {
    let launches = Arc::new(AtomicUsize::new(0));
    let ended = Arc::new(AtomicUsize::new(0));
    let clock = ManualClock::at(9, 58, 0);
    let (counter, done) = (launches.clone(), ended.clone());
    let launcher = move |_stop: Signal| -> BoxFuture<'static, RunResult> {
        counter.fetch_add(1, Ordering::SeqCst);
        let done = done.clone();
        Box::pin(async move {
            done.fetch_add(1, Ordering::SeqCst);
            Ok(RunOutcome::Succeeded { winners: 1, after_stop: false })
        })
    };
    let mut scheduler = PeriodScheduler::new(
        vec![ActiveWindow::parse(0, "09:58", "10:30").unwrap()],
        Arc::new(launcher),
        Arc::new(clock.clone()),
        Arc::new(InstantSleeper),
    );

    scheduler.tick().await;
    common::eventually(|| ended.load(Ordering::SeqCst) == 1).await;

    for now in [hm(9, 59), hm(10, 0), hm(10, 29)] {
        clock.set(now);
        assert!(scheduler.tick().await.is_empty());
        assert_eq!(scheduler.state(), PeriodState::Active { window: 0 });
    }
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    clock.set(hm(10, 30));
    assert_eq!(scheduler.tick().await, vec![Transition::Deactivate { window: 0 }]);
}

#[tokio::test]
async fn slow_tick_does_not_drift_off_the_minute() {
    let clock = ManualClock::at(9, 58, 0);
    let sleeper = ClockSleeper::new(clock.clone());
    let slow = clock.clone();
    // launching takes seven seconds of wall time
    let launcher = move |stop: Signal| -> BoxFuture<'static, RunResult> {
        slow.advance_secs(7);
        Box::pin(async move {
            stop.wait().await;
            Ok(RunOutcome::OutOfPeriod)
        })
    };
    let scheduler = PeriodScheduler::new(
        window(),
        Arc::new(launcher),
        Arc::new(clock.clone()),
        Arc::new(sleeper.clone()),
    );

    let running = tokio::spawn(scheduler.run());
    common::eventually(|| sleeper.calls().len() >= 3).await;
    running.abort();

    let calls = sleeper.calls();
    assert_eq!(calls[0], Duration::from_secs(53));
    assert_eq!(calls[1], Duration::from_secs(60));
    assert_eq!(calls[2], Duration::from_secs(60));
}
