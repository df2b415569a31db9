//! Period scheduler
//!
//! Each tick the scheduler looks at the wall clock and decides whether a
//! window has opened (launch a cycle runner with a freshly armed Stop
//! signal) or the active window has closed (post that runner's Stop). At
//! most one window is active at a time and a window is never activated
//! twice without a deactivation in between.
//!
//! Ticks land on minute boundaries: `run` first waits until the clock's
//! second is zero, then sleeps to the next boundary after each tick. A
//! runner that fails inside its window releases it, so the next tick
//! launches a new one. With no window configured the
//! scheduler runs a single runner immediately, with no time gating.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::clock::{secs_until_minute, until_next_minute, WallClock};
use crate::cycle::RunOutcome;
use crate::error::EngineError;
use crate::events::{emit_best_effort, EngineEvent, EventSink, NullSink};
use crate::signal::Signal;
use crate::window::ActiveWindow;
use crate::Sleeper;

/// Interval between scheduler ticks.
pub const TICK: Duration = Duration::from_secs(60);

/// Result of one runner.
pub type RunResult = Result<RunOutcome, EngineError>;

/// Starts a cycle runner governed by `stop`.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, stop: Signal) -> BoxFuture<'static, RunResult>;
}

impl<F> Launcher for F
where
    F: Fn(Signal) -> BoxFuture<'static, RunResult> + Send + Sync + 'static,
{
    fn launch(&self, stop: Signal) -> BoxFuture<'static, RunResult> {
        self(stop)
    }
}

/// Scheduler state at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    Idle,
    Active { window: usize },
}

/// State change decided at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate { window: usize },
    Deactivate { window: usize },
}

/// Pure Idle/Active state machine over a set of windows.
#[derive(Debug, Clone)]
pub struct PeriodTracker {
    windows: Vec<ActiveWindow>,
    state: PeriodState,
}

impl PeriodTracker {
    pub fn new(windows: Vec<ActiveWindow>) -> Self {
        Self { windows, state: PeriodState::Idle }
    }

    pub fn state(&self) -> PeriodState {
        self.state
    }

    pub fn windows(&self) -> &[ActiveWindow] {
        &self.windows
    }

    /// Evaluate the transition rule at `now`.
    ///
    /// An active window is released once `now` is past its end (or, after
    /// midnight, before its start again). In the same evaluation an idle
    /// tracker activates the first window containing `now`, so back-to-back
    /// windows hand over on the boundary minute.
    pub fn evaluate(&mut self, now: NaiveTime) -> Vec<Transition> {
        let mut transitions = Vec::with_capacity(2);
        if let PeriodState::Active { window } = self.state {
            if self.windows[window].contains(now) {
                return transitions;
            }
            self.state = PeriodState::Idle;
            transitions.push(Transition::Deactivate { window });
        }
        if let Some(window) = self.windows.iter().position(|w| w.contains(now)) {
            self.state = PeriodState::Active { window };
            transitions.push(Transition::Activate { window });
        }
        transitions
    }

    /// Return to `Idle` without a window change, so the next evaluation can
    /// activate the current window again.
    pub fn release(&mut self) -> Option<usize> {
        match std::mem::replace(&mut self.state, PeriodState::Idle) {
            PeriodState::Active { window } => Some(window),
            PeriodState::Idle => None,
        }
    }
}

struct ActiveRun {
    window: usize,
    stop: Signal,
    handle: JoinHandle<RunResult>,
}

/// Drives a [`PeriodTracker`] from a wall clock and launches runners.
pub struct PeriodScheduler<L, S = NullSink> {
    tracker: PeriodTracker,
    launcher: Arc<L>,
    clock: Arc<dyn WallClock>,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
    tick: Duration,
    active: Option<ActiveRun>,
    retired: Vec<(usize, JoinHandle<RunResult>)>,
}

impl<L, S> std::fmt::Debug for PeriodScheduler<L, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodScheduler")
            .field("tracker", &self.tracker)
            .field("tick", &self.tick)
            .field("retired", &self.retired.len())
            .finish_non_exhaustive()
    }
}

impl<L: Launcher> PeriodScheduler<L, NullSink> {
    pub fn new(
        windows: Vec<ActiveWindow>,
        launcher: Arc<L>,
        clock: Arc<dyn WallClock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            tracker: PeriodTracker::new(windows),
            launcher,
            clock,
            sleeper,
            sink: NullSink,
            tick: TICK,
            active: None,
            retired: Vec::new(),
        }
    }
}

impl<L: Launcher, S: EventSink> PeriodScheduler<L, S> {
    pub fn with_sink<T: EventSink>(self, sink: T) -> PeriodScheduler<L, T> {
        PeriodScheduler {
            tracker: self.tracker,
            launcher: self.launcher,
            clock: self.clock,
            sleeper: self.sleeper,
            sink,
            tick: self.tick,
            active: self.active,
            retired: self.retired,
        }
    }

    pub fn state(&self) -> PeriodState {
        self.tracker.state()
    }

    /// Stop signal of the runner governing the active window, if any.
    pub fn active_stop(&self) -> Option<Signal> {
        self.active.as_ref().map(|run| run.stop.clone())
    }

    /// Runners whose window has closed, with their window index.
    pub fn take_retired(&mut self) -> Vec<(usize, JoinHandle<RunResult>)> {
        std::mem::take(&mut self.retired)
    }

    /// Run forever (or once, when no window is configured).
    ///
    /// Each sleep is measured from the clock after the tick's work, so ticks
    /// stay on minute boundaries however long a tick takes.
    pub async fn run(mut self) -> RunResult {
        if self.tracker.windows().is_empty() {
            tracing::info!("no active window configured, starting immediately");
            return self.launcher.launch(Signal::new()).await;
        }

        self.align_to_minute().await;
        loop {
            self.tick().await;
            self.reap();
            self.sleeper.sleep(until_next_minute(self.clock.now())).await;
        }
    }

    /// Sleep until the wall clock sits on a minute boundary.
    pub async fn align_to_minute(&self) {
        loop {
            let wait = secs_until_minute(self.clock.now());
            if wait == 0 {
                return;
            }
            tracing::warn!(wait_secs = wait, "waiting for the minute boundary before scheduling");
            self.sleeper.sleep(Duration::from_secs(u64::from(wait))).await;
        }
    }

    /// Evaluate one tick and act on the resulting transitions.
    pub async fn tick(&mut self) -> Vec<Transition> {
        self.settle_finished_run().await;
        let now = self.clock.now();
        tracing::debug!(now = %now, "scheduler tick");
        let transitions = self.tracker.evaluate(now);
        for transition in &transitions {
            match *transition {
                Transition::Activate { window } => self.activate(window).await,
                Transition::Deactivate { window } => self.deactivate(window).await,
            }
        }
        transitions
    }

    /// Look at a runner that ended before its window did. A failed runner
    /// releases the window so this tick launches a fresh one; after an order
    /// the window stays active so no second order is attempted.
    async fn settle_finished_run(&mut self) {
        if !self.active.as_ref().is_some_and(|run| run.handle.is_finished()) {
            return;
        }
        let Some(run) = self.active.take() else {
            return;
        };
        let failed = match run.handle.await {
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                tracing::warn!(window = run.window, error = %e, "runner failed inside its window, relaunching");
                true
            }
            Err(e) => {
                tracing::warn!(window = run.window, error = %e, "runner aborted inside its window, relaunching");
                true
            }
        };
        if failed {
            self.tracker.release();
        }
    }

    async fn activate(&mut self, window: usize) {
        tracing::info!(window, range = %self.tracker.windows()[window], "window opened");
        let stop = Signal::new();
        let run = self.launcher.launch(stop.clone());
        let handle = tokio::spawn(async move {
            let result = run.await;
            match &result {
                Ok(RunOutcome::OutOfPeriod) => tracing::info!(window, "runner stopped at window end"),
                Ok(RunOutcome::Succeeded { winners, after_stop }) => {
                    tracing::info!(window, winners, after_stop, "runner placed an order")
                }
                Err(e) => tracing::error!(window, error = %e, "runner failed"),
            }
            result
        });
        if let Some(previous) = self.active.replace(ActiveRun { window, stop, handle }) {
            // a released runner is always taken first
            previous.stop.post();
            self.retired.push((previous.window, previous.handle));
        }
        emit_best_effort(self.sink.clone(), EngineEvent::WindowOpened { window }).await;
    }

    async fn deactivate(&mut self, window: usize) {
        tracing::info!(window, "window closed");
        if let Some(run) = self.active.take() {
            if run.stop.post() {
                tracing::info!(window, "stop posted to runner");
            }
            self.retired.push((run.window, run.handle));
        }
        emit_best_effort(self.sink.clone(), EngineEvent::WindowClosed { window }).await;
    }

    fn reap(&mut self) {
        self.retired.retain(|(_, handle)| !handle.is_finished());
    }
}
