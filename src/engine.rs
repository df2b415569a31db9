//! Session-level wiring: prepares the attempt context, runs the cycle
//! runner under a Stop signal, and handles a placed order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::clock::WallClock;
use crate::config::Config;
use crate::context::{AddressRef, AttemptContext, PaymentMethod};
use crate::cycle::CycleRunner;
use crate::envelope::Envelope;
use crate::error::EngineError;
use crate::events::{emit_best_effort, EngineEvent, EventSink, LogSink};
use crate::retry::StatusRetryPolicy;
use crate::scheduler::{Launcher, PeriodScheduler, RunResult};
use crate::signal::Signal;
use crate::storefront::{SilentCue, Storefront, SuccessCue};
use crate::window::ActiveWindow;

/// How many times the "pay now" line is repeated after a placed order.
const SUCCESS_BANNER_REPEAT: usize = 10;

/// One racing session against a storefront.
pub struct Engine<S = LogSink> {
    store: Arc<dyn Storefront>,
    runner: CycleRunner<S>,
    retry: StatusRetryPolicy,
    cue: Arc<dyn SuccessCue>,
    payment: PaymentMethod,
    address_label: Option<String>,
    success_hold: Duration,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("payment", &self.payment)
            .field("address_label", &self.address_label)
            .field("success_hold", &self.success_hold)
            .finish_non_exhaustive()
    }
}

impl Engine<LogSink> {
    /// Build an engine from validated configuration, using `retry` for every call.
    pub fn new(
        store: Arc<dyn Storefront>,
        config: &Config,
        retry: StatusRetryPolicy,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            runner: CycleRunner::new(store.clone(), retry.clone()).with_sink(LogSink),
            store,
            retry,
            cue: Arc::new(SilentCue),
            payment: config.payment_method()?,
            address_label: config.address.clone(),
            success_hold: config.success_hold(),
        })
    }
}

impl<S: EventSink> Engine<S> {
    pub fn with_sink<T: EventSink>(self, sink: T) -> Engine<T> {
        Engine {
            runner: self.runner.with_sink(sink),
            store: self.store,
            retry: self.retry,
            cue: self.cue,
            payment: self.payment,
            address_label: self.address_label,
            success_hold: self.success_hold,
        }
    }

    pub fn with_cue(mut self, cue: Arc<dyn SuccessCue>) -> Self {
        self.cue = cue;
        self
    }

    /// Replace the cycle runner's tuning while keeping this engine's sink.
    pub fn map_runner(mut self, f: impl FnOnce(CycleRunner<S>) -> CycleRunner<S>) -> Self {
        self.runner = f(self.runner);
        self
    }

    /// Resolve identity, address and payment into the master context.
    pub async fn prepare(&self) -> Result<AttemptContext, EngineError> {
        let user = self
            .retry
            .execute(|| self.store.fetch_user())
            .await
            .and_then(Envelope::into_payload)
            .map_err(EngineError::FetchUser)?;
        let addresses = self
            .retry
            .execute(|| self.store.fetch_addresses(&user))
            .await
            .and_then(Envelope::into_payload)
            .map_err(EngineError::FetchAddresses)?;
        let address = choose_address(addresses, self.address_label.as_deref())?;
        tracing::info!(address = %address.label, "delivery address");
        tracing::info!(payment = %self.payment, "payment method");
        Ok(AttemptContext::new(user, address, self.payment))
    }

    /// Prepare, race until success or `stop`, then handle a placed order.
    pub async fn start(&self, stop: Signal) -> RunResult {
        let ctx = self.prepare().await?;
        let completion = Signal::new();
        let outcome = self.runner.run(&ctx, &stop, &completion).await;
        if completion.is_posted() {
            self.on_success(outcome.winners()).await;
        }
        Ok(outcome)
    }

    async fn on_success(&self, winners: usize) {
        for _ in 0..SUCCESS_BANNER_REPEAT {
            tracing::info!("order placed, pay for it as soon as possible!");
        }
        if winners > 1 {
            tracing::warn!(orders = winners, "several slots were won; check which order to pay");
        }
        emit_best_effort(self.runner.sink().clone(), EngineEvent::OrderPlaced { winners }).await;
        if let Err(e) = self.cue.play().await {
            tracing::warn!(error = %e, "failed to play success cue");
        }
        self.runner.sleeper().sleep(self.success_hold).await;
    }
}

/// Pick the delivery address: the only one, or the one matching the configured label.
fn choose_address(
    mut addresses: Vec<AddressRef>,
    label: Option<&str>,
) -> Result<AddressRef, EngineError> {
    match addresses.len() {
        0 => return Err(EngineError::NoAddress),
        1 => return Ok(addresses.remove(0)),
        _ => {}
    }
    if let Some(idx) = label.and_then(|l| addresses.iter().position(|a| a.label == l)) {
        return Ok(addresses.swap_remove(idx));
    }
    Err(EngineError::AddressSelection {
        requested: label.map(str::to_string),
        available: addresses.into_iter().map(|a| a.label).collect(),
    })
}

/// Scheduler launcher over a shared engine.
#[derive(Debug)]
pub struct SharedEngine<S = LogSink>(pub Arc<Engine<S>>);

impl<S: EventSink> Launcher for SharedEngine<S> {
    fn launch(&self, stop: Signal) -> BoxFuture<'static, RunResult> {
        let engine = self.0.clone();
        Box::pin(async move { engine.start(stop).await })
    }
}

impl<S: EventSink> Engine<S> {
    /// Scheduler that launches this engine once per active window.
    pub fn into_scheduler(
        self,
        windows: Vec<ActiveWindow>,
        clock: Arc<dyn WallClock>,
    ) -> PeriodScheduler<SharedEngine<S>, S> {
        let sleeper = self.runner.sleeper();
        let sink = self.runner.sink().clone();
        PeriodScheduler::new(windows, Arc::new(SharedEngine(Arc::new(self))), clock, sleeper)
            .with_sink(sink)
    }
}
