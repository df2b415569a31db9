//! Cycle runner: cart → slots → pricing → race, looped until an order is
//! placed or the governing window tells it to stop.
//!
//! Stop is cooperative. It is checked at every iteration boundary (before a
//! cycle starts and before slots are re-fetched after a lost race) and cuts
//! retry waits short, but it never interrupts a race that is in flight.

use std::sync::Arc;
use std::time::Duration;

use crate::context::AttemptContext;
use crate::envelope::Envelope;
use crate::error::EngineError;
use crate::events::{emit_best_effort, EngineEvent, EventSink, NullSink};
use crate::jitter::Jitter;
use crate::race::{RaceOutcome, SlotRace};
use crate::retry::StatusRetryPolicy;
use crate::signal::Signal;
use crate::storefront::Storefront;
use crate::Sleeper;

/// Wait after an empty cart.
pub const NO_PRODUCT_WAIT: Duration = Duration::from_secs(30);
/// Bounds, in seconds, of the randomized wait after finding no slot.
pub const NO_SLOT_WAIT_SECS: (u64, u64) = (3, 8);

/// How one cycle invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A race created at least one order.
    Succeeded(RaceOutcome),
    /// Stop was observed between races.
    Stopped,
}

/// How a runner ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// An order was placed. `after_stop` is set when Stop had already been
    /// posted by the time the winning race finished: the race was launched
    /// inside the window but completed after it closed.
    Succeeded { winners: usize, after_stop: bool },
    /// The window closed before any order was placed.
    OutOfPeriod,
}

impl RunOutcome {
    /// Orders placed by the run; zero when it ran out of its window.
    pub fn winners(&self) -> usize {
        match *self {
            RunOutcome::Succeeded { winners, .. } => winners,
            RunOutcome::OutOfPeriod => 0,
        }
    }
}

/// Drives attempt cycles for one session.
#[derive(Clone)]
pub struct CycleRunner<S = NullSink> {
    store: Arc<dyn Storefront>,
    retry: StatusRetryPolicy,
    race: SlotRace,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
    no_product_wait: Duration,
    no_slot_jitter: Jitter,
}

impl<S> std::fmt::Debug for CycleRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleRunner")
            .field("retry", &self.retry)
            .field("no_product_wait", &self.no_product_wait)
            .field("no_slot_jitter", &self.no_slot_jitter)
            .finish_non_exhaustive()
    }
}

impl CycleRunner<NullSink> {
    /// Runner whose waits go through the retry policy's sleeper.
    pub fn new(store: Arc<dyn Storefront>, retry: StatusRetryPolicy) -> Self {
        let (min_secs, max_secs) = NO_SLOT_WAIT_SECS;
        Self {
            race: SlotRace::new(store.clone(), retry.clone()),
            sleeper: retry.sleeper(),
            store,
            retry,
            sink: NullSink,
            no_product_wait: NO_PRODUCT_WAIT,
            no_slot_jitter: Jitter::Uniform { min_secs, max_secs },
        }
    }
}

impl<S: EventSink> CycleRunner<S> {
    /// Replace the event sink.
    pub fn with_sink<T: EventSink>(self, sink: T) -> CycleRunner<T> {
        CycleRunner {
            store: self.store,
            retry: self.retry,
            race: self.race,
            sleeper: self.sleeper,
            sink,
            no_product_wait: self.no_product_wait,
            no_slot_jitter: self.no_slot_jitter,
        }
    }

    pub fn with_no_slot_jitter(mut self, jitter: Jitter) -> Self {
        self.no_slot_jitter = jitter;
        self
    }

    pub fn with_no_product_wait(mut self, wait: Duration) -> Self {
        self.no_product_wait = wait;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    /// Wait the runner applies after `err`, or `None` when it retries at once.
    pub fn retry_delay(&self, err: &EngineError) -> Option<Duration> {
        match err {
            EngineError::NoValidProduct => Some(self.no_product_wait),
            EngineError::NoReserveTime => Some(self.no_slot_jitter.apply(Duration::ZERO)),
            _ => None,
        }
    }

    /// One cycle invocation.
    pub async fn run_cycle(
        &self,
        ctx: &AttemptContext,
        stop: &Signal,
        completion: &Signal,
    ) -> Result<CycleOutcome, EngineError> {
        tracing::info!("=====> fetching valid cart items");
        self.retry
            .execute(|| self.store.select_all_cart_items(ctx))
            .await
            .map_err(EngineError::SelectCart)?;
        let cart = self
            .retry
            .execute(|| self.store.fetch_cart(ctx))
            .await
            .and_then(Envelope::into_payload)
            .map_err(EngineError::FetchCart)?;
        if cart.is_empty() {
            return Err(EngineError::NoValidProduct);
        }
        for (idx, item) in cart.items.iter().enumerate() {
            tracing::info!(idx, name = %item.name, count = item.count, total = %item.total_price, "cart item");
        }
        let cart = Arc::new(cart);

        loop {
            if stop.is_posted() {
                return Ok(CycleOutcome::Stopped);
            }

            tracing::info!("=====> fetching reservable times");
            let slots = self
                .retry
                .execute(|| self.store.fetch_candidate_slots(ctx, &cart))
                .await
                .and_then(Envelope::into_payload)
                .map_err(EngineError::FetchSlots)?;
            if slots.is_empty() {
                return Err(EngineError::NoReserveTime);
            }
            tracing::info!(count = slots.len(), "found reservable delivery slots");

            tracing::info!("=====> checking order");
            let pricing = self
                .retry
                .execute(|| self.store.price_order(ctx, &cart, &slots))
                .await
                .and_then(Envelope::into_payload)
                .map_err(EngineError::Pricing)?;
            tracing::info!(total = %pricing.total, "order total");

            let outcome =
                self.race.race(ctx, cart.clone(), Arc::new(pricing), &slots, completion).await;
            emit_best_effort(
                self.sink.clone(),
                EngineEvent::RaceFinished { branches: outcome.branches(), winners: outcome.winners() },
            )
            .await;
            if outcome.succeeded() {
                return Ok(CycleOutcome::Succeeded(outcome));
            }
            tracing::warn!(branches = outcome.branches(), "every submission failed, refreshing slots");
        }
    }

    /// Loop cycles until one places an order or `stop` is observed.
    ///
    /// Every winning race branch posts `completion` as soon as its order is
    /// created, before the remaining branches are joined; callers read it to
    /// learn that an order exists.
    pub async fn run(&self, ctx: &AttemptContext, stop: &Signal, completion: &Signal) -> RunOutcome {
        loop {
            tokio::task::yield_now().await;
            if stop.is_posted() {
                tracing::error!("no order placed within the current window, waiting for the next one");
                return RunOutcome::OutOfPeriod;
            }

            let err = match self.run_cycle(ctx, stop, completion).await {
                Ok(CycleOutcome::Succeeded(outcome)) => {
                    let after_stop = stop.is_posted();
                    if after_stop {
                        tracing::warn!("order placed after the window closed");
                    }
                    return RunOutcome::Succeeded { winners: outcome.winners(), after_stop };
                }
                Ok(CycleOutcome::Stopped) => continue,
                Err(err) => err,
            };

            emit_best_effort(self.sink.clone(), EngineEvent::CycleFailed { reason: err.to_string() })
                .await;
            match self.retry_delay(&err) {
                Some(delay) if matches!(err, EngineError::NoValidProduct) => {
                    tracing::error!(
                        wait_secs = delay.as_secs(),
                        "no valid product in cart, add or select items in the app first"
                    );
                    self.wait_or_stop(delay, stop).await;
                }
                Some(delay) => {
                    tracing::warn!(wait_secs = delay.as_secs(), "no reservable time yet");
                    self.wait_or_stop(delay, stop).await;
                }
                None => tracing::error!(error = %err, "cycle failed"),
            }
        }
    }

    async fn wait_or_stop(&self, delay: Duration, stop: &Signal) {
        tokio::select! {
            _ = self.sleeper.sleep(delay) => {}
            _ = stop.wait() => {}
        }
    }
}
