//! Convenient re-exports for wiring an engine.
pub use crate::{
    config::{Config, ConfigError},
    context::{AttemptContext, CartSnapshot, OrderPricing, PaymentMethod, ReserveSlot, UserId},
    cycle::{CycleRunner, RunOutcome},
    engine::Engine,
    envelope::Envelope,
    error::{EngineError, ExecuteError, TransportError},
    events::{EngineEvent, EventSink, LogSink, MemorySink, NullSink},
    retry::{StatusRetryLayer, StatusRetryPolicy},
    scheduler::{Launcher, PeriodScheduler},
    signal::Signal,
    storefront::{Reply, Storefront, SuccessCue},
    window::ActiveWindow,
};
