#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # slotrace
//!
//! Scheduled racing engine for booking scarce delivery slots on a remote
//! grocery-delivery service.
//!
//! ## Pieces
//!
//! - **Classifier / retry executor**: every call is retried according to the
//!   application `code` of the reply (congestion waits, crowding retries at
//!   once, unknown codes are capped, transport failures are final).
//! - **Slot race**: one concurrent submission per candidate slot, all joined,
//!   first success wins.
//! - **Cycle runner**: cart → slots → pricing → race, looped until an order
//!   is placed or Stop is observed.
//! - **Period scheduler**: opens and closes runners on daily windows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use slotrace::{Config, Engine, LocalClock, Storefront};
//!
//! # async fn demo(store: Arc<dyn Storefront>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("slotrace.json")?;
//! let engine = Engine::new(store, &config, config.retry_policy())?;
//! let outcome = engine.into_scheduler(config.windows()?, Arc::new(LocalClock)).run().await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod clock;
pub mod config;
pub mod context;
pub mod cycle;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod jitter;
pub mod prelude;
pub mod race;
pub mod retry;
pub mod scheduler;
pub mod signal;
pub mod sleeper;
pub mod storefront;
pub mod window;

// Re-exports
pub use classify::{classify, Classification};
pub use clock::{LocalClock, ManualClock, WallClock};
pub use config::{Config, ConfigError, PeriodSpec};
pub use context::{
    AddressRef, AttemptContext, CartItem, CartSnapshot, OrderPricing, PaymentMethod, ReserveSlot,
    UserId,
};
pub use cycle::{CycleOutcome, CycleRunner, RunOutcome};
pub use engine::{Engine, SharedEngine};
pub use envelope::Envelope;
pub use error::{EngineError, ExecuteError, TransportError};
pub use jitter::Jitter;
pub use race::{BranchError, RaceOutcome, SlotRace};
pub use retry::{StatusRetryLayer, StatusRetryPolicy, StatusRetryPolicyBuilder};
pub use scheduler::{Launcher, PeriodScheduler, PeriodState, PeriodTracker, Transition};
pub use signal::Signal;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use storefront::{Reply, SilentCue, Storefront, SuccessCue};
pub use window::ActiveWindow;
