//! Concurrent order submission across every candidate delivery slot.
//!
//! Each slot gets its own task and its own copy of the attempt context.
//! Every branch runs to completion: an order submission that is abandoned
//! mid-flight may still create an order remotely, so the race always joins
//! all branches before reporting. Several branches may win; the caller is
//! told how many so duplicate orders can be surfaced.

use std::sync::Arc;

use futures::future::join_all;

use crate::context::{AttemptContext, CartSnapshot, OrderPricing, ReserveSlot};
use crate::error::ExecuteError;
use crate::retry::StatusRetryPolicy;
use crate::signal::Signal;
use crate::storefront::Storefront;

/// Why one race branch did not create an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchError {
    #[error(transparent)]
    Submit(#[from] ExecuteError),
    /// The branch task panicked or was cancelled by the runtime.
    #[error("submission task aborted: {0}")]
    Aborted(String),
}

/// Aggregate result of one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    /// At least one branch created an order.
    AnySucceeded { winners: Vec<ReserveSlot>, failures: Vec<(ReserveSlot, BranchError)> },
    /// No branch created an order.
    AllFailed { failures: Vec<(ReserveSlot, BranchError)> },
}

impl RaceOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RaceOutcome::AnySucceeded { .. })
    }

    /// Number of orders created; more than one means duplicates to reconcile.
    pub fn winners(&self) -> usize {
        match self {
            RaceOutcome::AnySucceeded { winners, .. } => winners.len(),
            RaceOutcome::AllFailed { .. } => 0,
        }
    }

    pub fn branches(&self) -> usize {
        match self {
            RaceOutcome::AnySucceeded { winners, failures } => winners.len() + failures.len(),
            RaceOutcome::AllFailed { failures } => failures.len(),
        }
    }
}

/// Submits one order per slot and joins all of them.
#[derive(Clone)]
pub struct SlotRace {
    store: Arc<dyn Storefront>,
    retry: StatusRetryPolicy,
}

impl std::fmt::Debug for SlotRace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRace").field("retry", &self.retry).finish_non_exhaustive()
    }
}

impl SlotRace {
    pub fn new(store: Arc<dyn Storefront>, retry: StatusRetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Race every slot in `slots`. Each winning branch posts `completion`.
    pub async fn race(
        &self,
        base: &AttemptContext,
        cart: Arc<CartSnapshot>,
        pricing: Arc<OrderPricing>,
        slots: &[ReserveSlot],
        completion: &Signal,
    ) -> RaceOutcome {
        let handles: Vec<_> = slots
            .iter()
            .map(|&slot| {
                let ctx = base.for_slot(slot);
                let store = self.store.clone();
                let retry = self.retry.clone();
                let cart = cart.clone();
                let pricing = pricing.clone();
                let completion = completion.clone();
                tokio::spawn(async move {
                    tracing::info!(slot = %slot, "submitting order");
                    let submitted = retry
                        .execute(|| store.submit_order(&ctx, &cart, &pricing))
                        .await;
                    match submitted {
                        Ok(_) => {
                            completion.post();
                            tracing::info!(slot = %slot, "order submitted");
                            Ok(())
                        }
                        Err(e) => {
                            tracing::warn!(slot = %slot, error = %e, "order submission failed");
                            Err(BranchError::Submit(e))
                        }
                    }
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut failures = Vec::new();
        for (slot, joined) in slots.iter().copied().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(())) => winners.push(slot),
                Ok(Err(e)) => failures.push((slot, e)),
                Err(join) => failures.push((slot, BranchError::Aborted(join.to_string()))),
            }
        }

        if winners.is_empty() {
            RaceOutcome::AllFailed { failures }
        } else {
            RaceOutcome::AnySucceeded { winners, failures }
        }
    }
}
