//! Contracts for the remote service and other collaborators.
//!
//! Each `Storefront` method performs exactly one round-trip and reports the
//! raw envelope; retrying is the caller's job (see [`crate::retry`]).
//! Request building and signing live entirely in the implementation.

use async_trait::async_trait;

use crate::context::{AddressRef, AttemptContext, CartSnapshot, OrderPricing, ReserveSlot, UserId};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// Result of one round-trip.
pub type Reply<T> = Result<Envelope<T>, TransportError>;

/// Remote grocery-delivery service.
#[async_trait]
pub trait Storefront: Send + Sync {
    /// Identity of the logged-in account.
    async fn fetch_user(&self) -> Reply<UserId>;

    async fn fetch_addresses(&self, user: &UserId) -> Reply<Vec<AddressRef>>;

    /// Mark every cart line as selected for checkout.
    async fn select_all_cart_items(&self, ctx: &AttemptContext) -> Reply<serde_json::Value>;

    async fn fetch_cart(&self, ctx: &AttemptContext) -> Reply<CartSnapshot>;

    async fn fetch_candidate_slots(
        &self,
        ctx: &AttemptContext,
        cart: &CartSnapshot,
    ) -> Reply<Vec<ReserveSlot>>;

    /// Order check: validates the cart against the candidate slots and prices it.
    async fn price_order(
        &self,
        ctx: &AttemptContext,
        cart: &CartSnapshot,
        slots: &[ReserveSlot],
    ) -> Reply<OrderPricing>;

    /// Create the order for `ctx.slot`.
    async fn submit_order(
        &self,
        ctx: &AttemptContext,
        cart: &CartSnapshot,
        pricing: &OrderPricing,
    ) -> Reply<serde_json::Value>;
}

/// Audible (or otherwise local) cue played once an order is placed.
#[async_trait]
pub trait SuccessCue: Send + Sync {
    async fn play(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Cue that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

#[async_trait]
impl SuccessCue for SilentCue {
    async fn play(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
