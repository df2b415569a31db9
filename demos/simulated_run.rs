//! Running the whole engine against an in-memory storefront.
//!
//! The simulated service is crowded for a while, has no delivery slot on the
//! first look, then accepts one of three submissions. No window is
//! configured, so the scheduler starts a single session immediately.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use slotrace::events::MulticastSink;
use slotrace::prelude::*;
use slotrace::{AddressRef, CartItem, Jitter, LocalClock};

#[derive(Debug, Default)]
struct SimulatedStore {
    calls: AtomicUsize,
    slot_lookups: AtomicUsize,
    open_slot: AtomicI64,
}

impl SimulatedStore {
    /// The first few calls of the session see a crowded service.
    fn crowded<T>(&self) -> Option<Reply<T>> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Some(Ok(Envelope::code(-3000))),
            2 => Some(Ok(Envelope::code(-3100))),
            _ => None,
        }
    }
}

#[async_trait]
impl Storefront for SimulatedStore {
    async fn fetch_user(&self) -> Reply<UserId> {
        self.crowded().unwrap_or_else(|| Ok(Envelope::ok(UserId("demo-user".into()))))
    }

    async fn fetch_addresses(&self, _user: &UserId) -> Reply<Vec<AddressRef>> {
        Ok(Envelope::ok(vec![AddressRef {
            id: "addr-1".into(),
            label: "home".into(),
            station_id: "st-9".into(),
            city_number: "0101".into(),
        }]))
    }

    async fn select_all_cart_items(&self, _ctx: &AttemptContext) -> Reply<serde_json::Value> {
        Ok(Envelope::ok(serde_json::Value::Null))
    }

    async fn fetch_cart(&self, _ctx: &AttemptContext) -> Reply<CartSnapshot> {
        Ok(Envelope::ok(CartSnapshot {
            items: vec![
                CartItem { name: "milk".into(), count: 2, total_price: "9.80".into() },
                CartItem { name: "rice".into(), count: 1, total_price: "32.00".into() },
            ],
        }))
    }

    async fn fetch_candidate_slots(
        &self,
        _ctx: &AttemptContext,
        _cart: &CartSnapshot,
    ) -> Reply<Vec<ReserveSlot>> {
        if self.slot_lookups.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Envelope::ok(Vec::new()));
        }
        let base = chrono::Local::now().timestamp();
        let slots: Vec<_> =
            (1..=3).map(|n| ReserveSlot::new(base + n * 3600, base + n * 3600 + 1800)).collect();
        self.open_slot.store(base + 3 * 3600, Ordering::SeqCst);
        Ok(Envelope::ok(slots))
    }

    async fn price_order(
        &self,
        _ctx: &AttemptContext,
        _cart: &CartSnapshot,
        _slots: &[ReserveSlot],
    ) -> Reply<OrderPricing> {
        Ok(Envelope::ok(OrderPricing { total: "41.80".into() }))
    }

    async fn submit_order(
        &self,
        ctx: &AttemptContext,
        _cart: &CartSnapshot,
        _pricing: &OrderPricing,
    ) -> Reply<serde_json::Value> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // only the latest slot still has capacity
        match ctx.slot {
            Some(slot) if slot.start_timestamp == self.open_slot.load(Ordering::SeqCst) => {
                Ok(Envelope::ok(serde_json::json!({ "order": slot.start_timestamp })))
            }
            _ => Ok(Envelope::code(5004)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = Config::from_json_str(r#"{"interval": 200, "success_hold_secs": 1, "retry_cap": 2}"#)?;
    config.validate()?;

    let events = MemorySink::new();
    let engine = Engine::new(Arc::new(SimulatedStore::default()), &config, config.retry_policy())?
        .with_sink(MulticastSink::new(LogSink, events.clone()))
        .map_runner(|runner| runner.with_no_slot_jitter(Jitter::None));

    let outcome = engine.into_scheduler(config.windows()?, Arc::new(LocalClock)).run().await?;

    println!("\noutcome: {:?}", outcome);
    for event in events.events() {
        println!("  {}", event);
    }
    Ok(())
}
