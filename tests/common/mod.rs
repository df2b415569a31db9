#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use slotrace::{
    AddressRef, AttemptContext, CartItem, CartSnapshot, Envelope, OrderPricing, PaymentMethod,
    Reply, ReserveSlot, Signal, Storefront, TransportError, UserId,
};

/// Queue of canned replies, falling back to a fixed reply once drained.
#[derive(Debug)]
pub struct Script<T> {
    queue: VecDeque<Reply<T>>,
    fallback: Reply<T>,
}

impl<T: Clone> Script<T> {
    pub fn always(fallback: Reply<T>) -> Self {
        Self { queue: VecDeque::new(), fallback }
    }

    pub fn then(mut self, reply: Reply<T>) -> Self {
        self.queue.push_back(reply);
        self
    }

    fn next(&mut self) -> Reply<T> {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn ok<T>(data: T) -> Reply<T> {
    Ok(Envelope::ok(data))
}

pub fn code<T>(code: i64) -> Reply<T> {
    Ok(Envelope::code(code))
}

pub fn network<T>() -> Reply<T> {
    Err(TransportError::network("connection reset"))
}

pub fn address(label: &str) -> AddressRef {
    AddressRef {
        id: format!("addr-{}", label),
        label: label.to_string(),
        station_id: "station-1".to_string(),
        city_number: "0101".to_string(),
    }
}

pub fn cart() -> CartSnapshot {
    CartSnapshot {
        items: vec![CartItem { name: "eggs".to_string(), count: 2, total_price: "12.80".to_string() }],
    }
}

pub fn slot(n: i64) -> ReserveSlot {
    ReserveSlot::new(1_650_000_000 + n * 1800, 1_650_000_000 + (n + 1) * 1800)
}

pub fn context() -> AttemptContext {
    AttemptContext::new(UserId("user-1".to_string()), address("home"), PaymentMethod::Wechat)
}

/// In-memory storefront driven by scripts. Submissions succeed unless a
/// per-slot code list or a default code says otherwise, and can be held
/// behind a gate so a test can act while a race is in flight.
#[derive(Debug)]
pub struct ScriptedStore {
    addresses: Vec<AddressRef>,
    cart: Mutex<Script<CartSnapshot>>,
    slots: Mutex<Script<Vec<ReserveSlot>>>,
    pricing: Mutex<Script<OrderPricing>>,
    submit_codes: Mutex<HashMap<ReserveSlot, VecDeque<i64>>>,
    submit_default: i64,
    gate: Option<Signal>,
    panic_on: Option<ReserveSlot>,
    pub user_fetches: AtomicUsize,
    pub cart_fetches: AtomicUsize,
    pub slot_fetches: AtomicUsize,
    pub submits_started: AtomicUsize,
    pub submits_finished: AtomicUsize,
    submitted: Mutex<Vec<ReserveSlot>>,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            addresses: vec![address("home")],
            cart: Mutex::new(Script::always(ok(cart()))),
            slots: Mutex::new(Script::always(ok(vec![slot(1), slot(2)]))),
            pricing: Mutex::new(Script::always(ok(OrderPricing { total: "12.80".to_string() }))),
            submit_codes: Mutex::new(HashMap::new()),
            submit_default: 0,
            gate: None,
            panic_on: None,
            user_fetches: AtomicUsize::new(0),
            cart_fetches: AtomicUsize::new(0),
            slot_fetches: AtomicUsize::new(0),
            submits_started: AtomicUsize::new(0),
            submits_finished: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<AddressRef>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_cart(self, script: Script<CartSnapshot>) -> Self {
        *self.cart.lock().unwrap() = script;
        self
    }

    pub fn with_slots(self, script: Script<Vec<ReserveSlot>>) -> Self {
        *self.slots.lock().unwrap() = script;
        self
    }

    pub fn with_pricing(self, script: Script<OrderPricing>) -> Self {
        *self.pricing.lock().unwrap() = script;
        self
    }

    /// Code returned by submissions that have nothing scripted for their slot.
    pub fn with_submit_default(mut self, code: i64) -> Self {
        self.submit_default = code;
        self
    }

    /// Codes returned, in order, by submissions for `slot`.
    pub fn with_submit_codes(self, slot: ReserveSlot, codes: Vec<i64>) -> Self {
        self.submit_codes.lock().unwrap().insert(slot, codes.into());
        self
    }

    /// Hold every submission until `gate` is posted.
    pub fn with_gate(mut self, gate: Signal) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make submissions for `slot` panic before reaching the service.
    pub fn with_panic_on(mut self, slot: ReserveSlot) -> Self {
        self.panic_on = Some(slot);
        self
    }

    pub fn submitted(&self) -> Vec<ReserveSlot> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.submits_started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.submits_finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storefront for ScriptedStore {
    async fn fetch_user(&self) -> Reply<UserId> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        ok(UserId("user-1".to_string()))
    }

    async fn fetch_addresses(&self, _user: &UserId) -> Reply<Vec<AddressRef>> {
        ok(self.addresses.clone())
    }

    async fn select_all_cart_items(&self, _ctx: &AttemptContext) -> Reply<serde_json::Value> {
        ok(serde_json::Value::Null)
    }

    async fn fetch_cart(&self, _ctx: &AttemptContext) -> Reply<CartSnapshot> {
        self.cart_fetches.fetch_add(1, Ordering::SeqCst);
        self.cart.lock().unwrap().next()
    }

    async fn fetch_candidate_slots(
        &self,
        _ctx: &AttemptContext,
        _cart: &CartSnapshot,
    ) -> Reply<Vec<ReserveSlot>> {
        self.slot_fetches.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().unwrap().next()
    }

    async fn price_order(
        &self,
        _ctx: &AttemptContext,
        _cart: &CartSnapshot,
        _slots: &[ReserveSlot],
    ) -> Reply<OrderPricing> {
        self.pricing.lock().unwrap().next()
    }

    async fn submit_order(
        &self,
        ctx: &AttemptContext,
        _cart: &CartSnapshot,
        _pricing: &OrderPricing,
    ) -> Reply<serde_json::Value> {
        self.submits_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        let slot = ctx.slot.expect("race branches always carry a slot");
        if self.panic_on == Some(slot) {
            panic!("submission handler crashed for {}", slot.start_timestamp);
        }
        self.submitted.lock().unwrap().push(slot);
        let code = self
            .submit_codes
            .lock()
            .unwrap()
            .get_mut(&slot)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.submit_default);
        self.submits_finished.fetch_add(1, Ordering::SeqCst);
        if code == 0 {
            ok(serde_json::json!({ "order_id": slot.start_timestamp }))
        } else {
            Ok(Envelope::code(code))
        }
    }
}

/// Yield until `done` holds, panicking after a bounded number of polls.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
