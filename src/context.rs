//! Attempt context and the remote-service value types it carries.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivery address as returned by the address listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRef {
    pub id: String,
    /// Human readable label, unique per account.
    pub label: String,
    #[serde(default)]
    pub station_id: String,
    #[serde(default)]
    pub city_number: String,
}

/// How the order will be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Alipay,
    #[default]
    Wechat,
}

impl PaymentMethod {
    /// Numeric pay type the order endpoints expect.
    pub fn code(self) -> i64 {
        match self {
            PaymentMethod::Alipay => 2,
            PaymentMethod::Wechat => 4,
        }
    }

    /// Parse a configured spelling, English or Chinese.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "alipay" | "支付宝" => Some(PaymentMethod::Alipay),
            "wechat" | "微信" => Some(PaymentMethod::Wechat),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Alipay => f.write_str("alipay"),
            PaymentMethod::Wechat => f.write_str("wechat"),
        }
    }
}

/// A bookable delivery time range. Timestamps are opaque unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReserveSlot {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

impl ReserveSlot {
    pub fn new(start_timestamp: i64, end_timestamp: i64) -> Self {
        Self { start_timestamp, end_timestamp }
    }
}

fn format_ts(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(t) => t.format("%Y/%m/%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

impl fmt::Display for ReserveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}——{}", format_ts(self.start_timestamp), format_ts(self.end_timestamp))
    }
}

/// One line of the remote cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "product_name")]
    pub name: String,
    pub count: u32,
    pub total_price: String,
}

/// Cart as fetched at the start of a cycle. Replaced, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(rename = "products", default)]
    pub items: Vec<CartItem>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of the order-check call, handed unchanged to every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPricing {
    #[serde(rename = "price")]
    pub total: String,
}

/// Everything needed to submit one order.
///
/// The cycle runner owns a master copy without a slot; every race branch
/// gets its own clone with the slot filled in, so branches share nothing
/// mutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    pub identity: UserId,
    pub address: AddressRef,
    pub payment: PaymentMethod,
    pub slot: Option<ReserveSlot>,
}

impl AttemptContext {
    pub fn new(identity: UserId, address: AddressRef, payment: PaymentMethod) -> Self {
        Self { identity, address, payment, slot: None }
    }

    /// Independent copy bound to `slot`.
    pub fn for_slot(&self, slot: ReserveSlot) -> Self {
        Self { slot: Some(slot), ..self.clone() }
    }
}
