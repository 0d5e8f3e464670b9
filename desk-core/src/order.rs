//! Resting order types consumed by the order book aggregator

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of a resting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Bid side
    Buy,
    /// Ask side
    Sell,
}

/// An open limit order resting on the book
///
/// Read-only input to aggregation; the desk never mutates orders, it only
/// groups what is still unfilled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestingOrder {
    /// Order identifier
    pub id: u64,
    /// Trading pair the order rests on (e.g., "AAPL/USD")
    pub pair: String,
    /// Which side of the book
    pub side: OrderSide,
    /// Limit price
    pub price: Decimal,
    /// Original order quantity
    pub quantity: Decimal,
    /// Quantity still unfilled (0 <= remaining <= quantity)
    pub remaining: Decimal,
}

impl RestingOrder {
    /// Create a fully unfilled order
    pub fn new(id: u64, pair: impl Into<String>, side: OrderSide, price: Decimal, quantity: Decimal) -> Self {
        Self {
            id,
            pair: pair.into(),
            side,
            price,
            quantity,
            remaining: quantity,
        }
    }

    /// Whether any quantity is left to fill
    pub fn is_open(&self) -> bool {
        self.remaining > Decimal::ZERO
    }

    /// Whether the order satisfies its own invariants
    ///
    /// Violations (negative remaining, remaining above quantity, non-positive
    /// price) mark data faults; callers exclude such orders rather than fail.
    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO
            && self.remaining >= Decimal::ZERO
            && self.remaining <= self.quantity
    }
}
