//! Aggregated order book structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level in the aggregated book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price of the level
    pub price: Decimal,
    /// Total remaining quantity resting at this price
    pub quantity: Decimal,
    /// Notional at this level (price * quantity, not a running sum)
    pub total: Decimal,
}

impl BookLevel {
    /// Create a level, deriving the notional from price and quantity
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self {
            price,
            quantity,
            total: price * quantity,
        }
    }
}

/// Order book snapshot for a trading pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Trading pair the book belongs to
    pub pair: String,
    /// Bid levels (sorted by price descending - best bid first)
    pub bids: Vec<BookLevel>,
    /// Ask levels (sorted by price ascending - best ask first)
    pub asks: Vec<BookLevel>,
    /// Reference price, the best bid when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    /// Best ask minus best bid, present only when both sides are populated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<Decimal>,
    /// When the snapshot was built
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Create an empty book for a pair
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            last_price: None,
            spread: None,
            timestamp: Utc::now(),
        }
    }

    /// Get the best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Calculate the mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Whether both sides are empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
