//! External collaborator ports
//!
//! The ledger and aggregator reach durable storage and reference prices
//! through these traits so tests and alternate backends can be swapped in
//! without touching service code. Implementations decide their own error
//! sources, so the ports speak `anyhow`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::RestingOrder;
use crate::position::Holding;

/// A reference quote for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Current price
    pub price: Decimal,
    /// Previous session close, when the source carries one
    pub prev_close: Option<Decimal>,
}

/// Current-price lookup, usually backed by a REST quote endpoint
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current quote for a symbol
    ///
    /// A failure covers that symbol only; callers fetching a batch continue
    /// with the rest.
    async fn quote(&self, symbol: &str) -> anyhow::Result<Quote>;
}

/// Durable storage for holdings, last-seen prices, and resting orders
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    /// Load every holding for a user
    async fn load_holdings(&self, user_id: &str) -> anyhow::Result<Vec<Holding>>;

    /// Last price the store saw for a symbol, if any
    async fn last_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>>;

    /// All open resting orders for a trading pair
    async fn open_orders(&self, pair: &str) -> anyhow::Result<Vec<RestingOrder>>;
}
