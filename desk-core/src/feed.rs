//! Wire protocol for the upstream market data feed
//!
//! The provider speaks JSON over WebSocket with a string `type` field as the
//! discriminator on every frame. Outbound control frames carry a symbol;
//! inbound trade frames batch one or more ticks with short field names.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type discriminators shared by classification and handler
/// registration
pub mod msg_type {
    /// Batch of trade ticks
    pub const TRADE: &str = "trade";
    /// Provider keepalive, no payload
    pub const PING: &str = "ping";
}

// ============================================================================
// Client -> Provider Messages
// ============================================================================

/// Control frames sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Start streaming a symbol's topic
    Subscribe {
        /// Topic symbol (e.g., "AAPL" or "orders:AAPL/USD")
        symbol: String,
    },
    /// Stop streaming a symbol's topic
    Unsubscribe {
        /// Topic symbol
        symbol: String,
    },
}

impl ControlMessage {
    /// Get the topic symbol this frame addresses
    pub fn symbol(&self) -> &str {
        match self {
            Self::Subscribe { symbol } => symbol,
            Self::Unsubscribe { symbol } => symbol,
        }
    }
}

// ============================================================================
// Provider -> Client Messages
// ============================================================================

/// A single trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    /// Instrument symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade volume
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Trade time, epoch milliseconds
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Payload of a `trade` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Ticks in arrival order
    pub data: Vec<TradeTick>,
}

/// Extract the `type` discriminator from a raw inbound frame
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}
