//! Streaming layer for the Brokerage Desk terminal
//!
//! This crate manages named WebSocket connections to upstream market data
//! providers: lifecycle and reconnection with exponential backoff,
//! subscription replay, typed message dispatch, and the REST quote client
//! the services use for price lookups.

pub mod connection;
pub mod manager;
pub mod quotes;

pub use connection::{ConnectOptions, ConnectionHealth, ConnectionStatus, FeedConnection};
pub use manager::{FeedManager, MARKET_DATA_CONNECTION};
pub use quotes::QuoteClient;
