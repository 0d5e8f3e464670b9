//! Core types for the Brokerage Desk streaming terminal
//!
//! This crate defines the shared data structures used across the desk,
//! including resting orders, aggregated order books, positions, the upstream
//! feed protocol, and the collaborator ports the services depend on.

pub mod book;
pub mod error;
pub mod feed;
pub mod order;
pub mod position;
pub mod store;

pub use book::{BookLevel, OrderBook};
pub use error::{DeskError, DeskResult};
pub use feed::{message_type, msg_type, ControlMessage, TradeMessage, TradeTick};
pub use order::{OrderSide, RestingOrder};
pub use position::{Holding, PortfolioSummary, Position};
pub use store::{HoldingsStore, PriceSource, Quote};
