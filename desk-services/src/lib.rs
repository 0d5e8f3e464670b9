//! Business logic services for the Brokerage Desk terminal
//!
//! This crate provides the service layer on top of the streaming feed:
//! order book aggregation over resting orders, and the position ledger that
//! keeps portfolio valuations current against live trade ticks.

pub mod book;
pub mod ledger;

pub use book::{book_snapshot, build_order_book, build_order_book_with_depth, DEFAULT_BOOK_DEPTH};
pub use ledger::{LedgerConfig, PositionLedger, SummarySubscription};
