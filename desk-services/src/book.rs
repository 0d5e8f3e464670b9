//! Order book aggregation
//!
//! Builds a depth-limited [`OrderBook`] snapshot from the open resting
//! orders of one trading pair. Pure and stateless: the same input always
//! produces the same levels, and bad orders are excluded rather than
//! rejected.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use desk_core::{
    BookLevel, DeskError, DeskResult, HoldingsStore, OrderBook, OrderSide, RestingOrder,
};

/// Price levels kept per side
pub const DEFAULT_BOOK_DEPTH: usize = 20;

/// Load a pair's open orders through the store port and aggregate them
pub async fn book_snapshot(store: &dyn HoldingsStore, pair: &str) -> DeskResult<OrderBook> {
    let orders = store
        .open_orders(pair)
        .await
        .map_err(|e| DeskError::store(e.to_string()))?;
    Ok(build_order_book(pair, &orders))
}

/// Aggregate a pair's resting orders into a book of default depth
pub fn build_order_book(pair: &str, orders: &[RestingOrder]) -> OrderBook {
    build_order_book_with_depth(pair, orders, DEFAULT_BOOK_DEPTH)
}

/// Aggregate a pair's resting orders into a book of the given depth
///
/// Orders for other pairs, filled orders, and orders violating their own
/// invariants are skipped. Remaining quantity is grouped by exact price;
/// bids sort descending and asks ascending, best first. The reference price
/// is the best bid, and the spread exists only when both sides do.
pub fn build_order_book_with_depth(
    pair: &str,
    orders: &[RestingOrder],
    depth: usize,
) -> OrderBook {
    let mut bid_totals: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    let mut ask_totals: BTreeMap<Decimal, Decimal> = BTreeMap::new();

    for order in orders {
        if order.pair != pair {
            continue;
        }
        if !order.is_valid() {
            debug!("Excluding invalid order {} on {}", order.id, order.pair);
            continue;
        }
        if !order.is_open() {
            continue;
        }

        let totals = match order.side {
            OrderSide::Buy => &mut bid_totals,
            OrderSide::Sell => &mut ask_totals,
        };
        *totals.entry(order.price).or_insert(Decimal::ZERO) += order.remaining;
    }

    let mut bids: Vec<BookLevel> = bid_totals
        .into_iter()
        .rev()
        .map(|(price, quantity)| BookLevel::new(price, quantity))
        .collect();
    let mut asks: Vec<BookLevel> = ask_totals
        .into_iter()
        .map(|(price, quantity)| BookLevel::new(price, quantity))
        .collect();

    // A crossed book is a data fault, not a matching opportunity; drop the
    // ask levels priced at or below the best bid
    if let Some(best_bid) = bids.first().map(|level| level.price) {
        let before = asks.len();
        asks.retain(|level| level.price > best_bid);
        if asks.len() < before {
            warn!(
                "Dropped {} crossed ask level(s) on {}",
                before - asks.len(),
                pair
            );
        }
    }

    bids.truncate(depth);
    asks.truncate(depth);

    let last_price = bids.first().map(|level| level.price);
    let spread = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => Some(ask.price - bid.price),
        _ => None,
    };

    OrderBook {
        pair: pair.to_string(),
        bids,
        asks,
        last_price,
        spread,
        timestamp: Utc::now(),
    }
}
