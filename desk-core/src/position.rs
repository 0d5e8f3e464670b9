//! Position and portfolio valuation structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A holding as persisted in the durable store
///
/// The ledger turns holdings into live [`Position`]s at initialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Instrument symbol
    pub symbol: String,

    /// Number of shares held
    pub quantity: Decimal,

    /// Average price paid per share
    pub avg_price: Decimal,
}

/// A live, mark-to-market position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol
    pub symbol: String,

    /// Number of shares held
    pub quantity: Decimal,

    /// Average price paid per share
    pub avg_price: Decimal,

    /// Most recently applied price
    pub current_price: Decimal,

    /// Price before the most recent tick
    pub previous_price: Decimal,

    /// Market value (quantity * current_price)
    pub market_value: Decimal,

    /// Unrealized profit/loss against cost basis
    pub unrealized_pnl: Decimal,

    /// Value change over the last tick ((current - previous) * quantity)
    pub day_change: Decimal,
}

impl Position {
    /// Create a position valued at a starting price
    ///
    /// Previous price starts equal to the current price, so the first tick
    /// measures change from this starting mark.
    pub fn new(symbol: impl Into<String>, quantity: Decimal, avg_price: Decimal, price: Decimal) -> Self {
        let mut position = Self {
            symbol: symbol.into(),
            quantity,
            avg_price,
            current_price: price,
            previous_price: price,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            day_change: Decimal::ZERO,
        };
        position.revalue();
        position
    }

    /// Apply a new price, rolling the current price into the previous one
    ///
    /// Day change is measured against the previous tick, not a session open.
    pub fn apply_price(&mut self, price: Decimal) {
        self.previous_price = self.current_price;
        self.current_price = price;
        self.revalue();
    }

    fn revalue(&mut self) {
        self.market_value = self.quantity * self.current_price;
        self.unrealized_pnl = self.market_value - self.cost_basis();
        self.day_change = (self.current_price - self.previous_price) * self.quantity;
    }

    /// Calculate the cost basis
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_price
    }

    /// Calculate unrealized P&L as a percentage of cost basis
    pub fn pnl_percent(&self) -> Decimal {
        if self.cost_basis().is_zero() {
            Decimal::ZERO
        } else {
            (self.unrealized_pnl / self.cost_basis()) * Decimal::from(100)
        }
    }

    /// Calculate day change as a percentage of the previous price
    pub fn day_change_percent(&self) -> Decimal {
        if self.previous_price.is_zero() {
            Decimal::ZERO
        } else {
            ((self.current_price - self.previous_price) / self.previous_price) * Decimal::from(100)
        }
    }
}

/// Snapshot of all positions plus portfolio-level totals
///
/// Summaries carry owned position copies; subscribers never observe live
/// ledger state through one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// All positions at snapshot time
    pub positions: Vec<Position>,

    /// Total market value across positions
    pub total_value: Decimal,

    /// Total cost basis across positions
    pub total_cost: Decimal,

    /// Total unrealized P&L
    pub total_unrealized_pnl: Decimal,

    /// Total unrealized P&L as a percentage of total cost
    pub total_unrealized_pnl_percent: Decimal,

    /// Total day change across positions
    pub day_change: Decimal,

    /// Mean of per-position day change percentages, unweighted
    pub day_change_percent: Decimal,

    /// When the snapshot was taken
    pub updated_at: DateTime<Utc>,
}

impl PortfolioSummary {
    /// Create an empty summary
    pub fn empty() -> Self {
        Self::from_positions(Vec::new())
    }

    /// Build a summary from a position set, computing all totals
    pub fn from_positions(positions: Vec<Position>) -> Self {
        let total_value: Decimal = positions.iter().map(|p| p.market_value).sum();
        let total_cost: Decimal = positions.iter().map(|p| p.cost_basis()).sum();
        let total_unrealized_pnl: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
        let total_unrealized_pnl_percent = if total_cost.is_zero() {
            Decimal::ZERO
        } else {
            (total_unrealized_pnl / total_cost) * Decimal::from(100)
        };
        let day_change: Decimal = positions.iter().map(|p| p.day_change).sum();
        // Unweighted mean across positions, a small position moves the
        // portfolio percentage as much as a large one.
        let day_change_percent = if positions.is_empty() {
            Decimal::ZERO
        } else {
            positions
                .iter()
                .map(|p| p.day_change_percent())
                .sum::<Decimal>()
                / Decimal::from(positions.len() as u64)
        };

        Self {
            positions,
            total_value,
            total_cost,
            total_unrealized_pnl,
            total_unrealized_pnl_percent,
            day_change,
            day_change_percent,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_position_starts_with_zero_change() {
        let position = Position::new("AAPL", dec!(10), dec!(50), dec!(50));
        assert_eq!(position.market_value, dec!(500));
        assert_eq!(position.unrealized_pnl, dec!(0));
        assert_eq!(position.day_change, dec!(0));
    }

    #[test]
    fn apply_price_rolls_previous_price() {
        let mut position = Position::new("AAPL", dec!(10), dec!(50), dec!(50));
        position.apply_price(dec!(55));
        assert_eq!(position.previous_price, dec!(50));
        assert_eq!(position.current_price, dec!(55));
        assert_eq!(position.market_value, dec!(550));
        assert_eq!(position.unrealized_pnl, dec!(50));
        assert_eq!(position.day_change, dec!(50));

        // Next tick measures against 55, not 50
        position.apply_price(dec!(54));
        assert_eq!(position.previous_price, dec!(55));
        assert_eq!(position.day_change, dec!(-10));
    }

    #[test]
    fn pnl_percent_handles_zero_cost() {
        let position = Position::new("FREE", dec!(10), dec!(0), dec!(5));
        assert_eq!(position.pnl_percent(), dec!(0));
    }

    #[test]
    fn summary_totals_sum_positions() {
        let mut a = Position::new("AAPL", dec!(10), dec!(50), dec!(50));
        a.apply_price(dec!(55));
        let mut b = Position::new("MSFT", dec!(2), dec!(100), dec!(100));
        b.apply_price(dec!(90));

        let summary = PortfolioSummary::from_positions(vec![a, b]);
        assert_eq!(summary.total_value, dec!(730));
        assert_eq!(summary.total_cost, dec!(700));
        assert_eq!(summary.total_unrealized_pnl, dec!(30));
        assert_eq!(summary.day_change, dec!(30));
    }

    #[test]
    fn summary_day_change_percent_is_unweighted_mean() {
        let mut a = Position::new("AAPL", dec!(1), dec!(100), dec!(100));
        a.apply_price(dec!(110)); // +10%
        let mut b = Position::new("MSFT", dec!(1000), dec!(100), dec!(100));
        b.apply_price(dec!(120)); // +20%

        let summary = PortfolioSummary::from_positions(vec![a, b]);
        assert_eq!(summary.day_change_percent, dec!(15));
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = PortfolioSummary::empty();
        assert!(summary.positions.is_empty());
        assert_eq!(summary.total_value, dec!(0));
        assert_eq!(summary.day_change_percent, dec!(0));
    }
}
