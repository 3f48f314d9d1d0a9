use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single open position. Sign of `quantity` encodes long (positive) vs
/// short (negative); a ticker never carries both directions at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    /// Sign-corrected unrealized return, as a fraction (0.20 = +20%).
    /// Long: (current - cost) / cost. Short: (cost - current) / cost.
    pub fn unrealized_pnl_pct(&self) -> f64 {
        if self.average_cost.is_zero() {
            return 0.0;
        }
        let raw = (self.current_price - self.average_cost) / self.average_cost;
        let signed = if self.is_short() { -raw } else { raw };
        signed.to_f64().unwrap_or(0.0)
    }
}

/// Immutable view of the account for a single monitor cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
}

impl PortfolioSnapshot {
    pub fn total_value(&self) -> Decimal {
        self.cash
            + self
                .positions
                .values()
                .map(|p| p.market_value())
                .sum::<Decimal>()
    }

    pub fn position_weight(&self, ticker: &str) -> f64 {
        let total = self.total_value();
        if total.is_zero() {
            return 0.0;
        }
        self.positions
            .get(ticker)
            .map(|p| (p.market_value() / total).to_f64().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    pub fn cash_weight(&self) -> f64 {
        let total = self.total_value();
        if total.is_zero() {
            return 0.0;
        }
        (self.cash / total).to_f64().unwrap_or(0.0)
    }

    pub fn short_count(&self) -> usize {
        self.positions.values().filter(|p| p.is_short()).count()
    }

    pub fn long_tickers(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_long())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos(qty: Decimal, cost: Decimal, price: Decimal) -> Position {
        Position {
            ticker: "AAPL".into(),
            quantity: qty,
            average_cost: cost,
            current_price: price,
        }
    }

    #[test]
    fn long_pnl_is_positive_on_gain() {
        let p = pos(dec!(10), dec!(100), dec!(110));
        assert!(p.unrealized_pnl_pct() > 0.0);
    }

    #[test]
    fn short_pnl_is_positive_when_price_falls() {
        let p = pos(dec!(-5), dec!(50), dec!(40));
        assert!(p.unrealized_pnl_pct() > 0.0);
    }

    #[test]
    fn short_pnl_is_negative_when_price_rises() {
        let p = pos(dec!(-5), dec!(50), dec!(57.5));
        assert!(p.unrealized_pnl_pct() < 0.0);
    }

    #[test]
    fn total_value_sums_cash_and_positions() {
        let mut snap = PortfolioSnapshot {
            cash: dec!(1000),
            positions: HashMap::new(),
        };
        snap.positions
            .insert("AAPL".into(), pos(dec!(10), dec!(100), dec!(110)));
        assert_eq!(snap.total_value(), dec!(1000) + dec!(1100));
    }
}
