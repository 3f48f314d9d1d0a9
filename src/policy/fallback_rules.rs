//! Fallback rules — deterministic trims applied when the Agent Port
//! is unavailable. Rules are mutually exclusive per position (first
//! matching rule wins); rule (d) runs at most once per
//! invocation across the whole portfolio.

use crate::config::policy::{CashReserveFloor, ExtremeOverbought, PositionSizeLimit, RsiProfitTaking};
use crate::domain::{Action, ActionKind, OrderSide, Position};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Rule (a): RSI > threshold and P/L% > min_profit -> trim by trim_pct.
pub fn rsi_profit_taking(pos: &Position, rsi: Option<f64>, cfg: &RsiProfitTaking) -> Option<Action> {
    let rsi = rsi?;
    let pl_pct = pos.unrealized_pnl_pct() * 100.0;
    if rsi > cfg.rsi_threshold && pl_pct > cfg.min_profit_pct {
        let trim_qty = (pos.quantity.abs() * Decimal::try_from(cfg.trim_pct).ok()?).trunc();
        if trim_qty >= Decimal::ONE {
            return Some(Action::market(
                &pos.ticker,
                ActionKind::DefensiveTrim,
                OrderSide::Sell,
                trim_qty,
                format!(
                    "fallback rule (a): RSI {rsi:.1} P/L +{pl_pct:.1}% -> trim {:.0}%",
                    cfg.trim_pct * 100.0
                ),
            ));
        }
    }
    None
}

/// Rule (b): extreme overbought -> trim by a larger fraction.
pub fn extreme_overbought(pos: &Position, rsi: Option<f64>, cfg: &ExtremeOverbought) -> Option<Action> {
    let rsi = rsi?;
    let pl_pct = pos.unrealized_pnl_pct() * 100.0;
    if rsi > cfg.rsi_threshold && pl_pct > cfg.min_profit_pct {
        let trim_qty = (pos.quantity.abs() * Decimal::try_from(cfg.trim_pct).ok()?).trunc();
        if trim_qty >= Decimal::ONE {
            return Some(Action::market(
                &pos.ticker,
                ActionKind::DefensiveTrim,
                OrderSide::Sell,
                trim_qty,
                format!(
                    "fallback rule (b): extreme overbought (RSI {rsi:.1}) -> trim {:.0}%",
                    cfg.trim_pct * 100.0
                ),
            ));
        }
    }
    None
}

/// Rule (c): position weight over the cap -> trim down to the target.
pub fn position_size_limit(
    pos: &Position,
    total_value: Decimal,
    cfg: &PositionSizeLimit,
) -> Option<Action> {
    if total_value.is_zero() || pos.current_price.is_zero() {
        return None;
    }
    let position_pct = (pos.market_value().abs() / total_value * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);
    if position_pct > cfg.max_position_pct {
        let target_value = total_value * Decimal::try_from(cfg.target_position_pct / 100.0).ok()?;
        let trim_value = pos.market_value().abs() - target_value;
        let trim_qty = (trim_value / pos.current_price).trunc();
        if trim_qty >= Decimal::ONE {
            return Some(Action::market(
                &pos.ticker,
                ActionKind::DefensiveTrim,
                OrderSide::Sell,
                trim_qty,
                format!(
                    "fallback rule (c): {position_pct:.1}% of portfolio -> trim to {:.0}%",
                    cfg.target_position_pct
                ),
            ));
        }
    }
    None
}

/// Rule (d): cash reserve floor. Picks the single best-performing
/// position by P/L% and trims it, but only if cash is thin and that
/// position has a meaningful gain. Runs at most once per invocation —
/// callers must not call this more than once per fallback pass.
pub fn cash_reserve_floor(
    positions: &[&Position],
    cash_pct: f64,
    cfg: &CashReserveFloor,
) -> Option<Action> {
    if cash_pct >= cfg.min_cash_pct || positions.is_empty() {
        return None;
    }
    let best = positions
        .iter()
        .max_by(|a, b| {
            a.unrealized_pnl_pct()
                .partial_cmp(&b.unrealized_pnl_pct())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()?;

    let pl_pct = best.unrealized_pnl_pct() * 100.0;
    if pl_pct <= cfg.min_profit_to_trim_pct {
        return None;
    }
    let trim_qty = (best.quantity.abs() * Decimal::try_from(cfg.trim_pct).ok()?).trunc();
    if trim_qty < Decimal::ONE {
        return None;
    }
    Some(Action::market(
        &best.ticker,
        ActionKind::DefensiveTrim,
        OrderSide::Sell,
        trim_qty,
        format!(
            "fallback rule (d): cash {cash_pct:.1}% -> trim best performer {:.0}%",
            cfg.trim_pct * 100.0
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos(qty: Decimal, cost: Decimal, price: Decimal) -> Position {
        Position {
            ticker: "X".into(),
            quantity: qty,
            average_cost: cost,
            current_price: price,
        }
    }

    /// RSI 82 and +24% P/L triggers a 25% trim.
    #[test]
    fn s6_rsi_profit_taking_trims_25_pct() {
        let p = pos(dec!(100), dec!(100), dec!(124));
        let action = rsi_profit_taking(&p, Some(82.0), &RsiProfitTaking::default()).unwrap();
        assert_eq!(action.quantity, dec!(25));
    }

    #[test]
    fn rsi_profit_taking_skips_when_rsi_unknown() {
        let p = pos(dec!(100), dec!(100), dec!(124));
        assert!(rsi_profit_taking(&p, None, &RsiProfitTaking::default()).is_none());
    }

    /// Scenario S6: a position at 38% of portfolio triggers a trim to 30%.
    #[test]
    fn s6_position_size_limit_trims_to_target() {
        let p = pos(dec!(100), dec!(10), dec!(38)); // 3800 of 10000 = 38%
        let action = position_size_limit(&p, dec!(10000), &PositionSizeLimit::default()).unwrap();
        // target value = 3000, trim value = 800, qty = 800/38 = 21.x -> trunc 21
        assert!(action.quantity >= dec!(21));
    }

    #[test]
    fn cash_reserve_floor_picks_best_performer_only_once() {
        let a = pos(dec!(10), dec!(100), dec!(110));
        let b = pos(dec!(10), dec!(100), dec!(130));
        let cfg = CashReserveFloor::default();
        let action = cash_reserve_floor(&[&a, &b], 5.0, &cfg).unwrap();
        assert_eq!(action.ticker, "X");
        assert_eq!(action.quantity, dec!(1) * dec!(10) * Decimal::try_from(cfg.trim_pct).unwrap());
    }

    #[test]
    fn cash_reserve_floor_noop_when_cash_healthy() {
        let a = pos(dec!(10), dec!(100), dec!(130));
        assert!(cash_reserve_floor(&[&a], 20.0, &CashReserveFloor::default()).is_none());
    }
}
