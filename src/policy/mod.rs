//! Policy Engine — pure functions over an immutable portfolio
//! snapshot, current prices, config, and regime. No I/O ever happens
//! here; the monitor loop is the only caller that executes the
//! resulting `Action`s through the Broker Port.

pub mod fallback_rules;

use crate::config::PolicyConfig;
use crate::domain::{Action, ActionKind, OrderSide, PortfolioSnapshot, VixRegime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Evaluate stop-losses for every position. Ordering guarantee:
/// callers run this before profit-protection, which runs before
/// dip-buy.
pub fn evaluate_stop_losses(
    snapshot: &PortfolioSnapshot,
    config: &PolicyConfig,
    regime: VixRegime,
    defensive_floor: Option<f64>,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for pos in snapshot.positions.values() {
        if pos.quantity.is_zero() {
            continue;
        }
        let s = config.stop_loss_for(&pos.ticker, regime, defensive_floor);
        let entry = pos.average_cost;
        let current = pos.current_price;
        if entry.is_zero() {
            continue;
        }

        if pos.is_long() {
            let trigger = entry * (Decimal::ONE - Decimal::try_from(s).unwrap_or_default());
            if current <= trigger {
                actions.push(Action::market(
                    &pos.ticker,
                    ActionKind::StopLossExit,
                    OrderSide::Sell,
                    pos.quantity.abs(),
                    format!(
                        "stop-loss at -{:.0}% (price fell to ${:.2})",
                        s * 100.0,
                        current
                    ),
                ));
            }
        } else {
            let trigger = entry * (Decimal::ONE + Decimal::try_from(s).unwrap_or_default());
            if current >= trigger {
                actions.push(Action::market(
                    &pos.ticker,
                    ActionKind::StopLossExit,
                    OrderSide::Cover,
                    pos.quantity.abs(),
                    format!(
                        "stop-loss at +{:.0}% (price rose to ${:.2})",
                        s * 100.0,
                        current
                    ),
                ));
            }
        }
    }
    actions
}

/// Evaluate profit-protection entries. Long trips at `current <=
/// min_price`; short trips at `current >= max_price`. The whole position
/// is closed. Entries marked `trigger_review` propagate that flag onto
/// the resulting `Action` so the monitor loop can write the appropriate
/// alert file.
pub fn evaluate_profit_protection(
    snapshot: &PortfolioSnapshot,
    config: &PolicyConfig,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for pos in snapshot.positions.values() {
        let Some(entry) = config.profit_protection.get(&pos.ticker) else {
            continue;
        };
        let current = pos.current_price.to_f64().unwrap_or(0.0);

        let tripped = match entry.position_type {
            crate::config::policy::PositionType::Long => {
                entry.min_price.is_some_and(|min| current <= min)
            }
            crate::config::policy::PositionType::Short => {
                entry.max_price.is_some_and(|max| current >= max)
            }
        };

        if !tripped {
            continue;
        }

        let side = match entry.position_type {
            crate::config::policy::PositionType::Long => OrderSide::Sell,
            crate::config::policy::PositionType::Short => OrderSide::Cover,
        };

        actions.push(
            Action::market(
                &pos.ticker,
                ActionKind::ProfitProtectionExit,
                side,
                pos.quantity.abs(),
                entry.reason.clone(),
            )
            .with_review(entry.trigger_review),
        );
    }
    actions
}

/// Dip-buy evaluation. Disabled entirely while in defensive mode.
/// Sizes a buy equal to min(10% of current position notional, 50%
/// of available cash), only when that rounds to at least one share.
pub fn evaluate_dip_buy(
    snapshot: &PortfolioSnapshot,
    config: &PolicyConfig,
    defensive_active: bool,
) -> Vec<Action> {
    if defensive_active || !config.dip_buying.enabled {
        return Vec::new();
    }

    let mut actions = Vec::new();
    for pos in snapshot.positions.values() {
        if !config.dip_buying.tickers.iter().any(|t| t == &pos.ticker) {
            continue;
        }
        if pos.average_cost.is_zero() {
            continue;
        }
        let pct = pos.unrealized_pnl_pct();
        let in_dip_band = pct <= -config.dip_buying.min_pct && pct >= -config.dip_buying.max_pct;
        if !in_dip_band {
            continue;
        }

        let notional = pos.market_value().abs();
        let ten_pct_notional = notional * Decimal::new(10, 2);
        let half_cash = snapshot.cash * Decimal::new(50, 2);
        let budget = ten_pct_notional.min(half_cash);
        if budget <= Decimal::ZERO || pos.current_price.is_zero() {
            continue;
        }
        let shares = (budget / pos.current_price).trunc();
        if shares < Decimal::ONE {
            continue;
        }

        actions.push(Action::market(
            &pos.ticker,
            ActionKind::DipBuy,
            OrderSide::Buy,
            shares,
            format!("dip-buy at {:.1}% from entry", pct * 100.0),
        ));
    }
    actions
}

/// Reaction to a significant VIX regime transition: ELEVATED trims
/// extreme-beta longs by half, HIGH exits them outright. Non-extreme
/// positions are untouched here; their stop-loss tightening happens
/// through `PolicyConfig::stop_loss_for`.
pub fn evaluate_vix_regime_actions(
    snapshot: &PortfolioSnapshot,
    config: &PolicyConfig,
    new_regime: VixRegime,
) -> Vec<Action> {
    if !matches!(new_regime, VixRegime::Elevated | VixRegime::High) {
        return Vec::new();
    }

    let mut actions = Vec::new();
    for pos in snapshot.positions.values() {
        if !pos.is_long() || pos.quantity.is_zero() {
            continue;
        }
        let is_extreme = config
            .high_beta_positions
            .get(&pos.ticker)
            .is_some_and(|p| p.extreme);
        if !is_extreme {
            continue;
        }

        match new_regime {
            VixRegime::Elevated => {
                let trim_qty = (pos.quantity.abs() * Decimal::new(50, 2)).trunc();
                if trim_qty >= Decimal::ONE {
                    actions.push(Action::market(
                        &pos.ticker,
                        ActionKind::DefensiveTrim,
                        OrderSide::Sell,
                        trim_qty,
                        "VIX ELEVATED: trimming extreme-beta position 50%, stop tightened to 10%".into(),
                    ));
                }
            }
            VixRegime::High => {
                actions.push(Action::market(
                    &pos.ticker,
                    ActionKind::DefensiveExit,
                    OrderSide::Sell,
                    pos.quantity.abs(),
                    "VIX HIGH: exiting extreme-beta position, global stop tightened to 10%".into(),
                ));
            }
            _ => unreachable!(),
        }
    }
    actions
}

/// Circuit-breaker predicate: triggered when `current_total` has fallen
/// from `day_start_total` by at least `daily_loss_limit` (a fraction).
/// One-shot per day is enforced by the caller tracking `triggered`
/// separately; this function is a pure re-evaluable predicate.
pub fn circuit_breaker_triggered(
    day_start_total: Decimal,
    current_total: Decimal,
    daily_loss_limit: f64,
) -> bool {
    if day_start_total.is_zero() {
        return false;
    }
    let drop = (day_start_total - current_total) / day_start_total;
    drop.to_f64().unwrap_or(0.0) >= daily_loss_limit
}

/// Overnight gap predicate: compares `current_total` to the previously
/// stored prior-close value.
pub fn gap_triggered(prior_close: Decimal, current_total: Decimal, gap_threshold: f64) -> bool {
    if prior_close.is_zero() {
        return false;
    }
    let change = (current_total - prior_close) / prior_close;
    change.to_f64().unwrap_or(0.0) <= -gap_threshold
}
