//! Defensive Controller — entered automatically when the
//! circuit breaker trips or an overnight gap is detected. While active,
//! dip-buying and opening new short/speculative positions are suppressed
//! and every long position's stop-loss is replaced by the tighter
//! defensive floor. Exits on a new trading day or once the portfolio
//! recovers to within 1% of its pre-defensive value.

use crate::config::PolicyConfig;
use crate::domain::{Action, ActionKind, OrderSide, PortfolioSnapshot};
use crate::state::StateStore;
use crate::state::files::{DEFENSIVE_STATE_FILE, DefensiveModeState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::info;

pub struct DefensiveController<'a> {
    state: &'a StateStore,
}

impl<'a> DefensiveController<'a> {
    pub fn new(state: &'a StateStore) -> Self {
        Self { state }
    }

    pub fn current(&self) -> DefensiveModeState {
        self.state.read(DEFENSIVE_STATE_FILE).unwrap_or_default()
    }

    /// Enter defensive mode. The entry sequence:
    /// 1. snapshot the pre-defensive portfolio value,
    /// 2. record the triggering loss percentage,
    /// 3. mark the mode active with an entry timestamp,
    /// 4. close every short position outright,
    /// 5. trim or close longs that are already down past the exit floor,
    /// 6. leave longs retained above the retain-floor untouched,
    /// 7. persist the state file so the tightened stop-loss survives a
    ///    restart,
    /// 8. emit the resulting close/trim actions for the caller to submit,
    /// 9. hand excess cash to the agent via a defensive-redeploy prompt
    ///    (the caller builds and sends that prompt; this controller only
    ///    reports `excess_cash`).
    pub fn enter(
        &self,
        snapshot: &PortfolioSnapshot,
        config: &PolicyConfig,
        trigger_loss_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Action>, Decimal)> {
        let pre_value = snapshot.total_value();
        let mut actions = Vec::new();
        let mut log = Vec::new();

        for pos in snapshot.positions.values() {
            if pos.is_short() {
                let reason = "defensive mode: closing short position".to_string();
                log.push(reason.clone());
                actions.push(Action::market(
                    &pos.ticker,
                    ActionKind::DefensiveExit,
                    OrderSide::Cover,
                    pos.quantity.abs(),
                    reason,
                ));
                continue;
            }
            if pos.average_cost.is_zero() {
                continue;
            }
            let pct = pos.unrealized_pnl_pct();
            if pct <= config.defensive.close_long_below_pct {
                let reason = format!(
                    "defensive mode: closing long at {:.1}% (below {:.0}% floor)",
                    pct * 100.0,
                    config.defensive.close_long_below_pct * 100.0
                );
                log.push(reason.clone());
                actions.push(Action::market(
                    &pos.ticker,
                    ActionKind::DefensiveExit,
                    OrderSide::Sell,
                    pos.quantity.abs(),
                    reason,
                ));
            }
        }

        let reserve = pre_value * Decimal::try_from(config.capital_management.opportunity_reserve_fraction)
            .unwrap_or_default();
        let excess_cash = (snapshot.cash - reserve).max(Decimal::ZERO);

        self.state.write(
            DEFENSIVE_STATE_FILE,
            &DefensiveModeState {
                active: true,
                entered_at: Some(now),
                pre_value: Some(pre_value),
                trigger_loss_pct: Some(trigger_loss_pct),
                actions: log,
            },
        )?;

        info!(
            "entered defensive mode: pre_value=${pre_value:.2} trigger_loss={:.1}%",
            trigger_loss_pct * 100.0
        );

        Ok((actions, excess_cash))
    }

    /// Exit when a new trading day has begun, or the portfolio has
    /// recovered to within 1% of its pre-defensive value.
    pub fn maybe_exit(
        &self,
        state: &DefensiveModeState,
        snapshot: &PortfolioSnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !state.active {
            return Ok(false);
        }

        let new_day = state
            .entered_at
            .map(|entered| entered.date_naive() != now.date_naive())
            .unwrap_or(false);

        let recovered = state.pre_value.is_some_and(|pre| {
            if pre.is_zero() {
                return false;
            }
            let current = snapshot.total_value();
            let recovery_pct = ((current - pre) / pre).to_f64().unwrap_or(0.0);
            recovery_pct >= -0.01
        });

        if new_day || recovered {
            self.state.write(DEFENSIVE_STATE_FILE, &DefensiveModeState::default())?;
            info!("exited defensive mode (new_day={new_day} recovered={recovered})");
            return Ok(true);
        }

        Ok(false)
    }
}
