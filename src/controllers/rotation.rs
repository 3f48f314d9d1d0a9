//! Rotation Controller — evaluated only during scheduled
//! reviews, and only once the Policy Engine had no urgent stop-loss or
//! profit-protection actions to submit. Never places trades itself: it
//! only flips a mode flag and hands the agent a prompt describing the
//! rotation it should execute.

use crate::config::PolicyConfig;
use crate::domain::PortfolioSnapshot;
use crate::ports::quote::TechnicalSignal;
use crate::state::StateStore;
use crate::state::files::{ROTATION_STATE_FILE, RotationModeState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTransition {
    Enter,
    Exit,
}

pub struct RotationController<'a> {
    state: &'a StateStore,
}

impl<'a> RotationController<'a> {
    pub fn new(state: &'a StateStore) -> Self {
        Self { state }
    }

    pub fn current(&self) -> RotationModeState {
        self.state.read(ROTATION_STATE_FILE).unwrap_or_default()
    }

    /// Computes the fraction of long holdings flagged `StrongSell` to
    /// decide entry, and the fraction flagged `StrongBuy` to decide
    /// recovery exit, then decides whether to enter, exit, or hold the
    /// current rotation mode.
    pub fn evaluate(
        &self,
        snapshot: &PortfolioSnapshot,
        config: &PolicyConfig,
        signals: &HashMap<String, TechnicalSignal>,
        now: DateTime<Utc>,
    ) -> Result<Option<RotationTransition>> {
        if !config.rotation_trigger.enabled {
            return Ok(None);
        }

        let longs: Vec<_> = snapshot.long_tickers().collect();
        if longs.is_empty() {
            return Ok(None);
        }

        let strong_sell_count = longs
            .iter()
            .filter(|p| {
                matches!(
                    signals.get(&p.ticker),
                    Some(TechnicalSignal::StrongSell)
                )
            })
            .count();
        let strong_sell_frac = strong_sell_count as f64 / longs.len() as f64;

        let current = self.current();

        if !current.active {
            if strong_sell_frac >= config.rotation_trigger.strong_sell_threshold {
                self.state.write(
                    ROTATION_STATE_FILE,
                    &RotationModeState {
                        active: true,
                        entered_at: Some(now),
                    },
                )?;
                info!("rotation mode entered: strong_sell_frac={strong_sell_frac:.2}");
                return Ok(Some(RotationTransition::Enter));
            }
            return Ok(None);
        }

        let strong_buy_count = longs
            .iter()
            .filter(|p| {
                matches!(
                    signals.get(&p.ticker),
                    Some(TechnicalSignal::StrongBuy)
                )
            })
            .count();
        let buy_frac = strong_buy_count as f64 / longs.len() as f64;
        let recovered = buy_frac >= config.rotation_trigger.recovery_threshold;
        let days_elapsed = current
            .entered_at
            .map(|entered| (now - entered).num_days())
            .unwrap_or(0);
        let timed_out = days_elapsed >= config.rotation_trigger.max_days;

        if recovered || timed_out {
            self.state.write(ROTATION_STATE_FILE, &RotationModeState::default())?;
            info!("rotation mode exited: recovered={recovered} (buy_frac={buy_frac:.2}) timed_out={timed_out}");
            return Ok(Some(RotationTransition::Exit));
        }

        Ok(None)
    }
}
