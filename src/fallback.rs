//! Fallback Engine — applies the deterministic fallback rules
//! sequentially against a live portfolio and submits the resulting
//! orders through the Broker Port when the Agent Port is unavailable.
//! Never opens new positions. Journals what it did to
//! `fallback_actions.json`.

use crate::config::PolicyConfig;
use crate::domain::OrderType;
use crate::domain::PortfolioSnapshot;
use crate::policy::fallback_rules;
use crate::ports::BrokerPort;
use crate::state::StateStore;
use crate::state::files::FallbackActionsFile;
use anyhow::Result;
use chrono::Utc;
use tracing::info;

pub struct FallbackEngine<'a> {
    broker: &'a dyn BrokerPort,
    state: &'a StateStore,
}

impl<'a> FallbackEngine<'a> {
    pub fn new(broker: &'a dyn BrokerPort, state: &'a StateStore) -> Self {
        Self { broker, state }
    }

    /// Apply §4.3 fallback rules (a)-(d) to every position, at most one
    /// rule per position, rule (d) at most once total. `rsi_lookup`
    /// supplies per-ticker RSI from the (out-of-scope) technicals
    /// analytics.
    pub async fn run(
        &self,
        snapshot: &PortfolioSnapshot,
        config: &PolicyConfig,
        consecutive_failures: u32,
        rsi_lookup: impl Fn(&str) -> Option<f64>,
    ) -> Result<Vec<String>> {
        info!("running fallback engine (Claude API unavailable)");
        let total_value = snapshot.total_value();
        let cash_pct = snapshot.cash_weight() * 100.0;
        let mut actions_taken = Vec::new();

        let mut positions: Vec<_> = snapshot.positions.values().collect();
        positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        for pos in &positions {
            let rsi = rsi_lookup(&pos.ticker);

            let action = fallback_rules::rsi_profit_taking(
                pos,
                rsi,
                &config.fallback_rules.rsi_profit_taking,
            )
            .or_else(|| {
                fallback_rules::extreme_overbought(
                    pos,
                    rsi,
                    &config.fallback_rules.extreme_overbought,
                )
            })
            .or_else(|| {
                fallback_rules::position_size_limit(
                    pos,
                    total_value,
                    &config.fallback_rules.position_size_limit,
                )
            });

            if let Some(action) = action {
                self.broker
                    .submit_order(&action.ticker, action.side, action.quantity, OrderType::Market, None)
                    .await?;
                actions_taken.push(action.reason.clone());
            }
        }

        if let Some(action) = fallback_rules::cash_reserve_floor(
            &positions,
            cash_pct,
            &config.fallback_rules.cash_reserve_floor,
        ) {
            self.broker
                .submit_order(&action.ticker, action.side, action.quantity, OrderType::Market, None)
                .await?;
            actions_taken.push(action.reason.clone());
        }

        if !actions_taken.is_empty() {
            self.state.write(
                crate::alerts::FALLBACK_ACTIONS_FILE,
                &FallbackActionsFile {
                    timestamp: Utc::now(),
                    actions: actions_taken.clone(),
                    reason: "Claude API unavailable".to_string(),
                    consecutive_failures,
                },
            )?;
            info!("fallback engine executed {} action(s)", actions_taken.len());
        } else {
            info!("fallback engine: no rule conditions met, portfolio OK");
        }

        Ok(actions_taken)
    }
}
