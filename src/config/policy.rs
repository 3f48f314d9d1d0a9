//! Policy Configuration: the single hot-reloaded JSON document driving
//! stop-losses, profit protection, dip-buying, capital rules, fallback
//! thresholds, and rotation triggers. All numeric thresholds are
//! fractions (0.20 = 20%).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitProtectionEntry {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub reason: String,
    #[serde(default)]
    pub trigger_review: bool,
    pub position_type: PositionType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DipBuying {
    pub enabled: bool,
    pub tickers: Vec<String>,
    pub min_pct: f64,
    pub max_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HighBetaPosition {
    pub beta: f64,
    pub extreme: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewIntervals {
    pub strategy_hours: f64,
    pub discovery_hours: f64,
    /// Clock hour (exchange-local, 0-23) discovery cadence starts from.
    pub discovery_start_clock: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapitalManagement {
    pub opportunity_reserve_fraction: f64,
    pub max_margin_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RsiProfitTaking {
    pub rsi_threshold: f64,
    pub min_profit_pct: f64,
    pub trim_pct: f64,
}

impl Default for RsiProfitTaking {
    fn default() -> Self {
        Self {
            rsi_threshold: 80.0,
            min_profit_pct: 20.0,
            trim_pct: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtremeOverbought {
    pub rsi_threshold: f64,
    pub min_profit_pct: f64,
    pub trim_pct: f64,
}

impl Default for ExtremeOverbought {
    fn default() -> Self {
        Self {
            rsi_threshold: 85.0,
            min_profit_pct: 30.0,
            trim_pct: 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSizeLimit {
    pub max_position_pct: f64,
    pub target_position_pct: f64,
}

impl Default for PositionSizeLimit {
    fn default() -> Self {
        Self {
            max_position_pct: 35.0,
            target_position_pct: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CashReserveFloor {
    pub min_cash_pct: f64,
    pub min_profit_to_trim_pct: f64,
    pub trim_pct: f64,
}

impl Default for CashReserveFloor {
    fn default() -> Self {
        Self {
            min_cash_pct: 8.0,
            min_profit_to_trim_pct: 25.0,
            trim_pct: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FallbackRules {
    #[serde(default)]
    pub rsi_profit_taking: RsiProfitTaking,
    #[serde(default)]
    pub extreme_overbought: ExtremeOverbought,
    #[serde(default)]
    pub position_size_limit: PositionSizeLimit,
    #[serde(default)]
    pub cash_reserve_floor: CashReserveFloor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotationTrigger {
    pub enabled: bool,
    pub strong_sell_threshold: f64,
    pub recovery_threshold: f64,
    pub vice_tickers: Vec<String>,
    pub max_days: i64,
    #[serde(default = "RotationTrigger::default_cap")]
    pub max_vice_allocation_pct: f64,
}

impl RotationTrigger {
    fn default_cap() -> f64 {
        0.25
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortSelling {
    pub max_short_positions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CircuitBreakerConfig {
    #[serde(default = "CircuitBreakerConfig::default_daily_loss_limit")]
    pub daily_loss_limit: f64,
    #[serde(default = "CircuitBreakerConfig::default_gap_threshold")]
    pub gap_threshold: f64,
}

impl CircuitBreakerConfig {
    fn default_daily_loss_limit() -> f64 {
        0.02
    }
    fn default_gap_threshold() -> f64 {
        0.02
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefensiveConfig {
    #[serde(default = "DefensiveConfig::default_stop_loss")]
    pub defensive_stop_loss: f64,
    #[serde(default = "DefensiveConfig::default_loss_exit_pct")]
    pub close_long_below_pct: f64,
    #[serde(default = "DefensiveConfig::default_retain_pct")]
    pub retain_above_pct: f64,
}

impl DefensiveConfig {
    fn default_stop_loss() -> f64 {
        0.10
    }
    fn default_loss_exit_pct() -> f64 {
        -0.10
    }
    fn default_retain_pct() -> f64 {
        0.05
    }
}

impl Default for DefensiveConfig {
    fn default() -> Self {
        Self {
            defensive_stop_loss: Self::default_stop_loss(),
            close_long_below_pct: Self::default_loss_exit_pct(),
            retain_above_pct: Self::default_retain_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub default_stop_loss: f64,
    pub vix_stop_losses: HashMap<String, f64>,
    #[serde(default)]
    pub position_stop_losses: HashMap<String, f64>,
    #[serde(default)]
    pub profit_protection: HashMap<String, ProfitProtectionEntry>,
    pub dip_buying: DipBuying,
    #[serde(default)]
    pub high_beta_positions: HashMap<String, HighBetaPosition>,
    pub review_intervals: ReviewIntervals,
    pub capital_management: CapitalManagement,
    #[serde(default)]
    pub fallback_rules: FallbackRules,
    pub rotation_trigger: RotationTrigger,
    pub short_selling: ShortSelling,
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub scan_universe: Vec<String>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub defensive: DefensiveConfig,
    /// Overnight news-scan wall-clock times, "HH:MM" exchange-local.
    #[serde(default)]
    pub overnight_scan_times: Vec<String>,
    #[serde(default = "PolicyConfig::default_premarket_clock")]
    pub premarket_briefing_clock: String,
    #[serde(default = "PolicyConfig::default_weekend_clock")]
    pub weekend_briefing_clock: String,
}

impl PolicyConfig {
    fn default_premarket_clock() -> String {
        "08:30".to_string()
    }
    fn default_weekend_clock() -> String {
        "18:00".to_string()
    }

    /// Resolve the stop-loss fraction for a ticker by priority: (1)
    /// per-ticker override, (2) defensive-mode floor, (3) regime-map
    /// entry, (4) default. VIX HIGH then clamps every position to 10%
    /// and VIX ELEVATED clamps extreme-beta positions to 10%, tightening
    /// whatever the priority chain above resolved to.
    pub fn stop_loss_for(
        &self,
        ticker: &str,
        regime: crate::domain::VixRegime,
        defensive_floor: Option<f64>,
    ) -> f64 {
        let base = if let Some(&over) = self.position_stop_losses.get(ticker) {
            over
        } else if let Some(floor) = defensive_floor {
            floor
        } else if let Some(&by_regime) = self.vix_stop_losses.get(&regime.to_string()) {
            by_regime
        } else {
            self.default_stop_loss
        };

        match regime {
            crate::domain::VixRegime::High => base.min(0.10),
            crate::domain::VixRegime::Elevated
                if self.high_beta_positions.get(ticker).is_some_and(|p| p.extreme) =>
            {
                base.min(0.10)
            }
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_loss_priority_override_wins_over_regime() {
        let mut cfg = sample();
        cfg.position_stop_losses.insert("AMD".into(), 0.10);
        cfg.vix_stop_losses.insert("NORMAL".into(), 0.20);
        assert_eq!(
            cfg.stop_loss_for("AMD", crate::domain::VixRegime::Normal, None),
            0.10
        );
    }

    #[test]
    fn defensive_floor_wins_over_regime_when_no_override() {
        let mut cfg = sample();
        cfg.vix_stop_losses.insert("NORMAL".into(), 0.20);
        assert_eq!(
            cfg.stop_loss_for("MSFT", crate::domain::VixRegime::Normal, Some(0.10)),
            0.10
        );
    }

    #[test]
    fn high_regime_tightens_every_position_to_10_pct() {
        let mut cfg = sample();
        cfg.position_stop_losses.insert("AMD".into(), 0.25);
        assert_eq!(
            cfg.stop_loss_for("AMD", crate::domain::VixRegime::High, None),
            0.10
        );
    }

    #[test]
    fn elevated_regime_tightens_only_extreme_beta_positions() {
        let mut cfg = sample();
        cfg.high_beta_positions.insert(
            "TSLA".into(),
            HighBetaPosition { beta: 2.0, extreme: true },
        );
        cfg.vix_stop_losses.insert("ELEVATED".into(), 0.25);
        assert_eq!(
            cfg.stop_loss_for("TSLA", crate::domain::VixRegime::Elevated, None),
            0.10
        );
        assert_eq!(
            cfg.stop_loss_for("MSFT", crate::domain::VixRegime::Elevated, None),
            0.25
        );
    }

    #[test]
    fn falls_back_to_default() {
        let cfg = sample();
        assert_eq!(
            cfg.stop_loss_for("ZZZ", crate::domain::VixRegime::Calm, None),
            cfg.default_stop_loss
        );
    }

    fn sample() -> PolicyConfig {
        PolicyConfig {
            default_stop_loss: 0.20,
            vix_stop_losses: HashMap::new(),
            position_stop_losses: HashMap::new(),
            profit_protection: HashMap::new(),
            dip_buying: DipBuying {
                enabled: true,
                tickers: vec![],
                min_pct: 0.05,
                max_pct: 0.15,
            },
            high_beta_positions: HashMap::new(),
            review_intervals: ReviewIntervals {
                strategy_hours: 4.0,
                discovery_hours: 12.0,
                discovery_start_clock: 10,
            },
            capital_management: CapitalManagement {
                opportunity_reserve_fraction: 0.1,
                max_margin_fraction: 0.5,
            },
            fallback_rules: FallbackRules::default(),
            rotation_trigger: RotationTrigger {
                enabled: true,
                strong_sell_threshold: 0.40,
                recovery_threshold: 0.25,
                vice_tickers: vec![],
                max_days: 10,
                max_vice_allocation_pct: 0.25,
            },
            short_selling: ShortSelling {
                max_short_positions: 2,
            },
            watchlist: vec![],
            scan_universe: vec![],
            circuit_breaker: CircuitBreakerConfig::default(),
            defensive: DefensiveConfig::default(),
            overnight_scan_times: vec![],
            premarket_briefing_clock: "08:30".into(),
            weekend_briefing_clock: "18:00".into(),
        }
    }
}
