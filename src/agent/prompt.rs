//! Prompt construction for the Agent Port. Each trigger embeds
//! different context; the `scheduled` trigger additionally carries a
//! hard textual short-cap block.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    ProfitProtection,
    VixAlert,
    Discovery,
    Premarket,
    Weekend,
    Rotation,
    Defensive,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trigger::Scheduled => "scheduled",
            Trigger::ProfitProtection => "profit_protection",
            Trigger::VixAlert => "vix_alert",
            Trigger::Discovery => "discovery",
            Trigger::Premarket => "premarket",
            Trigger::Weekend => "weekend",
            Trigger::Rotation => "rotation",
            Trigger::Defensive => "defensive",
        };
        write!(f, "{s}")
    }
}

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn scheduled(
        interval_hours: f64,
        existing_shorts: &[String],
        max_short_positions: usize,
        opportunity_reserve_pct: f64,
        max_margin_pct: f64,
    ) -> String {
        let interval_str = if interval_hours < 1.0 {
            format!("{} minutes", (interval_hours * 60.0) as i64)
        } else {
            format!("{interval_hours} hour(s)")
        };

        let short_count = existing_shorts.len();
        let short_block = if short_count >= max_short_positions {
            format!(
                "\n***** HARD BLOCK: NO NEW SHORTS ALLOWED *****\n\
                 Current short positions: {short_count}/{max_short_positions} (AT MAXIMUM)\n\
                 Existing shorts: {}\n\
                 DO NOT open ANY new short positions. Only manage existing shorts.\n\
                 *********************************************",
                if existing_shorts.is_empty() {
                    "none".to_string()
                } else {
                    existing_shorts.join(", ")
                }
            )
        } else if !existing_shorts.is_empty() {
            format!(
                "\n***** BLOCKED TICKERS FOR SHORTING *****\n\
                 Existing short positions ({short_count}/{max_short_positions}): {}\n\
                 DO NOT open new shorts in: {}\n\
                 Only {} new short position(s) allowed in OTHER tickers.\n\
                 ****************************************",
                existing_shorts.join(", "),
                existing_shorts.join(", "),
                max_short_positions - short_count
            )
        } else {
            format!("\nShort positions: {short_count}/{max_short_positions} (can open up to {max_short_positions} new shorts)")
        };

        format!(
            "A scheduled strategy review is due (runs every {interval_str}).\n\
             Run the strategy review to scan for opportunities and adjust positions as needed.\n\
             Check portfolio_health in scheduled_review_needed.json for correlation and sector data.\n\
             Also check the watchlist for entry opportunities.\n\n\
             Capital rules:\n\
             - Maintain {:.0}% opportunity reserve\n\
             - Max margin: {:.0}% - clear margin ASAP when positions profit\n\
             {short_block}\n\n\
             Address any concentration risks or high-correlation pairs flagged in the alert.",
            opportunity_reserve_pct * 100.0,
            max_margin_pct * 100.0,
        )
    }

    pub fn profit_protection(ticker: &str) -> String {
        format!(
            "A profit protection sell was triggered for {ticker}.\n\
             Run a strategy review to analyze the portfolio and redeploy the proceeds.\n\
             Check portfolio correlation and sector concentration before adding positions.\n\
             Execute trades as recommended by the strategy review."
        )
    }

    pub fn vix_alert(previous_regime: &str, new_regime: &str, vix: f64) -> String {
        format!(
            "VIX regime changed: {previous_regime} -> {new_regime} (VIX={vix:.1}).\n\
             Run a strategy review to assess defensive posture and adjust positions if needed.\n\
             Check portfolio correlation - high-correlation positions amplify risk during volatility."
        )
    }

    pub fn discovery(scan_universe: &[String], holdings: &[String], cash_posture: &str, short_rules: &str) -> String {
        format!(
            "Discovery scan is due.\n\
             Scan universe: {}\n\
             Current holdings: {}\n\
             Cash posture: {cash_posture}\n\
             Short-selling constraints: {short_rules}",
            scan_universe.join(", "),
            holdings.join(", "),
        )
    }

    pub fn premarket() -> String {
        "Pre-market briefing is due. Summarize overnight developments affecting current holdings and the watchlist.".to_string()
    }

    pub fn weekend() -> String {
        "Weekend briefing is due. Summarize the week and outline watchlist priorities for the coming week.".to_string()
    }

    pub fn rotation_enter(vice_tickers: &[String], max_vice_allocation_pct: f64) -> String {
        format!(
            "Rotation trigger fired: a majority of long holdings show STRONG_SELL signals.\n\
             Rotate capital into the defensive set: {}.\n\
             Cap allocation to this set at {:.0}% of portfolio.",
            vice_tickers.join(", "),
            max_vice_allocation_pct * 100.0,
        )
    }

    pub fn rotation_exit(vice_tickers: &[String]) -> String {
        format!(
            "Rotation recovery condition met: rotate capital out of the defensive set ({}) back into growth holdings.",
            vice_tickers.join(", "),
        )
    }

    pub fn defensive(excess_cash: rust_decimal::Decimal) -> String {
        format!(
            "Entered defensive mode. Excess cash available for redeployment: ${excess_cash:.2}.\n\
             Choose one of the following options:\n\
             1. Add to an existing strong performer\n\
             2. Allocate to a broad market ETF\n\
             3. Allocate to a defensive-sector ETF\n\
             4. Hold cash until conditions stabilize"
        )
    }
}
