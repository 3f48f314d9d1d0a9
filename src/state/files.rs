//! Typed shapes for each durable state file. Field names are the
//! on-disk JSON keys; unknown fields on read are ignored via `serde`'s
//! default deserialization behavior.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const LAST_REVIEW_FILE: &str = "last_review.json";
pub const LAST_DISCOVERY_FILE: &str = "last_discovery.json";
pub const OVERNIGHT_STATE_FILE: &str = "overnight_state.json";
pub const PRIOR_CLOSE_FILE: &str = "prior_close_state.json";
pub const DEFENSIVE_STATE_FILE: &str = "defensive_mode_state.json";
pub const ROTATION_STATE_FILE: &str = "rotation_state.json";
pub const VIX_LOG_FILE: &str = "vix_log.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastReview {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastDiscovery {
    pub timestamp: DateTime<Utc>,
}

/// Tracks last-run timestamps for overnight scans and the once-per-day
/// pre-market / weekend briefings. Whether the weekend-briefing flag
/// survives a restart is resolved here by persisting it — see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OvernightState {
    pub last_scan: Option<DateTime<Utc>>,
    pub last_premarket_briefing_date: Option<NaiveDate>,
    pub last_weekend_briefing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorClose {
    pub date: NaiveDate,
    pub total_value: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefensiveModeState {
    pub active: bool,
    pub entered_at: Option<DateTime<Utc>>,
    pub pre_value: Option<rust_decimal::Decimal>,
    pub trigger_loss_pct: Option<f64>,
    pub actions: Vec<String>,
}

impl Default for DefensiveModeState {
    fn default() -> Self {
        Self {
            active: false,
            entered_at: None,
            pre_value: None,
            trigger_loss_pct: None,
            actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RotationModeState {
    pub active: bool,
    pub entered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VixHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub vix: f64,
    pub regime: String,
}

/// Append-only ring capped at 1000 entries. Oldest entries are
/// dropped from the front on overflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VixHistory {
    pub entries: Vec<VixHistoryEntry>,
}

impl VixHistory {
    pub const CAP: usize = 1000;

    pub fn push(&mut self, entry: VixHistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > Self::CAP {
            let overflow = self.entries.len() - Self::CAP;
            self.entries.drain(0..overflow);
        }
    }

    pub fn last(&self) -> Option<&VixHistoryEntry> {
        self.entries.last()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "alert_type")]
pub enum AlertPayload {
    #[serde(rename = "SCHEDULED_REVIEW")]
    ScheduledReview { portfolio_health: serde_json::Value },
    #[serde(rename = "VIX_REGIME_CHANGE")]
    VixRegimeChange {
        previous_regime: String,
        new_regime: String,
        vix: f64,
    },
    #[serde(rename = "DISCOVERY")]
    Discovery { scan_universe: Vec<String> },
    #[serde(rename = "API_FAILURE")]
    ApiFailure {
        consecutive_failures: u32,
        trigger: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertFile {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: AlertPayload,
    pub status: AlertStatus,
    #[serde(default)]
    pub executed_trades: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackActionsFile {
    pub timestamp: DateTime<Utc>,
    pub actions: Vec<String>,
    pub reason: String,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vix_history_caps_at_1000() {
        let mut h = VixHistory::default();
        for i in 0..1005 {
            h.push(VixHistoryEntry {
                timestamp: Utc::now(),
                vix: i as f64,
                regime: "NORMAL".into(),
            });
        }
        assert_eq!(h.entries.len(), VixHistory::CAP);
        assert_eq!(h.entries.first().unwrap().vix, 5.0);
    }
}
