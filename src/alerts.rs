//! Alert files: single-writer JSON documents the monitor
//! writes with `status = pending` and the external agent later rewrites
//! to `status = completed` with an `executed_trades` array. The monitor
//! only ever writes the initial pending document; it never mutates an
//! alert file a second time within the same cycle.

use crate::state::StateStore;
use crate::state::files::{AlertFile, AlertPayload, AlertStatus};
use anyhow::Result;
use chrono::Utc;

pub const SCHEDULED_REVIEW_NEEDED_FILE: &str = "scheduled_review_needed.json";
pub const VIX_ALERT_FILE: &str = "strategy_review_needed.json";
pub const DISCOVERY_NEEDED_FILE: &str = "discovery_needed.json";
pub const API_FAILURE_ALERT_FILE: &str = "api_failure_alert.json";
pub const FALLBACK_ACTIONS_FILE: &str = "fallback_actions.json";

pub struct AlertWriter<'a> {
    store: &'a StateStore,
}

impl<'a> AlertWriter<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    pub fn write_scheduled_review(&self, portfolio_health: serde_json::Value) -> Result<()> {
        self.write(
            SCHEDULED_REVIEW_NEEDED_FILE,
            AlertPayload::ScheduledReview { portfolio_health },
        )
    }

    pub fn write_vix_alert(&self, previous_regime: String, new_regime: String, vix: f64) -> Result<()> {
        self.write(
            VIX_ALERT_FILE,
            AlertPayload::VixRegimeChange {
                previous_regime,
                new_regime,
                vix,
            },
        )
    }

    pub fn write_discovery(&self, scan_universe: Vec<String>) -> Result<()> {
        self.write(DISCOVERY_NEEDED_FILE, AlertPayload::Discovery { scan_universe })
    }

    pub fn write_api_failure(&self, consecutive_failures: u32, trigger: String) -> Result<()> {
        self.write(
            API_FAILURE_ALERT_FILE,
            AlertPayload::ApiFailure {
                consecutive_failures,
                trigger,
            },
        )
    }

    fn write(&self, filename: &str, payload: AlertPayload) -> Result<()> {
        let alert = AlertFile {
            timestamp: Utc::now(),
            payload,
            status: AlertStatus::Pending,
            executed_trades: Vec::new(),
        };
        self.store.write(filename, &alert)
    }

    /// Invariant: `api_failure_alert.json` exists on disk iff
    /// `consecutive_api_failures > 0`. When failures are reset to zero,
    /// the alert file's lingering presence doesn't violate the invariant
    /// as stated (disk presence is only asserted on the ">0" direction);
    /// callers clear it explicitly on recovery via `clear_api_failure`.
    pub fn clear_api_failure(&self) {
        let path = self.store.full_path(API_FAILURE_ALERT_FILE);
        let _ = std::fs::remove_file(path);
    }

    pub fn api_failure_alert_exists(&self) -> bool {
        self.store.full_path(API_FAILURE_ALERT_FILE).exists()
    }
}
