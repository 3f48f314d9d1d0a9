//! Integration tests for the Monitor Loop (scenarios S3-S6), driving
//! `Monitor::tick()` end to end against a `FakeClock` and the
//! in-memory mock ports, exercising a full cycle instead of a single
//! function.

use async_trait::async_trait;
use chrono_tz::America::New_York;
use execution_monitor::agent::{AgentExhausted, AgentPort, AgentResponse, Trigger};
use execution_monitor::alerts::{FALLBACK_ACTIONS_FILE, VIX_ALERT_FILE};
use execution_monitor::clock::FakeClock;
use execution_monitor::config::ConfigStore;
use execution_monitor::domain::{OrderSide, Position, PortfolioSnapshot};
use execution_monitor::monitor::Monitor;
use execution_monitor::ports::broker::mock::MockBroker;
use execution_monitor::ports::quote::mock::MockQuotes;
use execution_monitor::state::StateStore;
use execution_monitor::state::files::{
    DefensiveModeState, FallbackActionsFile, PriorClose, RotationModeState, VixHistory,
    VixHistoryEntry, DEFENSIVE_STATE_FILE, PRIOR_CLOSE_FILE, ROTATION_STATE_FILE, VIX_LOG_FILE,
};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;

/// Records every trigger it was invoked with and always succeeds —
/// stands in for a healthy reasoning agent.
struct RecordingAgent {
    triggers: Mutex<Vec<Trigger>>,
}

impl RecordingAgent {
    fn new() -> Self {
        Self {
            triggers: Mutex::new(Vec::new()),
        }
    }

    fn triggers(&self) -> Vec<Trigger> {
        self.triggers.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentPort for RecordingAgent {
    async fn invoke(&self, trigger: Trigger, _prompt: &str) -> Result<AgentResponse, AgentExhausted> {
        self.triggers.lock().unwrap().push(trigger);
        Ok(AgentResponse {
            duration_ms: 10,
            total_cost_usd: 0.001,
            result: "ok".into(),
        })
    }
}

/// Always reports exhaustion with the fallback threshold already
/// crossed — stands in for a reasoning agent the API has stopped
/// serving.
struct ExhaustedAgent;

#[async_trait]
impl AgentPort for ExhaustedAgent {
    async fn invoke(&self, _trigger: Trigger, _prompt: &str) -> Result<AgentResponse, AgentExhausted> {
        Err(AgentExhausted {
            consecutive_failures: 2,
            should_run_fallback: true,
        })
    }
}

fn tmp_state_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("execmon-monitor-test-{label}-{}", rand::random::<u64>()))
}

fn load_policy(dir: &std::path::Path, json: serde_json::Value) -> ConfigStore {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("thresholds.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
    ConfigStore::load(&path).unwrap()
}

/// A Monday 10:00 America/New_York wall clock — inside market hours,
/// far from any premarket/weekend briefing window.
fn market_hours_clock() -> FakeClock {
    let t = New_York.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).single().unwrap();
    FakeClock::new(t, t)
}

/// Minimal policy document with every trigger this test suite doesn't
/// care about dialed off: no discovery, no overnight scans, no
/// briefings at 10:00, rotation/dip-buying toggled by the caller.
fn base_policy(rotation_enabled: bool, dip_buying_enabled: bool) -> serde_json::Value {
    serde_json::json!({
        "default_stop_loss": 0.20,
        "vix_stop_losses": {},
        "dip_buying": {
            "enabled": dip_buying_enabled,
            "tickers": [],
            "min_pct": 0.05,
            "max_pct": 0.15
        },
        "review_intervals": {
            "strategy_hours": 4.0,
            "discovery_hours": 12.0,
            "discovery_start_clock": 100
        },
        "capital_management": {
            "opportunity_reserve_fraction": 0.1,
            "max_margin_fraction": 0.5
        },
        "rotation_trigger": {
            "enabled": rotation_enabled,
            "strong_sell_threshold": 0.6,
            "recovery_threshold": 0.25,
            "vice_tickers": [],
            "max_days": 10
        },
        "short_selling": { "max_short_positions": 2 },
        "overnight_scan_times": [],
        "premarket_briefing_clock": "08:30",
        "weekend_briefing_clock": "18:00"
    })
}

/// A VIX regime transition from NORMAL to ELEVATED writes the VIX
/// alert file, appends to the capped history, and invokes the agent
/// with `Trigger::VixAlert`.
#[tokio::test]
async fn s3_vix_regime_transition_triggers_alert_and_agent() {
    let dir = tmp_state_dir("s3");
    let state = StateStore::new(&dir);
    state
        .write(
            VIX_LOG_FILE,
            &VixHistory {
                entries: vec![VixHistoryEntry {
                    timestamp: chrono::Utc::now() - chrono::Duration::hours(1),
                    vix: 18.0,
                    regime: "NORMAL".to_string(),
                }],
            },
        )
        .unwrap();

    let config = load_policy(&dir, base_policy(false, false));
    let clock = market_hours_clock();
    let broker = MockBroker::new(PortfolioSnapshot {
        cash: dec!(10000),
        positions: HashMap::new(),
    });
    let quotes = MockQuotes::new();
    *quotes.vix.lock().unwrap() = Some(25.0);
    let agent = RecordingAgent::new();

    let mut monitor = Monitor::new(clock, broker, quotes, agent, state, config, false, 60);
    monitor.tick().await.unwrap();

    let history: VixHistory = monitor.state.read(VIX_LOG_FILE).unwrap();
    assert_eq!(history.entries.len(), 2);
    assert_eq!(history.entries.last().unwrap().regime, "ELEVATED");

    let alert: execution_monitor::state::files::AlertFile =
        monitor.state.read(VIX_ALERT_FILE).expect("vix alert file should exist");
    assert!(matches!(
        alert.payload,
        execution_monitor::state::files::AlertPayload::VixRegimeChange { .. }
    ));

    assert!(monitor.agent.triggers().contains(&Trigger::VixAlert));
}

/// A daily loss past the circuit breaker's threshold enters defensive
/// mode, closes positions already below the exit floor, and the mode
/// stays active rather than exiting in the same tick it was entered.
#[tokio::test]
async fn s4_circuit_breaker_trip_enters_defensive_mode() {
    let dir = tmp_state_dir("s4");
    let state = StateStore::new(&dir);
    let clock = market_hours_clock();
    let today = clock.now().exchange_time.date_naive();
    state
        .write(
            PRIOR_CLOSE_FILE,
            &PriorClose {
                date: today,
                total_value: dec!(100000),
            },
        )
        .unwrap();

    let mut positions = HashMap::new();
    positions.insert(
        "DOWN".to_string(),
        Position {
            ticker: "DOWN".into(),
            quantity: dec!(100),
            average_cost: dec!(800),
            current_price: dec!(700), // -12.5%, below the -10% defensive exit floor
        },
    );
    let snapshot = PortfolioSnapshot {
        cash: dec!(20000),
        positions,
    };
    // total_value = 20000 + 100*700 = 90000, a 10% drop from the 100000 baseline.

    let config = load_policy(&dir, base_policy(false, false));
    let broker = MockBroker::new(snapshot);
    let quotes = MockQuotes::new();
    let agent = RecordingAgent::new();

    let mut monitor = Monitor::new(clock, broker, quotes, agent, state, config, false, 60);
    monitor.tick().await.unwrap();

    let defensive: DefensiveModeState = monitor
        .state
        .read(DEFENSIVE_STATE_FILE)
        .expect("defensive_mode_state.json should exist");
    assert!(defensive.active, "defensive mode should still be active at the end of the tick");

    let submitted = monitor.broker.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].0, "DOWN");
    assert_eq!(submitted[0].1, OrderSide::Sell);
    drop(submitted);

    assert!(monitor.agent.triggers().contains(&Trigger::Defensive));

    // A second tick must not re-trip the (already tripped today) breaker.
    monitor.tick().await.unwrap();
    assert_eq!(monitor.broker.submitted.lock().unwrap().len(), 1);
}

/// A majority of long holdings flagged `StrongSell` enters rotation
/// mode and prompts the agent to execute it.
#[tokio::test]
async fn s5_rotation_trigger_enters_and_invokes_agent() {
    let dir = tmp_state_dir("s5");
    let state = StateStore::new(&dir);
    let clock = market_hours_clock();

    let mut positions = HashMap::new();
    for ticker in ["A", "B", "C"] {
        positions.insert(
            ticker.to_string(),
            Position {
                ticker: ticker.into(),
                quantity: dec!(10),
                average_cost: dec!(100),
                current_price: dec!(100),
            },
        );
    }
    let snapshot = PortfolioSnapshot {
        cash: dec!(5000),
        positions,
    };

    let config = load_policy(&dir, base_policy(true, false));
    let broker = MockBroker::new(snapshot);
    let quotes = MockQuotes::new();
    {
        let mut signals = quotes.signals.lock().unwrap();
        signals.insert("A".to_string(), execution_monitor::ports::quote::TechnicalSignal::StrongSell);
        signals.insert("B".to_string(), execution_monitor::ports::quote::TechnicalSignal::StrongSell);
        signals.insert("C".to_string(), execution_monitor::ports::quote::TechnicalSignal::Hold);
    }
    let agent = RecordingAgent::new();

    let mut monitor = Monitor::new(clock, broker, quotes, agent, state, config, false, 60);
    monitor.tick().await.unwrap();

    let rotation: RotationModeState = monitor
        .state
        .read(ROTATION_STATE_FILE)
        .expect("rotation_state.json should exist");
    assert!(rotation.active);
    assert!(monitor.agent.triggers().contains(&Trigger::Rotation));
}

/// An exhausted agent past the fallback threshold routes into the
/// Fallback Engine, which trims the oversized position and journals
/// what it did.
#[tokio::test]
async fn s6_agent_exhaustion_runs_fallback_engine() {
    let dir = tmp_state_dir("s6");
    let state = StateStore::new(&dir);
    let clock = market_hours_clock();

    let mut positions = HashMap::new();
    positions.insert(
        "AAPL".to_string(),
        Position {
            ticker: "AAPL".into(),
            quantity: dec!(100),
            average_cost: dec!(50),
            current_price: dec!(50), // flat P/L: no stop-loss, no profit-protection
        },
    );
    // total_value = 1000 cash + 100*50 = 6000; position is 83% of the
    // portfolio, over the 35% fallback rule (c) cap.
    let snapshot = PortfolioSnapshot {
        cash: dec!(1000),
        positions,
    };

    let config = load_policy(&dir, base_policy(false, false));
    let broker = MockBroker::new(snapshot);
    let quotes = MockQuotes::new();
    let agent = ExhaustedAgent;

    let mut monitor = Monitor::new(clock, broker, quotes, agent, state, config, false, 60);
    monitor.tick().await.unwrap();

    let journaled: FallbackActionsFile = monitor
        .state
        .read(FALLBACK_ACTIONS_FILE)
        .expect("fallback_actions.json should exist");
    assert_eq!(journaled.actions.len(), 1);
    assert_eq!(journaled.consecutive_failures, 2);

    let submitted = monitor.broker.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].0, "AAPL");
    assert_eq!(submitted[0].1, OrderSide::Sell);
}
