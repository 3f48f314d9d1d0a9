//! Binary entry point: parse CLI flags, init `tracing`, load env + policy
//! config, assemble the concrete ports, and run the monitor loop until a
//! shutdown signal arrives.
//!
//! The brokerage and market-data clients are external collaborators
//! specified only by interface. This binary wires the in-memory mock
//! implementations by default; a real deployment swaps `MockBroker`/
//! `MockQuotes` for concrete adapters behind the same `BrokerPort`/
//! `QuotePort` traits without touching anything else here.

use clap::Parser;
use execution_monitor::agent::ProcessAgentPort;
use execution_monitor::clock::SystemClock;
use execution_monitor::config::{ConfigStore, EnvConfig};
use execution_monitor::monitor::Monitor;
use execution_monitor::ports::broker::mock::MockBroker;
use execution_monitor::ports::quote::mock::MockQuotes;
use execution_monitor::state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "execution-monitor", about = "Autonomous trading execution monitor")]
struct Cli {
    /// Path to the hot-reloaded policy/thresholds document.
    #[arg(long)]
    policy_path: Option<String>,

    /// Directory for durable state and alert files.
    #[arg(long)]
    state_dir: Option<String>,

    /// Log every policy decision without submitting orders to the broker.
    #[arg(long)]
    dry_run: bool,

    /// Run a single cycle and exit, instead of looping forever.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut env_config = EnvConfig::from_env()?;
    if let Some(policy_path) = cli.policy_path {
        env_config.policy_path = policy_path.into();
    }
    if let Some(state_dir) = cli.state_dir {
        env_config.state_dir = state_dir.into();
    }
    let dry_run = env_config.dry_run || cli.dry_run;

    tracing::info!(
        policy_path = ?env_config.policy_path,
        state_dir = ?env_config.state_dir,
        dry_run,
        "starting execution monitor"
    );

    let policy = ConfigStore::load(&env_config.policy_path)?;
    let state = StateStore::new(&env_config.state_dir);
    let shared_state = Arc::new(StateStore::new(&env_config.state_dir));

    let clock = SystemClock::new(env_config.exchange_tz, env_config.local_tz);
    let broker = MockBroker::new(execution_monitor::domain::PortfolioSnapshot {
        cash: rust_decimal::Decimal::new(10_000_00, 2),
        positions: HashMap::new(),
    });
    let quotes = MockQuotes::new();
    let agent = ProcessAgentPort::new(
        env_config.agent_cli_path.clone(),
        env_config.project_dir.clone(),
        shared_state,
        true,
    );

    let mut monitor = Monitor::new(clock, broker, quotes, agent, state, policy, dry_run, env_config.check_interval_secs);

    if cli.once {
        monitor.tick().await?;
        return Ok(());
    }

    let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    monitor.run(shutdown_rx).await
}
