//! Config Store. Loads the policy document from a fixed path and
//! hot-reloads it on modification-time change, following the same
//! atomic-file idiom the state layer uses, but for *reading* rather
//! than writing the monitor-owned side of the contract.

pub mod policy;

pub use policy::PolicyConfig;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Environment-derived configuration: file locations, broker/agent
/// process wiring, and timing knobs. One struct assembled once at
/// startup, `Debug + Clone`, read from env vars via `from_env`.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub policy_path: PathBuf,
    pub state_dir: PathBuf,
    pub agent_cli_path: String,
    pub project_dir: PathBuf,
    pub check_interval_secs: u64,
    pub exchange_tz: Tz,
    pub local_tz: Tz,
    pub dry_run: bool,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        let policy_path = std::env::var("MONITOR_POLICY_PATH")
            .unwrap_or_else(|_| "thresholds.json".to_string())
            .into();
        let state_dir = std::env::var("MONITOR_STATE_DIR")
            .unwrap_or_else(|_| ".".to_string())
            .into();
        let agent_cli_path =
            std::env::var("MONITOR_AGENT_CLI").unwrap_or_else(|_| "claude".to_string());
        let project_dir = std::env::var("MONITOR_PROJECT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default());
        let check_interval_secs = std::env::var("MONITOR_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);
        let exchange_tz: Tz = std::env::var("MONITOR_EXCHANGE_TZ")
            .unwrap_or_else(|_| "America/New_York".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MONITOR_EXCHANGE_TZ: {e}"))?;
        let local_tz: Tz = std::env::var("MONITOR_LOCAL_TZ")
            .unwrap_or_else(|_| "America/New_York".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MONITOR_LOCAL_TZ: {e}"))?;
        let dry_run = std::env::var("MONITOR_DRY_RUN")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            policy_path,
            state_dir,
            agent_cli_path,
            project_dir,
            check_interval_secs,
            exchange_tz,
            local_tz,
            dry_run,
        })
    }
}

/// Tracks the policy document's modification time so `maybe_reload` only
/// re-parses the file when it actually changed.
pub struct ConfigStore {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
    current: PolicyConfig,
}

impl ConfigStore {
    /// Initial load. Parse failure here is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (config, mtime) = Self::read(&path)
            .with_context(|| format!("failed to load policy config at {:?}", path))?;
        Ok(Self {
            path,
            last_mtime: Some(mtime),
            current: config,
        })
    }

    fn read(path: &Path) -> Result<(PolicyConfig, SystemTime)> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {:?}", path))?;
        let config: PolicyConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing {:?}", path))?;
        let mtime = std::fs::metadata(path)?.modified()?;
        Ok((config, mtime))
    }

    /// Called at the top of every monitor cycle. Returns the current
    /// config and whether this call actually reloaded it. On parse
    /// failure of a reload, the previous config is retained and a
    /// warning is emitted — the first successful load never logs
    /// "reloaded" (there is nothing to compare against yet).
    pub fn maybe_reload(&mut self) -> (&PolicyConfig, bool) {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(e) => {
                warn!("could not stat policy config {:?}: {e}", self.path);
                return (&self.current, false);
            }
        };

        let changed = match self.last_mtime {
            Some(prev) => mtime != prev,
            None => false,
        };

        if !changed {
            return (&self.current, false);
        }

        match Self::read(&self.path) {
            Ok((config, new_mtime)) => {
                self.current = config;
                self.last_mtime = Some(new_mtime);
                (&self.current, true)
            }
            Err(e) => {
                warn!(
                    "policy config reload failed, retaining previous config: {e:#}"
                );
                self.last_mtime = Some(mtime);
                (&self.current, false)
            }
        }
    }

    pub fn current(&self) -> &PolicyConfig {
        &self.current
    }
}
