//! Agent Port — invokes the external reasoning process with a
//! constructed prompt, retries transient failures with backoff, and
//! falls back to deterministic rules on exhaustion. The subprocess is
//! driven with `tokio::process::Command`, the same way the rest of
//! this crate's I/O boundaries use async `tokio` primitives.

pub mod prompt;

pub use prompt::{PromptBuilder, Trigger};

use crate::alerts::AlertWriter;
use crate::domain::AgentError;
use crate::state::StateStore;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(45),
];
const AGENT_TIMEOUT: Duration = Duration::from_secs(600);
const RETRIABLE_MARKERS: [&str; 4] = ["500", "api_error", "Internal server error", "overloaded"];
const LAST_AGENT_RESPONSE_FILE: &str = "last_agent_response.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub duration_ms: u64,
    pub total_cost_usd: f64,
    pub result: String,
}

/// Outcome of an exhausted invoke: how many consecutive failures have now
/// accumulated, and whether that crosses the fallback threshold.
pub struct AgentExhausted {
    pub consecutive_failures: u32,
    pub should_run_fallback: bool,
}

#[async_trait]
pub trait AgentPort: Send + Sync {
    async fn invoke(&self, trigger: Trigger, prompt: &str) -> Result<AgentResponse, AgentExhausted>;
}

pub struct ProcessAgentPort {
    cli_path: String,
    project_dir: std::path::PathBuf,
    state: std::sync::Arc<StateStore>,
    consecutive_failures: AtomicU32,
    fallback_enabled: bool,
}

impl ProcessAgentPort {
    pub fn new(
        cli_path: String,
        project_dir: std::path::PathBuf,
        state: std::sync::Arc<StateStore>,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            cli_path,
            project_dir,
            state,
            consecutive_failures: AtomicU32::new(0),
            fallback_enabled,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    fn has_auth(&self) -> bool {
        let has_oauth = std::env::var("CLAUDE_CODE_OAUTH_TOKEN").is_ok();
        let has_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map(|v| !v.is_empty() && v != "your_anthropic_api_key_here")
            .unwrap_or(false);
        has_oauth || has_api_key
    }

    async fn run_once(&self, prompt: &str) -> Result<AgentResponse, AgentError> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--allowedTools")
            .arg("Bash,Read,Write,Edit,Glob,Grep,Task")
            .arg("--dangerously-skip-permissions")
            .arg("--output-format")
            .arg("json")
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::CliNotFound
            } else {
                AgentError::Spawn(e)
            }
        })?;

        let output = tokio::time::timeout(AGENT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout(AGENT_TIMEOUT))?
            .map_err(AgentError::Spawn)?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let is_retriable = RETRIABLE_MARKERS.iter().any(|m| stdout.contains(m));
            if is_retriable {
                return Err(AgentError::NonZeroExit {
                    code: output.status.code().unwrap_or(-1),
                    stderr_tail: stderr.chars().take(500).collect(),
                    retriable: true,
                });
            }
            return Err(AgentError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr_tail: stderr.chars().take(500).collect(),
                retriable: false,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let envelope: AgentResponse = serde_json::from_str(&stdout)
            .map_err(|e| AgentError::MalformedEnvelope(e.to_string()))?;
        Ok(envelope)
    }
}

#[async_trait]
impl AgentPort for ProcessAgentPort {
    async fn invoke(&self, trigger: Trigger, prompt: &str) -> Result<AgentResponse, AgentExhausted> {
        info!("invoking strategy agent (trigger={trigger})");

        if !self.has_auth() {
            warn!("agent auth missing, not invoking");
            return Err(self.record_exhaustion(&trigger.to_string()));
        }

        let mut last_err: Option<AgentError> = None;
        for (attempt, delay) in std::iter::once(None)
            .chain(RETRY_DELAYS.iter().map(|d| Some(*d)))
            .enumerate()
        {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            match self.run_once(prompt).await {
                Ok(response) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    let alerts = AlertWriter::new(&self.state);
                    alerts.clear_api_failure();
                    if let Err(e) = self.state.write(LAST_AGENT_RESPONSE_FILE, &response) {
                        warn!("failed to persist last_agent_response.json: {e:#}");
                    }
                    info!(
                        "agent invocation succeeded in {}ms (${:.4})",
                        response.duration_ms, response.total_cost_usd
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let retriable = e.is_retriable();
                    error!("agent invocation attempt {attempt} failed: {e}");
                    last_err = Some(e);
                    if !retriable {
                        break;
                    }
                }
            }
        }

        let _ = last_err;
        Err(self.record_exhaustion(&trigger.to_string()))
    }
}

impl ProcessAgentPort {
    fn record_exhaustion(&self, trigger: &str) -> AgentExhausted {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let alerts = AlertWriter::new(&self.state);
        if let Err(e) = alerts.write_api_failure(failures, trigger.to_string()) {
            warn!("failed to write api_failure_alert.json: {e:#}");
        }
        // Desktop notification is an out-of-scope external collaborator;
        // we only log the attempt.
        warn!("would send non-critical desktop notification: agent API failure #{failures}");

        AgentExhausted {
            consecutive_failures: failures,
            should_run_fallback: self.fallback_enabled && failures >= 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_auth_is_recorded_as_exhaustion() {
        // SAFETY: test runs single-threaded wrt env vars it touches.
        unsafe {
            std::env::remove_var("CLAUDE_CODE_OAUTH_TOKEN");
            std::env::remove_var("ANTHROPIC_API_KEY");
        }
        let dir = std::env::temp_dir().join(format!("execmon-agent-test-{}", rand::random::<u64>()));
        let state = std::sync::Arc::new(StateStore::new(&dir));
        let port = ProcessAgentPort::new("claude".into(), dir, state, true);
        let result = port.invoke(Trigger::Scheduled, "hi").await;
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert_eq!(err.consecutive_failures, 1);
        assert!(!err.should_run_fallback);
    }
}
