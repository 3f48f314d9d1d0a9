use thiserror::Error;

/// Unrecoverable invariant violations: treated as bugs — return an
/// error, do not silently flip the sign.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("cannot SHORT {ticker}: already long {existing_qty}")]
    ShortOnLongPosition {
        ticker: String,
        existing_qty: rust_decimal::Decimal,
    },

    #[error("cannot BUY {ticker}: already short {existing_qty}")]
    BuyOnShortPosition {
        ticker: String,
        existing_qty: rust_decimal::Decimal,
    },

    #[error("short cap reached: {short_count}/{max_short_positions}, refusing to open new short in {ticker}")]
    ShortCapExceeded {
        ticker: String,
        short_count: usize,
        max_short_positions: usize,
    },
}

/// Failure modes for the Agent Port, distinguishing retriable (transient
/// external) failures from terminal ones.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent CLI not found on PATH")]
    CliNotFound,

    #[error("agent invocation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("agent auth missing: set CLAUDE_CODE_OAUTH_TOKEN or ANTHROPIC_API_KEY")]
    MissingAuth,

    #[error("agent exited with code {code}: {stderr_tail}")]
    NonZeroExit {
        code: i32,
        stderr_tail: String,
        retriable: bool,
    },

    #[error("agent stdout was not a valid response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("I/O error spawning agent: {0}")]
    Spawn(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this failure is worth retrying within the backoff schedule.
    /// Timeouts and a missing CLI are not retriable; a non-zero exit is
    /// retriable only when the caller identified a transient marker.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AgentError::NonZeroExit { retriable: true, .. })
    }
}
