use crate::types::Side;
use std::time::Duration;

/// Errors produced while talking to the tracking source or processing its updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Update stream ended")]
    StreamEnded,

    #[error("No update received for {0:?}")]
    IdleTimeout(Duration),

    #[error("Malformed update ({}{}): {}", side_prefix(.side), .field, .detail)]
    Malformed {
        side: Option<Side>,
        field: &'static str,
        detail: String,
    },

    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(String),

    #[error("Failed to start transport runtime: {0}")]
    Runtime(String),
}

fn side_prefix(side: &Option<Side>) -> String {
    match side {
        Some(side) => format!("{} ", side),
        None => String::new(),
    }
}

impl StreamError {
    /// True for failures of the link itself, which the acquisition loop retries.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::Connect { .. }
                | StreamError::ConnectTimeout { .. }
                | StreamError::Transport(_)
                | StreamError::StreamEnded
                | StreamError::IdleTimeout(_)
        )
    }

    pub(crate) fn malformed(side: Option<Side>, field: &'static str, detail: impl Into<String>) -> Self {
        StreamError::Malformed {
            side,
            field,
            detail: detail.into(),
        }
    }
}
