//! Health crate error types.

use thiserror::Error;

/// Why a probe could not complete. Never escapes a [`crate::CheckStrategy`];
/// it is logged and folded into a failed [`upwatch_core::RawProbeResult`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("websocket upgrade refused: {0}")]
    Upgrade(String),

    #[error("no entropy for websocket key: {0}")]
    Entropy(String),

    #[error("tls setup failed: {0}")]
    Tls(String),
}

/// Failure of one side-effect step for one site. Logged by the cycle,
/// which then moves on to the next site.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("history write failed for {slug}: {source}")]
    History {
        slug: String,
        source: upwatch_state::StateError,
    },

    #[error("commit failed for {slug}: {source}")]
    Commit {
        slug: String,
        source: anyhow::Error,
    },

    #[error("issue tracker call failed for {slug}: {source}")]
    Tracker {
        slug: String,
        source: anyhow::Error,
    },
}

pub type MonitorResult<T> = Result<T, MonitorError>;
