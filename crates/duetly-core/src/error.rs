// ── Core error types ──
//
// Transport failures are classified once, in `duetly-api`, and wrapped
// here unchanged. The remaining variants are failures only the connector
// itself can produce.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Api(#[from] duetly_api::Error),

    // ── Connector state ─────────────────────────────────────────────
    #[error("Not connected to a controller")]
    NotConnected,

    #[error("Already connected; disconnect first")]
    AlreadyConnected,

    // ── Transfers ───────────────────────────────────────────────────
    #[error("Another file batch is already running")]
    TransferBusy,

    #[error("Transfer of {path} failed: {source}")]
    TransferFailed {
        path: String,
        #[source]
        source: duetly_api::Error,
    },

    // ── Configuration ───────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The underlying transport error, if any.
    pub fn api_error(&self) -> Option<&duetly_api::Error> {
        match self {
            Self::Api(e) | Self::TransferFailed { source: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.api_error().is_some_and(duetly_api::Error::is_cancelled)
    }

    pub fn is_terminal_login(&self) -> bool {
        self.api_error()
            .is_some_and(duetly_api::Error::is_terminal_login)
    }
}
