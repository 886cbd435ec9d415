use thiserror::Error;

/// Coarse classification of an [`Error`], used by retry decisions and by
/// consumers that only care about the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Login handshake rejected. Terminal, never retried transparently.
    Login,
    /// Connectivity problem (refused, timed out, cancelled, controller busy).
    Network,
    /// The controller accepted the request but reported a failure.
    OperationFailed,
    /// File or directory problem. Never triggers a reconnect.
    File,
    /// G/M/T-code submission problem. Surfaced to the command caller only.
    Code,
    /// Malformed responses, bad URLs, client construction failures.
    Protocol,
}

/// Top-level error type for the `duetly-api` crate.
///
/// Every transport failure is classified exactly once, here, at the lowest
/// layer. `duetly-core` wraps this type without re-mapping it.
#[derive(Debug, Error)]
pub enum Error {
    // ── Login ───────────────────────────────────────────────────────
    /// The controller rejected the password.
    #[error("Invalid password")]
    InvalidPassword,

    /// Every session slot on the controller is taken.
    #[error("No free session available on the controller")]
    NoFreeSession,

    /// The firmware speaks a protocol level this client cannot handle.
    #[error("Incompatible firmware (API level {api_level})")]
    IncompatibleVersion { api_level: u32 },

    /// Any other login failure code.
    #[error("Login failed (code {code})")]
    LoginFailed { code: i64 },

    // ── Network ─────────────────────────────────────────────────────
    /// Connection refused, reset, DNS failure or session gone.
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// Request did not complete within its deadline.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Request aborted through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Controller answered 502/503 (busy or service not started).
    #[error("Controller unavailable (HTTP {status})")]
    ServiceUnavailable { status: u16 },

    /// 401/403 on a session-scoped request. Handled by one transparent
    /// re-login before the request is retried.
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    // ── Server-side failures ────────────────────────────────────────
    /// The controller reported a failure. `reason` carries the raw body or code.
    #[error("Operation failed: {reason}")]
    OperationFailed { reason: String },

    // ── Files ───────────────────────────────────────────────────────
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Drive not mounted: {path}")]
    DriveUnmounted { path: String },

    // ── Codes ───────────────────────────────────────────────────────
    /// The controller has no free code buffer. Recoverable, the caller may retry.
    #[error("Code buffer is full")]
    CodeBuffer,

    /// The controller rejected the code submission.
    #[error("Bad code response: {message}")]
    CodeResponse { message: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// The requested endpoint does not exist on this controller.
    #[error("Endpoint not supported: {path}")]
    UnsupportedEndpoint { path: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// WebSocket handshake or stream failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Building the HTTP client failed (TLS material, invalid headers).
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidPassword
            | Self::NoFreeSession
            | Self::IncompatibleVersion { .. }
            | Self::LoginFailed { .. } => ErrorClass::Login,
            Self::Disconnected { .. }
            | Self::Timeout { .. }
            | Self::Cancelled
            | Self::ServiceUnavailable { .. }
            | Self::Unauthorized { .. }
            | Self::WebSocket(_) => ErrorClass::Network,
            Self::OperationFailed { .. } => ErrorClass::OperationFailed,
            Self::FileNotFound { .. } | Self::DirectoryNotFound { .. } | Self::DriveUnmounted { .. } => {
                ErrorClass::File
            }
            Self::CodeBuffer | Self::CodeResponse { .. } => ErrorClass::Code,
            Self::UnsupportedEndpoint { .. }
            | Self::InvalidUrl(_)
            | Self::Deserialization { .. }
            | Self::Client(_) => ErrorClass::Protocol,
        }
    }

    /// Returns `true` for network failures worth retrying.
    ///
    /// Cancellation is deliberately excluded: an aborted request is not a
    /// connectivity failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::Timeout { .. }
                | Self::ServiceUnavailable { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` for 401/403-class responses.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if new credentials are needed before connecting again.
    pub fn is_terminal_login(&self) -> bool {
        self.class() == ErrorClass::Login
    }

    /// Returns `true` if this error, raised by the update loop, should move
    /// the connection into the reconnecting state.
    pub fn triggers_reconnect(&self) -> bool {
        match self.class() {
            ErrorClass::Network => !self.is_cancelled(),
            ErrorClass::Protocol => matches!(self, Self::Deserialization { .. }),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. } | Self::DirectoryNotFound { .. })
    }

    /// Map a reqwest failure into the taxonomy.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Option<std::time::Duration>) -> Self {
        if err.is_timeout() {
            #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
            let timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
            Self::Timeout { timeout_ms }
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else {
            Self::Disconnected {
                reason: err.to_string(),
            }
        }
    }
}
