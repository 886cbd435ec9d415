//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use duetly_config::ConfigError;
use duetly_core::{ApiError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const BUSY: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(duetly::connection_failed),
        help(
            "Check that the board is powered and reachable.\n\
             URL: {url}\n\
             Try: duetly status --protocol poll (or rest) to skip detection"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: ApiError,
    },

    #[error("Controller connection lost")]
    #[diagnostic(code(duetly::disconnected))]
    Disconnected {
        #[source]
        source: ApiError,
    },

    // ── Login ────────────────────────────────────────────────────────
    #[error("The board rejected the password")]
    #[diagnostic(
        code(duetly::auth_failed),
        help("Run: duetly config set-password --profile {profile}")
    )]
    AuthFailed { profile: String },

    #[error("No free session on the controller")]
    #[diagnostic(
        code(duetly::no_free_session),
        help("Close another web interface or client session and try again.")
    )]
    NoFreeSession,

    #[error("Firmware API level {api_level} is not supported")]
    #[diagnostic(
        code(duetly::incompatible),
        help("Update RepRapFirmware to 3.x or later.")
    )]
    Incompatible { api_level: u32 },

    // ── Files ────────────────────────────────────────────────────────
    #[error("'{path}' not found")]
    #[diagnostic(code(duetly::not_found), help("Run: duetly ls <dir> to see available files"))]
    NotFound { path: String },

    #[error("Another transfer batch is already running")]
    #[diagnostic(code(duetly::busy))]
    Busy,

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller error ({code}): {message}")]
    #[diagnostic(code(duetly::controller_error))]
    Controller { code: String, message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(duetly::timeout),
        help("Increase timeout with --timeout-ms or check the board's network link.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(duetly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(duetly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: duetly config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(duetly::no_config),
        help(
            "Create a profile with: duetly config init\n\
             Or pass --host. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(duetly::config))]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(duetly::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(duetly::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoFreeSession | Self::Incompatible { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Busy => exit_code::BUSY,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(e) | CoreError::TransferFailed { source: e, .. } => e.into(),
            CoreError::TransferBusy => CliError::Busy,
            CoreError::NotConnected | CoreError::AlreadyConnected => CliError::Controller {
                code: "state".into(),
                message: err.to_string(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Controller {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidPassword | ApiError::LoginFailed { .. } => CliError::AuthFailed {
                profile: "current".into(),
            },
            ApiError::NoFreeSession => CliError::NoFreeSession,
            ApiError::IncompatibleVersion { api_level } => CliError::Incompatible { api_level },
            ApiError::FileNotFound { path }
            | ApiError::DirectoryNotFound { path }
            | ApiError::DriveUnmounted { path } => CliError::NotFound { path },
            ApiError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            e @ (ApiError::Disconnected { .. }
            | ApiError::ServiceUnavailable { .. }
            | ApiError::Unauthorized { .. }
            | ApiError::WebSocket(_)) => CliError::Disconnected { source: e },
            other => CliError::Controller {
                code: format!("{:?}", other.class()).to_lowercase(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failures_exit_with_auth_code() {
        let err = CliError::from(CoreError::Api(ApiError::InvalidPassword));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn failed_transfers_report_the_file() {
        let err = CliError::from(CoreError::TransferFailed {
            path: "0:/gcodes/a.g".into(),
            source: ApiError::FileNotFound {
                path: "0:/gcodes/a.g".into(),
            },
        });
        assert!(matches!(err, CliError::NotFound { ref path } if path == "0:/gcodes/a.g"));
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn code_errors_are_general_failures() {
        let err = CliError::from(ApiError::CodeBuffer);
        assert!(matches!(err, CliError::Controller { ref code, .. } if code == "code"));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
