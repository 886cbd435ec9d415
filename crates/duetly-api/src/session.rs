// Authenticated session state
//
// Produced by a successful login handshake and held by the transport so
// every later request can carry the session key and derive its timeout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Header carrying the session key on every authenticated request.
pub const SESSION_KEY_HEADER: &str = "X-Session-Key";

/// Session timeout assumed when the controller does not report one.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(8);

/// An authenticated, time-bounded connection to one controller.
#[derive(Debug, Clone)]
pub struct Session {
    /// Host the session was established with.
    pub hostname: String,
    /// Controller-side session expiry.
    pub session_timeout: Duration,
    /// Optional key the controller expects on every request.
    pub session_key: Option<SecretString>,
    /// Protocol capability level reported at login.
    pub api_level: u32,
    /// Board identifier (standalone firmware only).
    pub board_type: Option<String>,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            session_key: None,
            api_level: 1,
            board_type: None,
            established_at: Utc::now(),
        }
    }
}
