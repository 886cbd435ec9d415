// Poll variant HTTP client
//
// Owns the transport and the last-known credential. Every session-scoped
// request goes through `send`, which performs the one transparent re-login
// on 401/403 before reissuing the request.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

use crate::error::Error;
use crate::session::Session;
use crate::transport::{HttpTransport, Request, TransportConfig};

/// `{err}` acknowledgement returned by most `rr_*` mutations.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrResponse {
    #[serde(default)]
    pub err: i64,
}

/// Raw HTTP client for standalone firmware.
pub struct PollClient {
    pub(crate) transport: HttpTransport,
    pub(crate) password: ArcSwapOption<SecretString>,
    /// Serializes concurrent re-login attempts.
    pub(crate) relogin_lock: Mutex<()>,
}

impl PollClient {
    pub fn new(base_url: Url, config: TransportConfig) -> Result<Self, Error> {
        Ok(Self::from_transport(HttpTransport::new(base_url, config)?))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, config: TransportConfig) -> Self {
        Self::from_transport(HttpTransport::with_client(http, base_url, config))
    }

    pub(crate) fn from_transport(transport: HttpTransport) -> Self {
        Self {
            transport,
            password: ArcSwapOption::empty(),
            relogin_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.transport.session()
    }

    /// Execute a session-scoped request.
    ///
    /// A 401/403 triggers one re-login with the stored credential, after
    /// which the request is issued exactly once more.
    pub(crate) async fn send(&self, req: Request) -> Result<Bytes, Error> {
        match self.transport.execute(&req).await {
            Err(e) if e.is_auth_failure() && req.allows_relogin() => {
                warn!(path = req.path(), "session rejected, logging in again");
                self.relogin().await?;
                self.transport.execute(&req.no_retry()).await
            }
            other => other,
        }
    }
}
