// REST variant HTTP client

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

use crate::error::Error;
use crate::session::Session;
use crate::transport::{HttpTransport, Request, TransportConfig, decode_json};

/// Raw HTTP client for the board computer control service.
pub struct RestClient {
    pub(crate) transport: HttpTransport,
    pub(crate) password: ArcSwapOption<SecretString>,
    pub(crate) relogin_lock: Mutex<()>,
}

impl RestClient {
    pub fn new(base_url: Url, config: TransportConfig) -> Result<Self, Error> {
        Ok(Self::from_transport(HttpTransport::new(base_url, config)?))
    }

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

    /// Fetch the complete object model.
    pub async fn query_model(&self) -> Result<Value, Error> {
        let body = self.send(Request::get("/machine/model")).await?;
        decode_json(&body)
    }

    /// Execute a session-scoped request with one transparent re-login.
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

/// Percent-encode a controller path for use as a single URL segment.
pub(crate) fn encode_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_path_escapes_separators_and_spaces() {
        assert_eq!(encode_path("0:/gcodes/my part.g"), "0%3A%2Fgcodes%2Fmy%20part.g");
    }
}
