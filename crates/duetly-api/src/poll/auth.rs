// Poll variant authentication
//
// `rr_connect` login handshake and `rr_disconnect` logout. The handshake
// carries the password and the client's local time; its `err` code
// distinguishes the login failure modes.

use std::time::Duration;

use chrono::Local;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Error;
use crate::poll::client::PollClient;
use crate::session::{DEFAULT_SESSION_TIMEOUT, Session};
use crate::transport::{Request, decode_json};
use crate::types::format_timestamp;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    #[serde(default)]
    err: i64,
    /// Milliseconds.
    session_timeout: Option<u64>,
    board_type: Option<String>,
    api_level: Option<u32>,
    session_key: Option<Value>,
}

impl PollClient {
    /// Perform the login handshake and install the resulting session.
    ///
    /// On any failure no session is held afterwards.
    pub async fn connect(&self, password: &SecretString) -> Result<Session, Error> {
        self.transport.set_session(None);
        let session = self.login(password).await?;
        self.password.store(Some(std::sync::Arc::new(password.clone())));
        self.transport.set_session(Some(session.clone()));
        info!(
            host = %session.hostname,
            api_level = session.api_level,
            board = session.board_type.as_deref().unwrap_or("unknown"),
            "session established"
        );
        Ok(session)
    }

    /// Re-perform the handshake with the last-known credential.
    pub async fn relogin(&self) -> Result<Session, Error> {
        let _guard = self.relogin_lock.lock().await;
        let password = self
            .password
            .load_full()
            .ok_or(Error::InvalidPassword)?;
        let session = self.login(&password).await?;
        self.transport.set_session(Some(session.clone()));
        debug!("re-login successful");
        Ok(session)
    }

    /// End the session.
    ///
    /// The local session is cleared even if the logout request fails.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let req = Request::get("/rr_disconnect").no_retry().no_relogin();
        let result = self.transport.execute(&req).await.map(|_| ());
        self.transport.set_session(None);
        debug!("logout complete");
        result
    }

    async fn login(&self, password: &SecretString) -> Result<Session, Error> {
        let req = Request::get("/rr_connect")
            .query("password", password.expose_secret())
            .query("time", format_timestamp(Local::now().naive_local()))
            .no_retry()
            .no_relogin();

        debug!(host = %self.transport.hostname(), "logging in");

        let body = match self.transport.execute(&req).await {
            Err(Error::Unauthorized { .. }) => return Err(Error::InvalidPassword),
            other => other?,
        };
        let resp: ConnectResponse = decode_json(&body)?;
        session_from_response(self.transport.hostname(), resp)
    }
}

fn session_from_response(hostname: String, resp: ConnectResponse) -> Result<Session, Error> {
    match resp.err {
        0 => {}
        1 => return Err(Error::InvalidPassword),
        2 => return Err(Error::NoFreeSession),
        code => return Err(Error::LoginFailed { code }),
    }

    let api_level = resp.api_level.unwrap_or(0);
    if api_level < 1 {
        return Err(Error::IncompatibleVersion { api_level });
    }

    let mut session = Session::new(hostname);
    session.api_level = api_level;
    session.board_type = resp.board_type;
    session.session_timeout = resp
        .session_timeout
        .filter(|&ms| ms > 0)
        .map_or(DEFAULT_SESSION_TIMEOUT, Duration::from_millis);
    session.session_key = match resp.session_key {
        Some(Value::Number(n)) => Some(SecretString::from(n.to_string())),
        Some(Value::String(s)) if !s.is_empty() => Some(SecretString::from(s)),
        _ => None,
    };
    Ok(session)
}
