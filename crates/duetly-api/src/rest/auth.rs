// REST variant authentication

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Error;
use crate::rest::client::RestClient;
use crate::session::Session;
use crate::transport::{Request, decode_json};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    session_key: Option<String>,
    api_version: Option<u32>,
}

impl RestClient {
    pub async fn connect(&self, password: &SecretString) -> Result<Session, Error> {
        self.transport.set_session(None);
        let session = self.login(password).await?;
        self.password.store(Some(Arc::new(password.clone())));
        self.transport.set_session(Some(session.clone()));
        info!(host = %session.hostname, "session established");
        Ok(session)
    }

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

    /// End the session. Local state is cleared even if the request fails.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let req = Request::get("/machine/disconnect").no_retry().no_relogin();
        let result = self.transport.execute(&req).await.map(|_| ());
        self.transport.set_session(None);
        debug!("logout complete");
        result
    }

    async fn login(&self, password: &SecretString) -> Result<Session, Error> {
        let req = Request::get("/machine/connect")
            .query("password", password.expose_secret())
            .no_retry()
            .no_relogin();

        debug!(host = %self.transport.hostname(), "logging in");

        let body = match self.transport.execute(&req).await {
            Err(Error::Unauthorized { .. }) => return Err(Error::InvalidPassword),
            other => other?,
        };
        let resp: ConnectResponse = decode_json(&body)?;

        let mut session = Session::new(self.transport.hostname());
        session.api_level = resp.api_version.unwrap_or(1);
        session.session_key = resp
            .session_key
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        Ok(session)
    }
}
