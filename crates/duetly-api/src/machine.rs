// Variant-independent client
//
// Both wire variants share one capability contract. `MachineClient` is the
// sum type over them; variant-specific behavior (model polling vs. the model
// WebSocket) is reached through `as_poll` / `as_rest`.

use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDateTime;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::poll::PollClient;
use crate::progress::ProgressFn;
use crate::rest::RestClient;
use crate::session::Session;
use crate::transport::{HttpTransport, TransportConfig};
use crate::types::{CodeAck, FileEntry, FileInfo, Variant};

/// A connected-or-connectable client for either controller variant.
pub enum MachineClient {
    Poll(PollClient),
    Rest(RestClient),
}

impl MachineClient {
    pub fn new(variant: Variant, base_url: Url, config: TransportConfig) -> Result<Self, Error> {
        Ok(match variant {
            Variant::Poll => Self::Poll(PollClient::new(base_url, config)?),
            Variant::Rest => Self::Rest(RestClient::new(base_url, config)?),
        })
    }

    /// Log in, probing the standalone endpoints first.
    ///
    /// A 404 on `rr_connect` means the host is a board computer, so the
    /// REST variant is tried with the same HTTP client.
    pub async fn detect(
        base_url: Url,
        config: TransportConfig,
        password: &SecretString,
    ) -> Result<(Self, Session), Error> {
        let http = config.build_client()?;
        let poll = PollClient::with_client(http.clone(), base_url.clone(), config.clone());
        match poll.connect(password).await {
            Ok(session) => {
                info!("detected standalone firmware");
                Ok((Self::Poll(poll), session))
            }
            Err(Error::UnsupportedEndpoint { path }) => {
                debug!(path, "standalone login endpoint missing, trying REST");
                let rest = RestClient::with_client(http, base_url, config);
                let session = rest.connect(password).await?;
                info!("detected board computer service");
                Ok((Self::Rest(rest), session))
            }
            Err(e) => Err(e),
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Self::Poll(_) => Variant::Poll,
            Self::Rest(_) => Variant::Rest,
        }
    }

    pub fn as_poll(&self) -> Option<&PollClient> {
        match self {
            Self::Poll(c) => Some(c),
            Self::Rest(_) => None,
        }
    }

    pub fn as_rest(&self) -> Option<&RestClient> {
        match self {
            Self::Rest(c) => Some(c),
            Self::Poll(_) => None,
        }
    }

    pub fn transport(&self) -> &HttpTransport {
        match self {
            Self::Poll(c) => c.transport(),
            Self::Rest(c) => c.transport(),
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.transport().session()
    }

    // ── Session ──────────────────────────────────────────────────────

    pub async fn connect(&self, password: &SecretString) -> Result<Session, Error> {
        match self {
            Self::Poll(c) => c.connect(password).await,
            Self::Rest(c) => c.connect(password).await,
        }
    }

    pub async fn relogin(&self) -> Result<Session, Error> {
        match self {
            Self::Poll(c) => c.relogin().await,
            Self::Rest(c) => c.relogin().await,
        }
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        match self {
            Self::Poll(c) => c.disconnect().await,
            Self::Rest(c) => c.disconnect().await,
        }
    }

    // ── Codes ────────────────────────────────────────────────────────

    /// Submit code text. `wait` only matters on the REST variant, where
    /// the reply is returned synchronously.
    pub async fn send_code(&self, code: &str, wait: bool) -> Result<CodeAck, Error> {
        match self {
            Self::Poll(c) => c.send_code(code).await,
            Self::Rest(c) => c.send_code(code, wait).await,
        }
    }

    // ── Files ────────────────────────────────────────────────────────

    pub async fn upload(
        &self,
        path: &str,
        content: Bytes,
        modified: Option<NaiveDateTime>,
        crc32: Option<u32>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<(), Error> {
        match self {
            Self::Poll(c) => {
                c.upload(path, content, modified, crc32, cancel, progress)
                    .await
            }
            Self::Rest(c) => c.upload(path, content, modified, cancel, progress).await,
        }
    }

    pub async fn download(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes, Error> {
        match self {
            Self::Poll(c) => c.download(path, cancel, progress).await,
            Self::Rest(c) => c.download(path, cancel, progress).await,
        }
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        match self {
            Self::Poll(c) => c.delete(path).await,
            Self::Rest(c) => c.delete(path).await,
        }
    }

    pub async fn move_file(&self, from: &str, to: &str, overwrite: bool) -> Result<(), Error> {
        match self {
            Self::Poll(c) => c.move_file(from, to, overwrite).await,
            Self::Rest(c) => c.move_file(from, to, overwrite).await,
        }
    }

    pub async fn make_directory(&self, path: &str) -> Result<(), Error> {
        match self {
            Self::Poll(c) => c.make_directory(path).await,
            Self::Rest(c) => c.make_directory(path).await,
        }
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileEntry>, Error> {
        match self {
            Self::Poll(c) => c.list_files(dir).await,
            Self::Rest(c) => c.list_files(dir).await,
        }
    }

    pub async fn file_info(&self, path: &str) -> Result<FileInfo, Error> {
        match self {
            Self::Poll(c) => c.file_info(path).await,
            Self::Rest(c) => c.file_info(path).await,
        }
    }
}
