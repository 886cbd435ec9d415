// Transport request layer
//
// Issues individual HTTP requests against one controller and classifies
// every failure into the crate's error taxonomy. Both wire variants build
// on `HttpTransport`; they differ only in paths and payload shapes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::progress::{ProgressFn, TransferProgress};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::{SESSION_KEY_HEADER, Session};

const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed board computers).
    DangerAcceptInvalid,
}

/// Shared transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Timeout for requests made without a session.
    pub default_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            default_timeout: Duration::from_secs(4),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No client-wide timeout is set: each request carries its own deadline.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.default_timeout)
            .user_agent(concat!("duetly/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Client(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Client(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

// ── Request ──────────────────────────────────────────────────────────

/// How long a single attempt may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Derived from the live session, or the default timeout without one.
    Session,
    Fixed(Duration),
    /// No deadline (file transfers of unknown duration).
    Unbounded,
}

/// What a request addresses, so a 404 maps to the right file error.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    File(String),
    Directory(String),
}

/// Body attached to a request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Raw {
        bytes: Bytes,
        content_type: &'static str,
    },
    Form(Vec<(String, String)>),
}

/// A single transport request.
///
/// Cheap to clone so the retry loop can reissue it.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    deadline: Deadline,
    target: Option<Target>,
    retries: bool,
    relogin: bool,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressFn>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            deadline: Deadline::Session,
            target: None,
            retries: true,
            relogin: true,
            cancel: None,
            progress: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    pub fn body(mut self, bytes: Bytes, content_type: &'static str) -> Self {
        self.body = Some(RequestBody::Raw {
            bytes,
            content_type,
        });
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// File this request concerns, so a 404 maps to `FileNotFound`.
    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.target = Some(Target::File(path.into()));
        self
    }

    /// Directory this request concerns, so a 404 maps to `DirectoryNotFound`.
    pub fn directory(mut self, path: impl Into<String>) -> Self {
        self.target = Some(Target::Directory(path.into()));
        self
    }

    /// Disable transparent retries of transient failures.
    pub fn no_retry(mut self) -> Self {
        self.retries = false;
        self
    }

    /// Disable the transparent re-login on 401/403.
    pub fn no_relogin(mut self) -> Self {
        self.relogin = false;
        self
    }

    pub fn cancel(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    pub fn progress(mut self, progress: Option<ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn allows_relogin(&self) -> bool {
        self.relogin
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}

// ── HttpTransport ────────────────────────────────────────────────────

/// HTTP client bound to one controller base URL.
///
/// Holds the current [`Session`] so authenticated requests pick up the
/// session key and a timeout derived from the session expiry.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    config: TransportConfig,
    session: ArcSwapOption<Session>,
}

impl HttpTransport {
    pub fn new(base_url: Url, config: TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self::with_client(http, base_url, config))
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, config: TransportConfig) -> Self {
        Self {
            http,
            base_url,
            config,
            session: ArcSwapOption::empty(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn hostname(&self) -> String {
        self.base_url.host_str().unwrap_or_default().to_owned()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.load_full()
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        self.session.store(session.map(Arc::new));
    }

    /// Timeout applied to a request made right now under [`Deadline::Session`].
    pub fn request_timeout(&self) -> Duration {
        match self.session.load().as_deref() {
            Some(session) => self.config.retry.request_timeout(session.session_timeout),
            None => self.config.default_timeout,
        }
    }

    /// Timeout for a retry under [`Deadline::Session`], started `elapsed`
    /// after the first attempt.
    fn retry_timeout(&self, elapsed: Duration, retries: u32) -> Duration {
        match self.session.load().as_deref() {
            Some(session) => {
                self.config
                    .retry
                    .retry_timeout(session.session_timeout, elapsed, retries)
            }
            None => self.config.default_timeout,
        }
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Execute a request, retrying transient failures per the retry policy.
    ///
    /// Auth failures are returned unchanged; the variant client owns the
    /// credential and performs the re-login.
    pub async fn execute(&self, req: &Request) -> Result<Bytes, Error> {
        let policy = self.config.retry;
        let mut timeout = match req.deadline {
            Deadline::Session => Some(self.request_timeout()),
            Deadline::Fixed(d) => Some(d),
            Deadline::Unbounded => None,
        };
        let mut retries = 0;
        let started = Instant::now();

        loop {
            match self.attempt(req, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) if !req.retries => return Err(e),
                Err(e) => match policy.decide(retries, &e, true) {
                    RetryDecision::Retry { delay } => {
                        retries += 1;
                        warn!(path = %req.path, retries, error = %e, "retrying request");
                        sleep(delay, req.cancel.as_ref()).await?;
                        if req.deadline == Deadline::Session {
                            timeout = Some(self.retry_timeout(started.elapsed(), retries));
                        }
                    }
                    RetryDecision::Relogin | RetryDecision::GiveUp => return Err(e),
                },
            }
        }
    }

    async fn attempt(&self, req: &Request, timeout: Option<Duration>) -> Result<Bytes, Error> {
        match req.cancel.as_ref() {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(Error::Cancelled),
                    result = self.send_once(req, timeout) => result,
                }
            }
            None => self.send_once(req, timeout).await,
        }
    }

    async fn send_once(&self, req: &Request, timeout: Option<Duration>) -> Result<Bytes, Error> {
        let mut url = self.url(&req.path)?;
        if !req.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&req.query);
        }
        debug!("{} {}", req.method, url);

        let mut builder = self.http.request(req.method.clone(), url);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        if let Some(key) = self
            .session
            .load()
            .as_deref()
            .and_then(|s| s.session_key.as_ref())
        {
            builder = builder.header(SESSION_KEY_HEADER, key.expose_secret());
        }
        match &req.body {
            Some(RequestBody::Raw {
                bytes,
                content_type,
            }) => {
                builder = builder
                    .header(CONTENT_TYPE, *content_type)
                    .header(CONTENT_LENGTH, bytes.len());
                builder = match &req.progress {
                    Some(progress) => builder.body(upload_body(bytes.clone(), progress.clone())),
                    None => builder.body(bytes.clone()),
                };
            }
            Some(RequestBody::Form(fields)) => {
                builder = builder.form(fields);
            }
            None => {}
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body, req));
        }

        match &req.progress {
            Some(progress) if req.method == Method::GET => {
                read_with_progress(resp, progress, timeout).await
            }
            _ => resp
                .bytes()
                .await
                .map_err(|e| Error::from_reqwest(&e, timeout)),
        }
    }
}

/// Pause between retries, aborting early if the request is cancelled.
async fn sleep(delay: Duration, cancel: Option<&CancellationToken>) -> Result<(), Error> {
    if delay.is_zero() {
        return Ok(());
    }
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

/// Map a non-2xx status into the taxonomy.
fn classify_status(status: StatusCode, body: String, req: &Request) -> Error {
    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized { status: code },
        StatusCode::NOT_FOUND => match &req.target {
            Some(Target::File(path)) => Error::FileNotFound { path: path.clone() },
            Some(Target::Directory(path)) => Error::DirectoryNotFound { path: path.clone() },
            None => Error::UnsupportedEndpoint {
                path: req.path.clone(),
            },
        },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            Error::ServiceUnavailable { status: code }
        }
        _ => Error::OperationFailed {
            reason: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            },
        },
    }
}

/// Stream an upload body in chunks, reporting progress as each is handed over.
#[allow(clippy::as_conversions)]
fn upload_body(bytes: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = bytes.len();
    let stream = async_stream::stream! {
        let mut offset = 0;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK_SIZE).min(total);
            let chunk = bytes.slice(offset..end);
            offset = end;
            // The connection may stop polling once the declared length is sent.
            progress.report(TransferProgress {
                transferred: offset as u64,
                total: Some(total as u64),
            });
            yield Ok::<Bytes, std::io::Error>(chunk);
        }
    };
    reqwest::Body::wrap_stream(stream)
}

#[allow(clippy::as_conversions)]
async fn read_with_progress(
    mut resp: reqwest::Response,
    progress: &ProgressFn,
    timeout: Option<Duration>,
) -> Result<Bytes, Error> {
    let total = resp.content_length();
    let mut buf = BytesMut::with_capacity(
        total
            .and_then(|t| usize::try_from(t).ok())
            .unwrap_or_default(),
    );
    progress.report(TransferProgress {
        transferred: 0,
        total,
    });
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| Error::from_reqwest(&e, timeout))?
    {
        buf.extend_from_slice(&chunk);
        progress.report(TransferProgress {
            transferred: buf.len() as u64,
            total,
        });
    }
    Ok(buf.freeze())
}

// ── Payload decoding ─────────────────────────────────────────────────

/// Parse a JSON body, keeping a preview of the raw text on failure.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| {
        let text = String::from_utf8_lossy(body);
        let preview: String = text.chars().take(200).collect();
        trace!(body = %text, "unparseable response");
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: text.into_owned(),
        }
    })
}

/// Interpret a body as UTF-8 text.
pub fn decode_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
