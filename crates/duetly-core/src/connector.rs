// ── Connector facade ──
//
// One connector per controller. Cheaply cloneable; every clone drives the
// same session, model and background task.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::NaiveDateTime;
use duetly_api::{CodeAck, FileEntry, FileInfo, MachineClient, ProgressFn, Session, Variant};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::expects_reply;
use crate::config::ConnectorConfig;
use crate::error::CoreError;
use crate::event::{ConnectionState, ConnectorEvent};
use crate::model::ObjectModel;
use crate::session;
use crate::shared::Shared;
use crate::stream::ModelStream;
use crate::sync::{ReconnectRequest, UpdateLoop};
use crate::transfer::{FileTransferItem, TransferManager};

const RECONNECT_CHANNEL_SIZE: usize = 4;

/// The main entry point for consumers.
///
/// [`connect()`](Self::connect) logs in, fetches the full model and spawns
/// the update loop. Model snapshots, connection state and events are
/// observable at any time, connected or not.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    config: Arc<ConnectorConfig>,
    shared: Arc<Shared>,
    transfers: TransferManager,
    client: ArcSwapOption<MachineClient>,
    cancel: CancellationToken,
    /// Child token for the current connection, replaced on every connect.
    cancel_child: Mutex<CancellationToken>,
    reconnect_tx: Mutex<Option<mpsc::Sender<ReconnectRequest>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
}

impl Drop for ConnectorInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Connector {
    /// Create a connector. Does not connect.
    pub fn new(config: ConnectorConfig) -> Self {
        let config = Arc::new(config);
        let shared = Arc::new(Shared::new());
        let transfers = TransferManager::new(Arc::clone(&config), shared.events_tx.clone());
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ConnectorInner {
                config,
                shared,
                transfers,
                client: ArcSwapOption::empty(),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                reconnect_tx: Mutex::new(None),
                task: Mutex::new(None),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Log in, run the initial model sync and start the update loop.
    ///
    /// A terminal login failure additionally emits
    /// [`ConnectorEvent::LoginRequired`].
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.task_running().await {
            return Err(CoreError::AlreadyConnected);
        }
        self.stop_task().await;

        let shared = &self.inner.shared;
        shared.set_state(ConnectionState::Connecting);

        let (client, session) = match session::establish(&self.inner.config).await {
            Ok(established) => established,
            Err(e) => return Err(self.connect_failed(e)),
        };
        let client = Arc::new(client);
        info!(
            host = %session.hostname,
            variant = %client.variant(),
            api_level = session.api_level,
            "session established"
        );

        let mut update = UpdateLoop::new(
            Arc::clone(&client),
            Arc::clone(shared),
            Arc::clone(&self.inner.config),
        );
        if let Err(e) = update.initial_sync().await {
            session::teardown(&client, true).await;
            return Err(self.connect_failed(e));
        }
        self.inner.client.store(Some(client));

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();
        let (reconnect_tx, reconnect_rx) = mpsc::channel(RECONNECT_CHANNEL_SIZE);
        *self.inner.reconnect_tx.lock().await = Some(reconnect_tx);

        shared.pending().open();
        shared.set_state(ConnectionState::Live);
        *self.inner.task.lock().await = Some(tokio::spawn(update.run(child, reconnect_rx)));
        Ok(())
    }

    /// Stop the update loop and drop the session.
    ///
    /// With `graceful`, the controller is told to release the session; a
    /// failure to do so is logged and otherwise ignored. Waiting codes are
    /// rejected with a disconnection error.
    pub async fn disconnect(&self, graceful: bool) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.stop_task().await;
        self.inner.shared.close_pending(|| {
            duetly_api::Error::Disconnected {
                reason: "connector disconnected".into(),
            }
            .into()
        });
        if let Some(client) = self.inner.client.swap(None) {
            session::teardown(&client, graceful).await;
        }
        self.inner.shared.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Log in again and force every section to be re-queried.
    ///
    /// Resolves once the connection is live again or recovery gave up.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        let tx = self
            .inner
            .reconnect_tx
            .lock()
            .await
            .clone()
            .ok_or(CoreError::NotConnected)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(reply_tx)
            .await
            .map_err(|_| CoreError::NotConnected)?;
        reply_rx.await.map_err(|_| CoreError::NotConnected)?
    }

    async fn task_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn stop_task(&self) {
        self.inner.cancel_child.lock().await.cancel();
        *self.inner.reconnect_tx.lock().await = None;
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn connect_failed(&self, err: duetly_api::Error) -> CoreError {
        let shared = &self.inner.shared;
        shared.set_state(ConnectionState::Disconnected);
        if err.is_terminal_login() {
            shared.emit(ConnectorEvent::LoginRequired {
                reason: err.to_string(),
            });
        }
        err.into()
    }

    fn client(&self) -> Result<Arc<MachineClient>, CoreError> {
        self.inner.client.load_full().ok_or(CoreError::NotConnected)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Receiver of model snapshots. Only complete merges are published.
    pub fn model(&self) -> watch::Receiver<Arc<ObjectModel>> {
        self.inner.shared.model_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<ObjectModel> {
        self.inner.shared.model_tx.borrow().clone()
    }

    pub fn model_stream(&self) -> ModelStream {
        ModelStream::new(self.inner.shared.model_tx.subscribe())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.inner.shared.events_tx.subscribe()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.client.load().as_ref().and_then(|c| c.session())
    }

    pub fn variant(&self) -> Option<Variant> {
        self.inner.client.load().as_ref().map(|c| c.variant())
    }

    // ── Codes ────────────────────────────────────────────────────────

    /// Send G/M/T-code text.
    ///
    /// With `wait`, resolves with the controller's reply; codes that never
    /// produce one (blank input, emergency stop, reset) return `None`
    /// without waiting.
    pub async fn send_code(&self, code: &str, wait: bool) -> Result<Option<String>, CoreError> {
        let client = self.client()?;
        let wait = wait && expects_reply(code);
        debug!(code, wait, "sending code");

        if client.variant() == Variant::Rest {
            return match client.send_code(code, wait).await? {
                CodeAck::Replied(reply) => {
                    self.inner.shared.emit(ConnectorEvent::ReplyReceived {
                        reply: reply.clone(),
                    });
                    Ok(Some(reply))
                }
                CodeAck::Queued { .. } => Ok(None),
            };
        }

        if !wait {
            client.send_code(code, false).await?;
            return Ok(None);
        }

        // Register first: the reply may be fetched before `send_code`
        // returns. Fails once the update loop has stopped.
        let (id, rx) = self.inner.shared.pending().register()?;
        if let Err(e) = client.send_code(code, false).await {
            self.inner.shared.pending().remove(id);
            return Err(e.into());
        }
        match rx.await {
            Ok(result) => result.map(Some),
            Err(_) => Err(CoreError::NotConnected),
        }
    }

    // ── Files ────────────────────────────────────────────────────────

    pub async fn upload(
        &self,
        path: &str,
        content: Bytes,
        modified: Option<NaiveDateTime>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<(), CoreError> {
        let client = self.client()?;
        self.inner
            .transfers
            .upload(&client, path, content, modified, cancel, progress)
            .await
    }

    pub async fn download(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes, CoreError> {
        let client = self.client()?;
        self.inner
            .transfers
            .download(&client, path, cancel, progress)
            .await
    }

    pub async fn upload_batch(
        &self,
        items: Vec<FileTransferItem>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<FileTransferItem>, CoreError> {
        let client = self.client()?;
        self.inner
            .transfers
            .upload_batch(&client, items, cancel, progress)
            .await
    }

    pub async fn download_batch(
        &self,
        items: Vec<FileTransferItem>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<FileTransferItem>, CoreError> {
        let client = self.client()?;
        self.inner
            .transfers
            .download_batch(&client, items, cancel, progress)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), CoreError> {
        Ok(self.client()?.delete(path).await?)
    }

    pub async fn move_file(&self, from: &str, to: &str, overwrite: bool) -> Result<(), CoreError> {
        Ok(self.client()?.move_file(from, to, overwrite).await?)
    }

    pub async fn make_directory(&self, path: &str) -> Result<(), CoreError> {
        Ok(self.client()?.make_directory(path).await?)
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileEntry>, CoreError> {
        Ok(self.client()?.list_files(dir).await?)
    }

    pub async fn file_info(&self, path: &str) -> Result<FileInfo, CoreError> {
        Ok(self.client()?.file_info(path).await?)
    }
}
