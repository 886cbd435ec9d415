// ── File transfers ──
//
// Single transfers may run concurrently with each other and with a batch.
// Batches run their items strictly one after another, and only one batch
// may be active at a time.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::NaiveDateTime;
use duetly_api::{MachineClient, ProgressFn, TransferProgress, Variant};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConnectorConfig, PROTECTED_CONFIG_FILES};
use crate::error::CoreError;
use crate::event::{ConnectorEvent, TransferDirection};

/// One file moving to or from the controller.
#[derive(Debug, Clone, Serialize)]
pub struct FileTransferItem {
    pub path: String,
    /// Upload content, or downloaded content once the item settled.
    #[serde(skip)]
    pub payload: Option<Bytes>,
    pub direction: TransferDirection,
    /// Fraction completed, in `0.0..=1.0`.
    pub progress: f64,
    /// Average bytes per second of the last attempt.
    pub speed: f64,
    pub retry_count: u32,
    pub error: Option<String>,
}

impl FileTransferItem {
    pub fn upload(path: impl Into<String>, content: Bytes) -> Self {
        Self::new(path.into(), Some(content), TransferDirection::Upload)
    }

    pub fn download(path: impl Into<String>) -> Self {
        Self::new(path.into(), None, TransferDirection::Download)
    }

    fn new(path: String, payload: Option<Bytes>, direction: TransferDirection) -> Self {
        Self {
            path,
            payload,
            direction,
            progress: 0.0,
            speed: 0.0,
            retry_count: 0,
            error: None,
        }
    }

    fn settle(&mut self, started: Instant, bytes: usize) {
        self.progress = 1.0;
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let bytes = bytes as f64;
        self.speed = bytes / started.elapsed().as_secs_f64().max(1e-3);
    }
}

/// Whether `path` names the controller's startup configuration.
pub fn is_protected_config(path: &str) -> bool {
    let relative = path
        .strip_prefix("0:")
        .unwrap_or(path)
        .trim_start_matches('/');
    PROTECTED_CONFIG_FILES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(relative))
}

pub struct TransferManager {
    config: Arc<ConnectorConfig>,
    events: broadcast::Sender<ConnectorEvent>,
    batch_gate: Mutex<()>,
}

impl TransferManager {
    pub fn new(config: Arc<ConnectorConfig>, events: broadcast::Sender<ConnectorEvent>) -> Self {
        Self {
            config,
            events,
            batch_gate: Mutex::new(()),
        }
    }

    // ── Single items ─────────────────────────────────────────────────

    pub async fn upload(
        &self,
        client: &MachineClient,
        path: &str,
        content: Bytes,
        modified: Option<NaiveDateTime>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<(), CoreError> {
        let mut item = FileTransferItem::upload(path, content);
        self.upload_item(client, &mut item, modified, cancel.as_ref(), progress.as_ref())
            .await
            .map_err(CoreError::from)
    }

    pub async fn download(
        &self,
        client: &MachineClient,
        path: &str,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes, CoreError> {
        let mut item = FileTransferItem::download(path);
        self.download_item(client, &mut item, cancel.as_ref(), progress.as_ref())
            .await?;
        item.payload
            .ok_or_else(|| CoreError::Internal("download settled without content".into()))
    }

    // ── Batches ──────────────────────────────────────────────────────

    /// Upload every item in order. Stops at the first failure or when
    /// `cancel` fires; items after that are never started.
    pub async fn upload_batch(
        &self,
        client: &MachineClient,
        mut items: Vec<FileTransferItem>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<FileTransferItem>, CoreError> {
        let _gate = self.batch_gate.try_lock().map_err(|_| CoreError::TransferBusy)?;
        info!(items = items.len(), "upload batch started");
        for item in &mut items {
            check_cancelled(cancel.as_ref(), &item.path)?;
            let result = self
                .upload_item(client, item, None, cancel.as_ref(), progress.as_ref())
                .await;
            if let Err(source) = result {
                return Err(CoreError::TransferFailed {
                    path: item.path.clone(),
                    source,
                });
            }
        }
        Ok(items)
    }

    /// Download every item in order into its `payload`.
    pub async fn download_batch(
        &self,
        client: &MachineClient,
        mut items: Vec<FileTransferItem>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<FileTransferItem>, CoreError> {
        let _gate = self.batch_gate.try_lock().map_err(|_| CoreError::TransferBusy)?;
        info!(items = items.len(), "download batch started");
        for item in &mut items {
            check_cancelled(cancel.as_ref(), &item.path)?;
            let result = self
                .download_item(client, item, cancel.as_ref(), progress.as_ref())
                .await;
            if let Err(source) = result {
                return Err(CoreError::TransferFailed {
                    path: item.path.clone(),
                    source,
                });
            }
        }
        Ok(items)
    }

    // ── Item execution ───────────────────────────────────────────────

    async fn upload_item(
        &self,
        client: &MachineClient,
        item: &mut FileTransferItem,
        modified: Option<NaiveDateTime>,
        cancel: Option<&CancellationToken>,
        progress: Option<&ProgressFn>,
    ) -> Result<(), duetly_api::Error> {
        let content = item.payload.clone().unwrap_or_default();

        if self.config.backup_config_files && is_protected_config(&item.path) {
            self.backup(client, &item.path).await?;
        }

        let crc32 = (self.config.crc_uploads && client.variant() == Variant::Poll)
            .then(|| crc32fast::hash(&content));
        let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
        let retryable_size = size <= self.config.file_transfer_retry_threshold;

        loop {
            let started = Instant::now();
            let reporter = self.reporter(&item.path, TransferDirection::Upload, progress);
            let result = client
                .upload(
                    &item.path,
                    content.clone(),
                    modified,
                    crc32,
                    cancel.cloned(),
                    Some(reporter),
                )
                .await;

            match result {
                Ok(()) => {
                    item.settle(started, content.len());
                    item.error = None;
                    debug!(path = %item.path, retries = item.retry_count, "upload complete");
                    return Ok(());
                }
                Err(e)
                    if retryable_size
                        && item.retry_count < self.config.max_retries
                        && upload_may_succeed_again(&e) =>
                {
                    item.retry_count += 1;
                    warn!(
                        path = %item.path,
                        attempt = item.retry_count,
                        error = %e,
                        "upload failed, retrying"
                    );
                }
                Err(e) => {
                    item.error = Some(e.to_string());
                    return Err(e);
                }
            }
        }
    }

    async fn download_item(
        &self,
        client: &MachineClient,
        item: &mut FileTransferItem,
        cancel: Option<&CancellationToken>,
        progress: Option<&ProgressFn>,
    ) -> Result<(), duetly_api::Error> {
        let started = Instant::now();
        let reporter = self.reporter(&item.path, TransferDirection::Download, progress);
        match client
            .download(&item.path, cancel.cloned(), Some(reporter))
            .await
        {
            Ok(content) => {
                item.settle(started, content.len());
                item.payload = Some(content);
                Ok(())
            }
            Err(e) => {
                item.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Keep the existing config file as `<path>.bak`. A missing file is
    /// not an error.
    async fn backup(&self, client: &MachineClient, path: &str) -> Result<(), duetly_api::Error> {
        let backup = format!("{path}.bak");
        match client.move_file(path, &backup, true).await {
            Ok(()) => {
                info!(path, backup, "config file backed up");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(path, "no existing config file to back up");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Progress callback that broadcasts transfer events and forwards to
    /// the caller's callback.
    fn reporter(
        &self,
        path: &str,
        direction: TransferDirection,
        user: Option<&ProgressFn>,
    ) -> ProgressFn {
        let events = self.events.clone();
        let path = path.to_owned();
        let user = user.cloned();
        let started = Instant::now();
        ProgressFn::new(move |p: TransferProgress| {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let speed = p.transferred as f64 / started.elapsed().as_secs_f64().max(1e-3);
            let _ = events.send(ConnectorEvent::FileTransferProgress {
                path: path.clone(),
                direction,
                fraction: p.fraction(),
                speed,
            });
            if let Some(user) = &user {
                user.report(p);
            }
        })
    }
}

/// Checksum mismatches and write failures are reported as operation
/// failures; dropped connections may also succeed on a second attempt.
fn upload_may_succeed_again(err: &duetly_api::Error) -> bool {
    !err.is_cancelled()
        && (matches!(err, duetly_api::Error::OperationFailed { .. }) || err.is_transient())
}

fn check_cancelled(cancel: Option<&CancellationToken>, path: &str) -> Result<(), CoreError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        debug!(path, "batch cancelled before item started");
        return Err(CoreError::TransferFailed {
            path: path.to_owned(),
            source: duetly_api::Error::Cancelled,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_config_files() {
        assert!(is_protected_config("0:/sys/config.g"));
        assert!(is_protected_config("/sys/config-override.g"));
        assert!(is_protected_config("sys/config.g"));
        assert!(!is_protected_config("0:/sys/homeall.g"));
        assert!(!is_protected_config("0:/gcodes/config.g"));
    }

    #[test]
    fn checksum_failures_are_retryable() {
        let failed = duetly_api::Error::OperationFailed {
            reason: "err 1".into(),
        };
        assert!(upload_may_succeed_again(&failed));
        assert!(!upload_may_succeed_again(&duetly_api::Error::Cancelled));
        assert!(!upload_may_succeed_again(&duetly_api::Error::FileNotFound {
            path: "x".into()
        }));
    }
}
