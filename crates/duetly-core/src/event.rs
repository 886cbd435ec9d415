// ── Connector events ──

use std::sync::Arc;

use serde::Serialize;

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Fetching the model section by section; `progress` is in `0.0..=1.0`.
    SyncingInitialModel { progress: f64 },
    Live,
    Reconnecting { attempt: u32 },
    /// Reconnection gave up. Call `connect()` again to start over.
    Failed,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Notifications broadcast by the connector.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectorEvent {
    /// A new model snapshot was published; `sections` lists what changed.
    ModelUpdated { sections: Arc<[String]> },
    ConnectionStateChanged { state: ConnectionState },
    FileTransferProgress {
        path: String,
        direction: TransferDirection,
        /// `None` when the total size is unknown.
        fraction: Option<f64>,
        /// Bytes per second since the transfer started.
        speed: f64,
    },
    /// The controller produced a reply, whether or not a caller awaited it.
    ReplyReceived { reply: String },
    JobFinished { file: String },
    /// A volume was mounted, unmounted or changed content.
    VolumeChanged { index: usize },
    /// The session cannot be restored without new credentials.
    LoginRequired { reason: String },
}
