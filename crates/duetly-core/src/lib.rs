// duetly-core: Live object model and command layer between duetly-api and consumers (CLI).
//
//! A [`Connector`] owns one controller session. It keeps a local copy of the
//! machine object model in sync (sequence-gated polling on standalone
//! firmware, WebSocket patches on a board computer), correlates code replies
//! and runs file transfers with checksum retry.

pub mod command;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod model;
pub mod store;
pub mod stream;
pub mod sync;
pub mod tracking;
pub mod transfer;

mod session;
mod shared;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::expects_reply;
pub use config::{ConnectorConfig, Protocol, TlsVerification};
pub use connector::Connector;
pub use error::CoreError;
pub use event::{ConnectionState, ConnectorEvent, TransferDirection};
pub use model::{MachineStatus, MergeReport, ObjectModel};
pub use store::ModelStore;
pub use stream::ModelStream;
pub use tracking::{job_percent, job_progress};
pub use transfer::{FileTransferItem, TransferManager};

// Transport types consumers need without depending on duetly-api directly.
pub use duetly_api::{
    Error as ApiError, ErrorClass, FileEntry, FileInfo, FileKind, ProgressFn, Session,
    TransferProgress, Variant,
};
