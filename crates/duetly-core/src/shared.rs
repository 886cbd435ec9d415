// Connector state shared between the facade and its background task

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::command::PendingCommands;
use crate::error::CoreError;
use crate::event::{ConnectionState, ConnectorEvent};
use crate::model::ObjectModel;

const EVENT_CHANNEL_SIZE: usize = 256;

pub(crate) struct Shared {
    pub state_tx: watch::Sender<ConnectionState>,
    pub events_tx: broadcast::Sender<ConnectorEvent>,
    pub model_tx: Arc<watch::Sender<Arc<ObjectModel>>>,
    pending: Mutex<PendingCommands>,
}

impl Shared {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (model_tx, _) = watch::channel(Arc::new(ObjectModel::default()));
        Self {
            state_tx,
            events_tx,
            model_tx: Arc::new(model_tx),
            pending: Mutex::new(PendingCommands::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        if changed {
            match &state {
                ConnectionState::SyncingInitialModel { progress } => {
                    debug!(progress, "initial sync");
                }
                other => info!(state = ?other, "connection state changed"),
            }
            self.emit(ConnectorEvent::ConnectionStateChanged { state });
        }
    }

    pub fn emit(&self, event: ConnectorEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    /// Lock the pending-command queue. Never held across an await.
    pub fn pending(&self) -> MutexGuard<'_, PendingCommands> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject waiting codes and refuse new ones until the next connect.
    pub fn close_pending(&self, make_err: impl Fn() -> CoreError) {
        self.pending().close(make_err);
    }
}
