// ── Update loop ──
//
// Owns the working object model for one connection. Runs the initial sync,
// then one live cycle after another, and is the only place where transport
// failures turn into connection-state transitions.

mod poll;
mod rest;
pub mod seqs;

use std::sync::Arc;
use std::time::Duration;

use duetly_api::{MachineClient, ModelSubscription, Variant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectorConfig;
use crate::error::CoreError;
use crate::event::{ConnectionState, ConnectorEvent};
use crate::model::MergeReport;
use crate::shared::Shared;
use crate::store::ModelStore;
use crate::tracking::{JobTracker, LayerTracker, Observation, StatusObserver};

pub use seqs::{ObservedSeqs, SequenceCounters};

/// Request for an explicit reconnect, answered once the session is live
/// again or recovery gave up.
pub(crate) type ReconnectRequest = oneshot::Sender<Result<(), CoreError>>;

enum Step {
    Cycle(Result<Observation, duetly_api::Error>),
    Reconnect(ReconnectRequest),
    Stop,
}

pub(crate) struct UpdateLoop {
    client: Arc<MachineClient>,
    shared: Arc<Shared>,
    config: Arc<ConnectorConfig>,
    store: ModelStore,
    seqs: SequenceCounters,
    status: StatusObserver,
    jobs: JobTracker,
    layers: LayerTracker,
    subscription: Option<ModelSubscription>,
    ping: Interval,
}

impl UpdateLoop {
    pub fn new(client: Arc<MachineClient>, shared: Arc<Shared>, config: Arc<ConnectorConfig>) -> Self {
        let store = ModelStore::with_sender(config.strict_merge, Arc::clone(&shared.model_tx));
        let period = config.ping_interval.max(Duration::from_secs(1));
        Self {
            client,
            shared,
            config,
            store,
            seqs: SequenceCounters::new(),
            status: StatusObserver::default(),
            jobs: JobTracker::default(),
            layers: LayerTracker::default(),
            subscription: None,
            ping: tokio::time::interval_at(Instant::now() + period, period),
        }
    }

    /// Fetch the complete model for a fresh session.
    pub async fn initial_sync(&mut self) -> Result<(), duetly_api::Error> {
        self.store.clear();
        self.seqs.clear();
        self.status.reset();
        self.layers.reset();
        self.shared
            .set_state(ConnectionState::SyncingInitialModel { progress: 0.0 });

        match self.client.variant() {
            Variant::Poll => self.initial_poll_sync().await?,
            Variant::Rest => self.initial_rest_sync().await?,
        }

        self.status.seed(self.store.model());
        self.publish(crate::model::SECTIONS.iter().map(|s| (*s).to_owned()).collect());
        info!(
            status = %self.store.model().state.status,
            "initial model sync complete"
        );
        Ok(())
    }

    /// Drive live cycles until cancelled, a terminal login error occurs, or
    /// reconnection gives up.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        mut requests: mpsc::Receiver<ReconnectRequest>,
    ) {
        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Stop,
                request = requests.recv() => request.map_or(Step::Stop, Step::Reconnect),
                result = self.cycle() => Step::Cycle(result),
            };

            let keep_running = match step {
                Step::Stop => false,
                Step::Reconnect(reply) => {
                    info!("reconnect requested");
                    let result = self.recover_or_cancel(&cancel).await;
                    let keep_running = self.settle(&result);
                    let _ = reply.send(result);
                    keep_running
                }
                Step::Cycle(Ok(Observation::Continue | Observation::Rebooted)) => true,
                Step::Cycle(Ok(Observation::ForceReconnect)) => {
                    warn!("controller halted or updating, reconnecting");
                    let result = self.recover_or_cancel(&cancel).await;
                    self.settle(&result)
                }
                Step::Cycle(Err(e)) if e.is_terminal_login() => {
                    self.login_required(&e);
                    false
                }
                Step::Cycle(Err(e)) if e.triggers_reconnect() => {
                    warn!(error = %e, "connection lost, reconnecting");
                    let result = self.recover_or_cancel(&cancel).await;
                    self.settle(&result)
                }
                Step::Cycle(Err(e)) => {
                    warn!(error = %e, "update cycle failed");
                    true
                }
            };

            if !keep_running {
                break;
            }
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
        debug!("update loop stopped");
    }

    async fn cycle(&mut self) -> Result<Observation, duetly_api::Error> {
        match self.client.variant() {
            Variant::Poll => self.poll_cycle().await,
            Variant::Rest => self.rest_cycle().await,
        }
    }

    // ── Recovery ─────────────────────────────────────────────────────

    async fn recover_or_cancel(&mut self, cancel: &CancellationToken) -> Result<(), CoreError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(duetly_api::Error::Cancelled.into()),
            result = self.recover() => result,
        }
    }

    /// Re-establish the session with exponential backoff.
    async fn recover(&mut self) -> Result<(), CoreError> {
        let policy = self.config.reconnect;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.shared
                .set_state(ConnectionState::Reconnecting { attempt });
            match self.reestablish().await {
                Ok(()) => {
                    self.shared.set_state(ConnectionState::Live);
                    info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(e) if e.is_terminal_login() => return Err(e.into()),
                Err(e) => {
                    if !policy.allows(attempt) {
                        warn!(attempt, error = %e, "giving up reconnecting");
                        return Err(e.into());
                    }
                    let delay = policy.backoff(attempt - 1);
                    warn!(attempt, error = %e, ?delay, "reconnect attempt failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One reconnect attempt: fresh login, counters reset so the next live
    /// cycle re-queries every section.
    async fn reestablish(&mut self) -> Result<(), duetly_api::Error> {
        self.seqs.reset();
        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
        self.client.relogin().await?;
        if self.client.variant() == Variant::Rest {
            self.resubscribe().await?;
        }
        Ok(())
    }

    /// Apply the outcome of a recovery. Returns whether to keep running.
    fn settle(&self, result: &Result<(), CoreError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.is_cancelled() => false,
            Err(CoreError::Api(e)) if e.is_terminal_login() => {
                self.login_required(e);
                false
            }
            Err(e) => {
                self.shared.set_state(ConnectionState::Failed);
                let reason = e.to_string();
                self.shared.close_pending(|| {
                    duetly_api::Error::Disconnected {
                        reason: reason.clone(),
                    }
                    .into()
                });
                false
            }
        }
    }

    fn login_required(&self, err: &duetly_api::Error) {
        warn!(error = %err, "session lost, new credentials required");
        let reason = err.to_string();
        self.shared.close_pending(|| {
            duetly_api::Error::Disconnected {
                reason: reason.clone(),
            }
            .into()
        });
        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.emit(ConnectorEvent::LoginRequired { reason });
    }

    // ── Publishing ───────────────────────────────────────────────────

    fn publish(&self, sections: Vec<String>) {
        self.store.publish();
        if !sections.is_empty() {
            self.shared.emit(ConnectorEvent::ModelUpdated {
                sections: sections.into(),
            });
        }
    }

    /// Publish a merge result and run the status and job observers.
    fn commit(&mut self, report: MergeReport) -> Observation {
        self.publish(report.changed);
        let model = self.store.model();
        if let Some(file) = self.jobs.observe(model) {
            self.shared.emit(ConnectorEvent::JobFinished { file });
        }
        self.status.observe(model)
    }

    /// The controller restarted under us: every counter starts over and
    /// nobody will ever see a reply to the codes sent before.
    fn forget_controller_state(&mut self) {
        self.seqs.clear();
        self.status.reset();
        self.layers.reset();
        let mut pending = self.shared.pending();
        pending.reject_all(|| duetly_api::Error::Cancelled.into());
        pending.reset_reply_seq();
    }
}
