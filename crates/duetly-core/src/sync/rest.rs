// Board computer service: model patches over the WebSocket

use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use super::UpdateLoop;
use crate::event::ConnectionState;
use crate::tracking::Observation;

fn not_rest() -> duetly_api::Error {
    duetly_api::Error::Client("REST sync on a non-REST client".into())
}

fn subscription_closed() -> duetly_api::Error {
    duetly_api::Error::Disconnected {
        reason: "model subscription closed".into(),
    }
}

impl UpdateLoop {
    pub(super) async fn initial_rest_sync(&mut self) -> Result<(), duetly_api::Error> {
        self.resubscribe().await?;
        self.shared
            .set_state(ConnectionState::SyncingInitialModel { progress: 1.0 });
        Ok(())
    }

    /// Open a new subscription and merge the full model it starts with.
    pub(super) async fn resubscribe(&mut self) -> Result<(), duetly_api::Error> {
        let client = Arc::clone(&self.client);
        let rest = client.as_rest().ok_or_else(not_rest)?;

        let mut subscription = rest.subscribe_model().await?;
        let full = subscription.recv().await?;
        let report = self.store.merge(&full);
        subscription.ack().await?;
        self.subscription = Some(subscription);

        trace!(sections = report.changed.len(), "full model received");
        self.publish(report.changed);
        Ok(())
    }

    /// Wait for the next patch, keeping the socket alive meanwhile.
    pub(super) async fn rest_cycle(&mut self) -> Result<Observation, duetly_api::Error> {
        let patch = {
            let subscription = self.subscription.as_mut().ok_or_else(subscription_closed)?;
            loop {
                tokio::select! {
                    update = subscription.recv() => break update?,
                    _ = self.ping.tick() => subscription.ping().await?,
                }
            }
        };

        let uptime = patch.pointer("/state/upTime").and_then(Value::as_i64);
        if self.status.rebooted(uptime) {
            warn!(uptime, "controller restarted");
            self.forget_controller_state();
        }

        let report = self.store.merge(&patch);
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.ack().await?;
        }
        Ok(self.commit(report))
    }
}
