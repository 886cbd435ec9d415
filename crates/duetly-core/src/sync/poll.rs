// Standalone firmware: section queries gated by sequence counters

use std::sync::Arc;

use duetly_api::PollClient;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::UpdateLoop;
use super::seqs::ObservedSeqs;
use crate::event::{ConnectionState, ConnectorEvent};
use crate::model::SECTIONS;
use crate::tracking::Observation;

/// Split the `seqs` object off a live result.
fn take_seqs(live: &mut Value) -> ObservedSeqs {
    let seqs = live
        .as_object_mut()
        .and_then(|m| m.remove("seqs"))
        .unwrap_or(Value::Null);
    ObservedSeqs::parse(&seqs)
}

fn not_poll() -> duetly_api::Error {
    duetly_api::Error::Client("standalone sync on a non-standalone client".into())
}

impl UpdateLoop {
    pub(super) async fn initial_poll_sync(&mut self) -> Result<(), duetly_api::Error> {
        let client = Arc::clone(&self.client);
        let poll = client.as_poll().ok_or_else(not_poll)?;

        // Counters first, so a change during the section queries is picked
        // up by the first live cycle.
        let mut live = poll.query_live().await?;
        let observed = take_seqs(&mut live);

        let total = SECTIONS.len();
        for (index, section) in SECTIONS.iter().enumerate() {
            let value = poll.query_section(section).await?;
            self.store.merge_section(section, &value);
            if let Some(seq) = observed.sections.get(*section) {
                self.seqs.record_section(section, *seq);
            }
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let progress = (index + 1) as f64 / total as f64;
            self.shared
                .set_state(ConnectionState::SyncingInitialModel { progress });
        }

        self.seqs.changed_volumes(&observed);
        if let Some(seq) = observed.reply {
            self.seqs.set_reply(seq);
            self.shared.pending().set_reply_seq(seq);
        }
        self.layers.observe(self.store.model_mut());
        Ok(())
    }

    /// One live cycle: wait, query the live subset, re-query moved
    /// sections, publish, then fetch a new reply if there is one.
    pub(super) async fn poll_cycle(&mut self) -> Result<Observation, duetly_api::Error> {
        tokio::time::sleep(self.config.update_interval).await;

        let client = Arc::clone(&self.client);
        let poll = client.as_poll().ok_or_else(not_poll)?;

        let mut live = poll.query_live().await?;
        let observed = take_seqs(&mut live);

        let uptime = live.pointer("/state/upTime").and_then(Value::as_i64);
        if self.status.rebooted(uptime) {
            warn!(uptime, "controller restarted, logging in again");
            self.forget_controller_state();
            poll.relogin().await?;
            return Ok(Observation::Rebooted);
        }

        let mut report = self.store.merge(&live);
        for section in self.seqs.changed_sections(&observed) {
            trace!(section, "sequence moved, querying section");
            let value = poll.query_section(section).await?;
            report.absorb(self.store.merge_section(section, &value));
            if let Some(seq) = observed.sections.get(section) {
                self.seqs.record_section(section, *seq);
            }
        }

        for index in self.seqs.changed_volumes(&observed) {
            debug!(index, "volume changed");
            self.shared.emit(ConnectorEvent::VolumeChanged { index });
        }

        if self.layers.observe(self.store.model_mut()) && !report.changed.iter().any(|s| s == "job") {
            report.changed.push("job".to_owned());
        }

        let observation = self.commit(report);

        // Replies are fetched after the merge so subscribers see the model
        // that produced them.
        self.fetch_reply(poll, &observed).await?;

        Ok(observation)
    }

    async fn fetch_reply(
        &mut self,
        poll: &PollClient,
        observed: &ObservedSeqs,
    ) -> Result<(), duetly_api::Error> {
        let seq = match (self.seqs.reply_changed(observed), observed.reply) {
            (Some(seq), _) => seq,
            // First counter seen since a restart. A code sent in between may
            // already have its reply buffered.
            (None, Some(seq)) if self.seqs.reply().is_none() => {
                if seq == 0 || self.shared.pending().is_empty() {
                    self.seqs.set_reply(seq);
                    self.shared.pending().set_reply_seq(seq);
                    return Ok(());
                }
                seq
            }
            _ => return Ok(()),
        };

        let reply = poll.reply().await?;
        self.seqs.set_reply(seq);
        let resolved = self.shared.pending().resolve(seq, &reply);
        trace!(seq, resolved, "reply fetched");
        self.shared.emit(ConnectorEvent::ReplyReceived { reply });
        Ok(())
    }
}
