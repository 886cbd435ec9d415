// ── Model store ──
//
// Working copy of the object model, owned by the update loop. Readers see
// immutable snapshots published through a `watch` channel, so a reader
// never observes a half-applied update.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::model::{MergeReport, ObjectModel};
use crate::stream::ModelStream;

pub struct ModelStore {
    working: ObjectModel,
    strict: bool,
    tx: Arc<watch::Sender<Arc<ObjectModel>>>,
}

impl ModelStore {
    pub fn new(strict: bool) -> Self {
        let (tx, _) = watch::channel(Arc::new(ObjectModel::default()));
        Self::with_sender(strict, Arc::new(tx))
    }

    /// Build a store that publishes on an existing channel.
    pub fn with_sender(strict: bool, tx: Arc<watch::Sender<Arc<ObjectModel>>>) -> Self {
        Self {
            working: ObjectModel::default(),
            strict,
            tx,
        }
    }

    /// Merge a partial model keyed by section.
    pub fn merge(&mut self, update: &Value) -> MergeReport {
        let report = self.working.merge(update, self.strict);
        self.log_diagnostics(&report);
        report
    }

    /// Merge the value of one section.
    pub fn merge_section(&mut self, key: &str, value: &Value) -> MergeReport {
        let report = self.working.merge_section(key, value, self.strict);
        self.log_diagnostics(&report);
        report
    }

    pub fn model(&self) -> &ObjectModel {
        &self.working
    }

    /// Mutable access for derived data the controller does not report.
    pub fn model_mut(&mut self) -> &mut ObjectModel {
        &mut self.working
    }

    /// Drop all state, as after a controller restart.
    pub fn clear(&mut self) {
        self.working = ObjectModel::default();
    }

    /// Make the working copy visible to readers.
    pub fn publish(&self) {
        self.tx.send_replace(Arc::new(self.working.clone()));
    }

    pub fn snapshot(&self) -> Arc<ObjectModel> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> ModelStream {
        ModelStream::new(self.tx.subscribe())
    }

    fn log_diagnostics(&self, report: &MergeReport) {
        if report.diagnostics.is_empty() {
            return;
        }
        if self.strict {
            debug!(
                skipped = report.diagnostics.len(),
                first = %report.diagnostics[0],
                "merge skipped fields"
            );
        } else {
            warn!(
                skipped = report.diagnostics.len(),
                first = %report.diagnostics[0],
                "merge skipped mismatched fields"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn readers_only_see_published_snapshots() {
        let mut store = ModelStore::new(true);
        let mut stream = store.subscribe();

        store.merge(&json!({ "state": { "upTime": 5 } }));
        assert_eq!(stream.latest().state.up_time, 0);

        store.publish();
        let snap = stream.changed().await;
        assert_eq!(snap.map(|m| m.state.up_time), Some(5));
        assert_eq!(stream.current().state.up_time, 5);
    }

    #[test]
    fn clear_resets_working_copy() {
        let mut store = ModelStore::new(true);
        store.merge(&json!({ "network": { "hostname": "duet" } }));
        store.clear();
        assert!(store.model().network.hostname.is_empty());
    }
}
