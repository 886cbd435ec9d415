// Sequence counters
//
// The live query reports one counter per model section plus `reply` and a
// `volChanges` array. A section is re-queried only when its counter moved
// since the last successful full query.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::SECTIONS;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSeqs {
    pub sections: HashMap<String, u64>,
    pub reply: Option<u64>,
    pub vol_changes: Vec<u64>,
}

impl ObservedSeqs {
    /// Parse the `seqs` object of a live result. Non-numeric entries are
    /// ignored.
    pub fn parse(seqs: &Value) -> Self {
        let mut observed = Self::default();
        let Some(map) = seqs.as_object() else {
            return observed;
        };
        for (key, value) in map {
            match key.as_str() {
                "reply" => observed.reply = value.as_u64(),
                "volChanges" => {
                    observed.vol_changes = value
                        .as_array()
                        .map(|a| a.iter().map(|v| v.as_u64().unwrap_or(0)).collect())
                        .unwrap_or_default();
                }
                _ => {
                    if let Some(n) = value.as_u64() {
                        observed.sections.insert(key.clone(), n);
                    }
                }
            }
        }
        observed
    }
}

/// Last recorded counters. An absent entry means "never fetched".
#[derive(Debug, Clone, Default)]
pub struct SequenceCounters {
    sections: HashMap<String, u64>,
    reply: Option<u64>,
    vol_changes: Vec<u64>,
}

impl SequenceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sections whose observed counter differs from the recorded one, in
    /// sync order.
    pub fn changed_sections(&self, observed: &ObservedSeqs) -> Vec<&'static str> {
        SECTIONS
            .iter()
            .copied()
            .filter(|section| {
                observed
                    .sections
                    .get(*section)
                    .is_some_and(|seq| self.sections.get(*section) != Some(seq))
            })
            .collect()
    }

    /// Record a section counter after its full query was merged.
    pub fn record_section(&mut self, section: &str, seq: u64) {
        self.sections.insert(section.to_owned(), seq);
    }

    /// The new reply counter, if it moved since it was last recorded.
    /// The first observation only establishes a baseline.
    pub fn reply_changed(&self, observed: &ObservedSeqs) -> Option<u64> {
        let seq = observed.reply?;
        self.reply.filter(|prev| *prev != seq).map(|_| seq)
    }

    pub fn reply(&self) -> Option<u64> {
        self.reply
    }

    pub fn set_reply(&mut self, seq: u64) {
        self.reply = Some(seq);
    }

    /// Indices of volumes whose change counter moved. A newly reported
    /// volume counts as changed only once a baseline exists.
    pub fn changed_volumes(&mut self, observed: &ObservedSeqs) -> Vec<usize> {
        let had_baseline = !self.vol_changes.is_empty();
        let changed = if had_baseline {
            observed
                .vol_changes
                .iter()
                .enumerate()
                .filter(|(i, seq)| self.vol_changes.get(*i) != Some(*seq))
                .map(|(i, _)| i)
                .collect()
        } else {
            Vec::new()
        };
        self.vol_changes.clone_from(&observed.vol_changes);
        changed
    }

    /// Forget section and volume counters so everything is re-queried.
    /// The reply counter is kept so an old reply is not delivered twice.
    pub fn reset(&mut self) {
        self.sections.clear();
        self.vol_changes.clear();
    }

    /// Forget everything, including the reply counter. Used after a
    /// controller restart, where every counter starts over.
    pub fn clear(&mut self) {
        self.reset();
        self.reply = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observed(value: Value) -> ObservedSeqs {
        ObservedSeqs::parse(&value)
    }

    #[test]
    fn only_moved_sections_are_requeried() {
        let mut seqs = SequenceCounters::new();
        seqs.record_section("heat", 3);
        seqs.record_section("tools", 1);

        let obs = observed(json!({ "heat": 4, "tools": 1, "reply": 0, "bogus": 9 }));
        assert_eq!(seqs.changed_sections(&obs), vec!["heat"]);
    }

    #[test]
    fn reset_forces_full_requery() {
        let mut seqs = SequenceCounters::new();
        seqs.record_section("heat", 3);
        seqs.set_reply(7);
        seqs.reset();

        let obs = observed(json!({ "heat": 3, "state": 1 }));
        assert_eq!(seqs.changed_sections(&obs), vec!["heat", "state"]);
        assert_eq!(seqs.reply(), Some(7));
    }

    #[test]
    fn reply_change_needs_a_baseline() {
        let mut seqs = SequenceCounters::new();
        assert_eq!(seqs.reply_changed(&observed(json!({ "reply": 5 }))), None);
        seqs.set_reply(5);
        assert_eq!(seqs.reply_changed(&observed(json!({ "reply": 5 }))), None);
        assert_eq!(seqs.reply_changed(&observed(json!({ "reply": 6 }))), Some(6));
        seqs.clear();
        assert_eq!(seqs.reply_changed(&observed(json!({ "reply": 1 }))), None);
    }

    #[test]
    fn volume_changes_by_index() {
        let mut seqs = SequenceCounters::new();
        assert!(seqs
            .changed_volumes(&observed(json!({ "volChanges": [0, 0] })))
            .is_empty());
        let changed = seqs.changed_volumes(&observed(json!({ "volChanges": [0, 2] })));
        assert_eq!(changed, vec![1]);
    }
}
