// ── Object model ──
//
// Typed mirror of the controller's machine model. Each top-level key is a
// "section"; sections are merged independently so change notifications can
// name exactly what moved.

mod macros;

pub mod board;
pub mod heat;
pub mod job;
pub mod motion;
pub mod patch;
pub mod sensors;
pub mod state;
pub mod tool;

use serde_json::Value;

pub use board::{Board, Directories, MinMaxCurrent, Network, NetworkInterface, Volume};
pub use heat::{Fan, FanThermostatic, Heat, Heater, HeaterState};
pub use job::{GCodeFileInfo, Job, Layer, TimesLeft};
pub use motion::{Axis, CurrentMove, Extruder, Move};
pub use patch::{
    DiagnosticKind, MergeContext, MergeDiagnostic, MergeOutcome, Patch, merge_value,
};
pub use sensors::{AnalogSensor, Endstop, GpInputPort, Probe, Sensors};
pub use state::{InputChannel, InputChannelState, MachineStatus, MessageBox, State};
pub use tool::{Spindle, SpindleState, Tool, ToolState};

use macros::model_record;

/// Sections queried individually during the initial sync and re-queried
/// whenever their sequence counter moves.
pub const SECTIONS: &[&str] = &[
    "boards",
    "directories",
    "fans",
    "global",
    "heat",
    "inputs",
    "job",
    "limits",
    "move",
    "network",
    "sensors",
    "spindles",
    "state",
    "tools",
    "volumes",
];

model_record! {
    /// The full machine model.
    pub struct ObjectModel {
        "boards" => boards: Vec<Board>,
        "directories" => directories: Directories,
        "fans" => fans: Vec<Option<Fan>>,
        /// User-defined global variables.
        "global" => global: Value,
        "heat" => heat: Heat,
        "inputs" => inputs: Vec<Option<InputChannel>>,
        "job" => job: Job,
        /// Configured machine limits; shape varies with firmware build.
        "limits" => limits: Value,
        "messages" => messages: Value,
        "move" => motion: Move,
        "network" => network: Network,
        "plugins" => plugins: Value,
        "sbc" => sbc: Value,
        "sensors" => sensors: Sensors,
        "spindles" => spindles: Vec<Option<Spindle>>,
        "state" => state: State,
        "tools" => tools: Vec<Option<Tool>>,
        "volumes" => volumes: Vec<Option<Volume>>,
    }
}

/// Result of merging one update into the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Top-level sections whose content changed.
    pub changed: Vec<String>,
    pub diagnostics: Vec<MergeDiagnostic>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        for section in other.changed {
            if !self.changed.contains(&section) {
                self.changed.push(section);
            }
        }
        self.diagnostics.extend(other.diagnostics);
    }
}

impl ObjectModel {
    /// Merge a partial model keyed by section name.
    ///
    /// A non-object update is rejected with a diagnostic.
    pub fn merge(&mut self, update: &Value, strict: bool) -> MergeReport {
        let mut report = MergeReport::default();
        let Some(sections) = update.as_object() else {
            let mut ctx = MergeContext::new(strict);
            ctx.type_mismatch("object");
            report.diagnostics = ctx.into_diagnostics();
            return report;
        };
        for (key, value) in sections {
            report.absorb(self.merge_section(key, value, strict));
        }
        report
    }

    /// Merge the full or partial value of one section.
    pub fn merge_section(&mut self, key: &str, value: &Value, strict: bool) -> MergeReport {
        let mut ctx = MergeContext::new(strict);
        ctx.push(key);
        let changed = self.patch_field(key, value, &mut ctx);
        MergeReport {
            changed: if changed { vec![key.to_owned()] } else { Vec::new() },
            diagnostics: ctx.into_diagnostics(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn merge_reports_changed_sections() {
        let mut model = ObjectModel::default();
        let report = model.merge(
            &json!({
                "state": { "status": "processing", "upTime": 30 },
                "heat": { "heaters": [{ "current": 20.5, "state": "active" }] }
            }),
            true,
        );
        assert_eq!(report.changed, vec!["heat".to_owned(), "state".to_owned()]);
        assert_eq!(model.state.status, MachineStatus::Processing);
        let heater = model.heat.heaters[0].as_ref().unwrap();
        assert_eq!(heater.state, HeaterState::Active);
        assert!((heater.current - 20.5).abs() < f64::EPSILON);
    }

    #[test]
    fn paused_job_still_counts_as_printing() {
        let mut model = ObjectModel::default();
        model.merge(&json!({ "state": { "status": "paused" } }), true);
        assert!(model.state.status.is_printing());
        model.merge(&json!({ "state": { "status": "idle" } }), true);
        assert!(!model.state.status.is_printing());
    }

    #[test]
    fn merge_is_idempotent() {
        let update = json!({
            "move": { "axes": [{ "letter": "X", "homed": true }, { "letter": "Y" }] },
            "tools": [{ "number": 0, "active": [210.0] }, null],
        });
        let mut model = ObjectModel::default();
        assert!(!model.merge(&update, true).is_empty());
        let snapshot = model.clone();
        assert!(model.merge(&update, true).is_empty());
        assert_eq!(model, snapshot);
    }

    #[test]
    fn arrays_shrink_to_patch_length() {
        let mut model = ObjectModel::default();
        model.merge(&json!({ "tools": [{ "number": 0 }, { "number": 1 }, { "number": 2 }] }), true);
        model.merge(&json!({ "tools": [{ "number": 0 }] }), true);
        assert_eq!(model.tools.len(), 1);
    }

    #[test]
    fn patch_keeps_unmentioned_fields() {
        let mut model = ObjectModel::default();
        model.merge(&json!({ "state": { "status": "idle", "upTime": 10 } }), true);
        model.merge(&json!({ "state": { "upTime": 11 } }), true);
        assert_eq!(model.state.status, MachineStatus::Idle);
        assert_eq!(model.state.up_time, 11);
    }

    #[test]
    fn strict_merge_drops_unknown_keys() {
        let mut model = ObjectModel::default();
        let report = model.merge(&json!({ "state": { "futureField": 1 } }), true);
        assert!(report.is_empty());
        assert_eq!(report.diagnostics[0].path, "state.futureField");
        assert!(model.state.extra.is_empty());
    }

    #[test]
    fn lenient_merge_keeps_unknown_keys() {
        let mut model = ObjectModel::default();
        let report = model.merge(&json!({ "state": { "futureField": 1 } }), false);
        assert_eq!(report.changed, vec!["state".to_owned()]);
        assert_eq!(model.state.extra["futureField"], json!(1));
    }

    #[test]
    fn global_variables_accept_new_keys_in_strict_mode() {
        let mut model = ObjectModel::default();
        model.merge(&json!({ "global": { "probeOffset": 0.2 } }), true);
        assert_eq!(model.global, json!({ "probeOffset": 0.2 }));
    }

    #[test]
    fn unknown_status_is_a_type_mismatch() {
        let mut model = ObjectModel::default();
        model.merge(&json!({ "state": { "status": "idle" } }), true);
        let report = model.merge(&json!({ "state": { "status": "levitating" } }), true);
        assert_eq!(model.state.status, MachineStatus::Idle);
        assert_eq!(report.diagnostics[0].path, "state.status");
    }

    #[test]
    fn status_displays_as_wire_name() {
        assert_eq!(MachineStatus::ChangingTool.to_string(), "changingTool");
    }
}
