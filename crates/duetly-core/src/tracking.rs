// ── Derived job and machine tracking ──
//
// Values the controller does not transmit directly: print progress, layer
// history on standalone boards, job completion and restart detection.

use tracing::{debug, info};

use crate::model::{Layer, MachineStatus, ObjectModel};

// ── Progress ─────────────────────────────────────────────────────────

/// Fraction of the current job completed, in `0.0..=1.0`.
///
/// Uses the extruded filament ratio when the file declares its filament
/// needs, else the Z height ratio, else the file read position.
pub fn job_progress(model: &ObjectModel) -> f64 {
    let file = &model.job.file;

    let needed: f64 = file.filament.iter().sum();
    let raw = if needed > 0.0 {
        let extruded: f64 = model.motion.extruders.iter().map(|e| e.raw_position).sum();
        extruded / needed
    } else if let Some(z) = model
        .motion
        .axis("Z")
        .and_then(|z| z.user_position)
        .filter(|_| file.height > 0.0)
    {
        z / file.height
    } else if file.size > 0 {
        let position = model.job.file_position.unwrap_or(0);
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let fraction = position as f64 / file.size as f64;
        fraction
    } else {
        0.0
    };

    if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 }
}

/// Job progress as a percentage, in `0.0..=100.0`.
pub fn job_percent(model: &ObjectModel) -> f64 {
    (job_progress(model) * 100.0).clamp(0.0, 100.0)
}

// ── Job completion ───────────────────────────────────────────────────

/// Reports a job as finished the first time its progress reaches 100%.
#[derive(Debug, Default)]
pub struct JobTracker {
    finished_file: Option<String>,
}

impl JobTracker {
    /// Returns the file name when the job has just finished.
    ///
    /// The finished file is forgotten once the job is gone or its progress
    /// drops again, so printing the same file twice reports twice.
    pub fn observe(&mut self, model: &ObjectModel) -> Option<String> {
        let Some(file) = model.job.file.file_name.as_deref().filter(|f| !f.is_empty()) else {
            self.finished_file = None;
            return None;
        };
        if job_progress(model) < 1.0 {
            self.finished_file = None;
            return None;
        }
        if self.finished_file.as_deref() == Some(file) {
            return None;
        }
        info!(file, "job finished");
        self.finished_file = Some(file.to_owned());
        Some(file.to_owned())
    }
}

// ── Layers ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct LayerBaseline {
    file: String,
    layer: i64,
    duration: f64,
    filament: Vec<f64>,
    height: f64,
}

/// Rebuilds per-layer statistics on firmware that only reports totals.
///
/// When the layer number advances, the duration, filament and height
/// consumed since the previous layer change are split evenly across the
/// layers completed in between.
#[derive(Debug, Default)]
pub struct LayerTracker {
    baseline: Option<LayerBaseline>,
}

impl LayerTracker {
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Update `model.job.layers`. Returns whether layers were appended.
    pub fn observe(&mut self, model: &mut ObjectModel) -> bool {
        let Some(current) = Self::snapshot(model) else {
            self.baseline = None;
            return false;
        };

        let Some(previous) = self.baseline.take() else {
            model.job.layers.clear();
            self.baseline = Some(current);
            return false;
        };

        if previous.file != current.file || current.layer < previous.layer {
            debug!(file = %current.file, "layer history restarted");
            model.job.layers.clear();
            self.baseline = Some(current);
            return false;
        }

        if current.layer == previous.layer {
            self.baseline = Some(previous);
            return false;
        }

        let completed = current.layer - previous.layer;
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let divisor = completed as f64;
        let duration = (current.duration - previous.duration).max(0.0) / divisor;
        let height = (current.height - previous.height).max(0.0) / divisor;
        let filament: Vec<f64> = current
            .filament
            .iter()
            .enumerate()
            .map(|(i, now)| {
                let before = previous.filament.get(i).copied().unwrap_or(0.0);
                (now - before).max(0.0) / divisor
            })
            .collect();
        let temperatures = model
            .heat
            .heaters
            .iter()
            .map(|h| h.as_ref().map_or(0.0, |h| h.current))
            .collect::<Vec<_>>();

        let printed = job_progress(model);
        for _ in 0..completed {
            model.job.layers.push(Layer {
                duration,
                filament: filament.clone(),
                fraction_printed: printed,
                height,
                temperatures: temperatures.clone(),
                ..Layer::default()
            });
        }

        self.baseline = Some(current);
        true
    }

    fn snapshot(model: &ObjectModel) -> Option<LayerBaseline> {
        let file = model.job.file.file_name.clone().filter(|f| !f.is_empty())?;
        let layer = model.job.layer?;
        Some(LayerBaseline {
            file,
            layer,
            duration: model.job.duration.unwrap_or(0.0),
            filament: model.motion.extruders.iter().map(|e| e.raw_position).collect(),
            height: model
                .motion
                .axis("Z")
                .and_then(|z| z.user_position)
                .unwrap_or(0.0),
        })
    }
}

// ── Machine status ───────────────────────────────────────────────────

/// What the sync engine should do after observing the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Continue,
    /// Uptime went backwards: the controller restarted.
    Rebooted,
    /// The controller entered halt or firmware update.
    ForceReconnect,
}

/// Watches status transitions and the uptime counter.
#[derive(Debug, Default)]
pub struct StatusObserver {
    last_status: Option<MachineStatus>,
    last_uptime: Option<i64>,
}

impl StatusObserver {
    /// Seed from the initial model without reporting transitions.
    pub fn seed(&mut self, model: &ObjectModel) {
        self.last_status = Some(model.state.status);
        self.last_uptime = Some(model.state.up_time);
    }

    pub fn reset(&mut self) {
        self.last_status = None;
        self.last_uptime = None;
    }

    /// Check a freshly reported uptime before it is merged.
    pub fn rebooted(&self, uptime: Option<i64>) -> bool {
        let (Some(now), Some(before)) = (uptime, self.last_uptime) else {
            return false;
        };
        now < before
    }

    pub fn observe(&mut self, model: &ObjectModel) -> Observation {
        let status = model.state.status;
        let previous = self.last_status.replace(status);
        let uptime = model.state.up_time;
        let rebooted = self.last_uptime.is_some_and(|before| uptime < before);
        self.last_uptime = Some(uptime);

        if rebooted {
            return Observation::Rebooted;
        }
        if let Some(previous) = previous.filter(|p| *p != status) {
            debug!(from = %previous, to = %status, "machine status changed");
            if status.expects_restart() {
                return Observation::ForceReconnect;
            }
        }
        Observation::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(value: serde_json::Value) -> ObjectModel {
        let mut model = ObjectModel::default();
        model.merge(&value, false);
        model
    }

    #[test]
    fn progress_from_filament() {
        let m = model(json!({
            "job": { "file": { "fileName": "a.g", "filament": [100.0, 50.0] } },
            "move": { "extruders": [{ "rawPosition": 40.0 }, { "rawPosition": 10.0 }] }
        }));
        assert!((job_progress(&m) - 1.0 / 3.0).abs() < 1e-9);
        assert!((job_percent(&m) - 33.333).abs() < 1e-3);
    }

    #[test]
    fn progress_from_height_then_file_position() {
        let by_height = model(json!({
            "job": { "file": { "fileName": "a.g", "height": 20.0 } },
            "move": { "axes": [{ "letter": "Z", "userPosition": 5.0 }] }
        }));
        assert!((job_progress(&by_height) - 0.25).abs() < 1e-9);

        let by_position = model(json!({
            "job": { "file": { "fileName": "a.g", "size": 1000 }, "filePosition": 2000 }
        }));
        assert!((job_progress(&by_position) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn job_finished_reported_once() {
        let mut tracker = JobTracker::default();
        let mut m = model(json!({
            "job": { "file": { "fileName": "a.g", "size": 100 }, "filePosition": 50 }
        }));
        assert_eq!(tracker.observe(&m), None);
        m.merge(&json!({ "job": { "filePosition": 100 } }), false);
        assert_eq!(tracker.observe(&m), Some("a.g".to_owned()));
        assert_eq!(tracker.observe(&m), None);
    }

    #[test]
    fn reprinting_a_file_reports_it_again() {
        let mut tracker = JobTracker::default();
        let mut m = model(json!({
            "job": { "file": { "fileName": "a.g", "size": 100 }, "filePosition": 100 }
        }));
        assert_eq!(tracker.observe(&m), Some("a.g".to_owned()));

        m.merge(&json!({ "job": { "file": { "fileName": null } } }), false);
        assert_eq!(tracker.observe(&m), None);

        m.merge(
            &json!({ "job": { "file": { "fileName": "a.g", "size": 100 }, "filePosition": 10 } }),
            false,
        );
        assert_eq!(tracker.observe(&m), None);
        m.merge(&json!({ "job": { "filePosition": 100 } }), false);
        assert_eq!(tracker.observe(&m), Some("a.g".to_owned()));
    }

    #[test]
    fn restarting_without_clearing_the_file_reports_again() {
        let mut tracker = JobTracker::default();
        let mut m = model(json!({
            "job": { "file": { "fileName": "a.g", "size": 100 }, "filePosition": 100 }
        }));
        assert_eq!(tracker.observe(&m), Some("a.g".to_owned()));
        m.merge(&json!({ "job": { "filePosition": 5 } }), false);
        assert_eq!(tracker.observe(&m), None);
        m.merge(&json!({ "job": { "filePosition": 100 } }), false);
        assert_eq!(tracker.observe(&m), Some("a.g".to_owned()));
    }

    #[test]
    fn skipped_layers_share_the_difference() {
        let mut tracker = LayerTracker::default();
        let mut m = model(json!({
            "job": { "file": { "fileName": "a.g" }, "layer": 1, "duration": 100.0 },
            "move": { "extruders": [{ "rawPosition": 10.0 }] }
        }));
        assert!(!tracker.observe(&mut m));

        m.merge(
            &json!({
                "job": { "layer": 4, "duration": 400.0 },
                "move": { "extruders": [{ "rawPosition": 40.0 }] }
            }),
            false,
        );
        assert!(tracker.observe(&mut m));
        assert_eq!(m.job.layers.len(), 3);
        for layer in &m.job.layers {
            assert!((layer.duration - 100.0).abs() < 1e-9);
            assert_eq!(layer.filament, vec![10.0]);
        }
    }

    #[test]
    fn layer_history_restarts_with_new_file() {
        let mut tracker = LayerTracker::default();
        let mut m = model(json!({ "job": { "file": { "fileName": "a.g" }, "layer": 1 } }));
        tracker.observe(&mut m);
        m.merge(&json!({ "job": { "layer": 2 } }), false);
        tracker.observe(&mut m);
        assert_eq!(m.job.layers.len(), 1);

        m.merge(&json!({ "job": { "file": { "fileName": "b.g" }, "layer": 1 } }), false);
        assert!(!tracker.observe(&mut m));
        assert!(m.job.layers.is_empty());
    }

    #[test]
    fn halt_forces_reconnect_and_uptime_drop_is_reboot() {
        let mut observer = StatusObserver::default();
        let mut m = model(json!({ "state": { "status": "idle", "upTime": 100 } }));
        observer.seed(&m);
        assert_eq!(observer.observe(&m), Observation::Continue);

        m.merge(&json!({ "state": { "status": "halted", "upTime": 101 } }), false);
        assert_eq!(observer.observe(&m), Observation::ForceReconnect);

        assert!(observer.rebooted(Some(3)));
        assert!(!observer.rebooted(Some(200)));
        m.merge(&json!({ "state": { "upTime": 2 } }), false);
        assert_eq!(observer.observe(&m), Observation::Rebooted);
    }
}
