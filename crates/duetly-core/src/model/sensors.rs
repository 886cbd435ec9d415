// ── Sensors ──

use serde_json::Value;

use super::macros::model_record;

model_record! {
    pub struct AnalogSensor {
        "lastReading" => last_reading: Option<f64>,
        "name" => name: String,
        "type" => kind: String,
    }
}

model_record! {
    pub struct Endstop {
        "highEnd" => high_end: bool,
        "triggered" => triggered: bool,
        "type" => kind: String,
    }
}

model_record! {
    pub struct GpInputPort {
        "value" => value: f64,
    }
}

model_record! {
    pub struct Probe {
        "threshold" => threshold: i64,
        "triggerHeight" => trigger_height: f64,
        "type" => kind: i64,
        "value" => value: Vec<i64>,
    }
}

model_record! {
    pub struct Sensors {
        "analog" => analog: Vec<Option<AnalogSensor>>,
        "endstops" => endstops: Vec<Option<Endstop>>,
        /// Monitor shapes differ per monitor type, so they stay untyped.
        "filamentMonitors" => filament_monitors: Vec<Option<Value>>,
        "gpIn" => gp_in: Vec<Option<GpInputPort>>,
        "probes" => probes: Vec<Option<Probe>>,
    }
}
