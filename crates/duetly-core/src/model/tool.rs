// ── Tools and spindles ──

use serde::{Deserialize, Serialize};

use super::macros::{model_record, patch_enum};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ToolState {
    #[default]
    Off,
    Active,
    Standby,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SpindleState {
    Unconfigured,
    #[default]
    Stopped,
    Forward,
    Reverse,
}

patch_enum!(ToolState, SpindleState);

model_record! {
    pub struct Tool {
        /// Active temperature per heater.
        "active" => active: Vec<f64>,
        /// Axis indices mapped to each logical axis.
        "axes" => axes: Vec<Vec<i64>>,
        "extruders" => extruders: Vec<i64>,
        "fans" => fans: Vec<i64>,
        "filamentExtruder" => filament_extruder: i64,
        "heaters" => heaters: Vec<i64>,
        "name" => name: String,
        "number" => number: i64,
        "offsets" => offsets: Vec<f64>,
        "spindle" => spindle: i64,
        "standby" => standby: Vec<f64>,
        "state" => state: ToolState,
    }
}

model_record! {
    pub struct Spindle {
        "active" => active: i64,
        "canReverse" => can_reverse: bool,
        "current" => current: i64,
        "frequency" => frequency: i64,
        "max" => max: i64,
        "min" => min: i64,
        "state" => state: SpindleState,
    }
}
