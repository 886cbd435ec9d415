// ── Heaters and fans ──

use serde::{Deserialize, Serialize};

use super::macros::{model_record, patch_enum};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum HeaterState {
    #[default]
    Off,
    Standby,
    Active,
    Fault,
    Tuning,
    Offline,
}

impl HeaterState {
    pub fn is_heating(self) -> bool {
        matches!(self, Self::Active | Self::Standby | Self::Tuning)
    }
}

patch_enum!(HeaterState);

model_record! {
    pub struct Heater {
        "active" => active: f64,
        "current" => current: f64,
        "max" => max: f64,
        "min" => min: f64,
        "sensor" => sensor: i64,
        "standby" => standby: f64,
        "state" => state: HeaterState,
    }
}

model_record! {
    pub struct Heat {
        /// Heater indices of the beds; `-1` marks an unused slot.
        "bedHeaters" => bed_heaters: Vec<i64>,
        "chamberHeaters" => chamber_heaters: Vec<i64>,
        "coldExtrudeTemperature" => cold_extrude_temperature: f64,
        "coldRetractTemperature" => cold_retract_temperature: f64,
        "heaters" => heaters: Vec<Option<Heater>>,
    }
}

model_record! {
    pub struct FanThermostatic {
        "heaters" => heaters: Vec<i64>,
        "highTemperature" => high_temperature: Option<f64>,
        "lowTemperature" => low_temperature: Option<f64>,
    }
}

model_record! {
    pub struct Fan {
        "actualValue" => actual_value: f64,
        "blip" => blip: f64,
        "max" => max: f64,
        "min" => min: f64,
        "name" => name: String,
        "requestedValue" => requested_value: f64,
        "rpm" => rpm: i64,
        "thermostatic" => thermostatic: FanThermostatic,
    }
}
