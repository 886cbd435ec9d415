// ── Axes, extruders and the current move ──

use super::macros::model_record;

model_record! {
    pub struct Axis {
        "acceleration" => acceleration: f64,
        "drivers" => drivers: Vec<String>,
        "homed" => homed: bool,
        "letter" => letter: String,
        "machinePosition" => machine_position: Option<f64>,
        "max" => max: f64,
        "min" => min: f64,
        "speed" => speed: f64,
        "userPosition" => user_position: Option<f64>,
        "visible" => visible: bool,
        "workplaceOffsets" => workplace_offsets: Vec<f64>,
    }
}

model_record! {
    pub struct Extruder {
        "driver" => driver: String,
        "factor" => factor: f64,
        "filament" => filament: String,
        "position" => position: f64,
        "pressureAdvance" => pressure_advance: f64,
        /// Total filament fed since the print started, in mm.
        "rawPosition" => raw_position: f64,
    }
}

model_record! {
    pub struct CurrentMove {
        "acceleration" => acceleration: f64,
        "deceleration" => deceleration: f64,
        "requestedSpeed" => requested_speed: f64,
        "topSpeed" => top_speed: f64,
    }
}

model_record! {
    pub struct Move {
        "axes" => axes: Vec<Axis>,
        "currentMove" => current_move: CurrentMove,
        "extruders" => extruders: Vec<Extruder>,
        "printingAcceleration" => printing_acceleration: f64,
        "speedFactor" => speed_factor: f64,
        "travelAcceleration" => travel_acceleration: f64,
        "workplaceNumber" => workplace_number: i64,
    }
}

impl Move {
    pub fn axis(&self, letter: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.letter == letter)
    }
}
