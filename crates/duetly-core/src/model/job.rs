// ── Job state ──

use super::macros::model_record;

model_record! {
    /// Metadata of the file being printed, as parsed by the firmware.
    pub struct GCodeFileInfo {
        "fileName" => file_name: Option<String>,
        /// Filament needed per extruder, in mm.
        "filament" => filament: Vec<f64>,
        "generatedBy" => generated_by: Option<String>,
        "height" => height: f64,
        "lastModified" => last_modified: Option<String>,
        "layerHeight" => layer_height: f64,
        "numLayers" => num_layers: i64,
        "printTime" => print_time: Option<i64>,
        "simulatedTime" => simulated_time: Option<i64>,
        "size" => size: u64,
    }
}

model_record! {
    /// A completed layer. Only the board computer reports these; the
    /// standalone variant's list is filled by `LayerTracker`.
    pub struct Layer {
        "duration" => duration: f64,
        "filament" => filament: Vec<f64>,
        "fractionPrinted" => fraction_printed: f64,
        "height" => height: f64,
        "temperatures" => temperatures: Vec<f64>,
    }
}

model_record! {
    pub struct TimesLeft {
        "filament" => filament: Option<f64>,
        "file" => file: Option<f64>,
        "slicer" => slicer: Option<f64>,
    }
}

model_record! {
    pub struct Job {
        "duration" => duration: Option<f64>,
        "file" => file: GCodeFileInfo,
        "filePosition" => file_position: Option<u64>,
        "lastFileAborted" => last_file_aborted: bool,
        "lastFileCancelled" => last_file_cancelled: bool,
        "lastFileName" => last_file_name: Option<String>,
        "lastFileSimulated" => last_file_simulated: bool,
        "layer" => layer: Option<i64>,
        "layerTime" => layer_time: Option<f64>,
        "layers" => layers: Vec<Layer>,
        "pauseDuration" => pause_duration: Option<f64>,
        "rawExtrusion" => raw_extrusion: Option<f64>,
        "timesLeft" => times_left: TimesLeft,
        "warmUpDuration" => warm_up_duration: Option<f64>,
    }
}

impl Job {
    /// Whether a file is being processed.
    pub fn is_active(&self) -> bool {
        self.file.file_name.as_deref().is_some_and(|f| !f.is_empty())
    }
}
