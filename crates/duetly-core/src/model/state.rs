// ── Machine state and input channels ──

use serde::{Deserialize, Serialize};

use super::macros::{model_record, patch_enum};

/// Overall machine status reported by the firmware.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum MachineStatus {
    #[default]
    Disconnected,
    Starting,
    Updating,
    Off,
    Halted,
    Pausing,
    Paused,
    Resuming,
    Cancelling,
    Processing,
    Simulating,
    Busy,
    ChangingTool,
    Idle,
}

impl MachineStatus {
    /// A file is being processed, possibly paused.
    pub fn is_printing(self) -> bool {
        matches!(
            self,
            Self::Pausing
                | Self::Paused
                | Self::Resuming
                | Self::Cancelling
                | Self::Processing
                | Self::Simulating
        )
    }

    /// The controller is going away (emergency stop or firmware update).
    pub fn expects_restart(self) -> bool {
        matches!(self, Self::Halted | Self::Updating)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum InputChannelState {
    AwaitingAcknowledgement,
    #[default]
    Idle,
    Executing,
    Waiting,
    Reading,
}

patch_enum!(MachineStatus, InputChannelState);

model_record! {
    pub struct MessageBox {
        "axisControls" => axis_controls: i64,
        "message" => message: String,
        "mode" => mode: i64,
        "seq" => seq: i64,
        "timeout" => timeout: i64,
        "title" => title: String,
    }
}

model_record! {
    pub struct State {
        "atxPower" => atx_power: Option<bool>,
        "currentTool" => current_tool: i64,
        "displayMessage" => display_message: String,
        "logFile" => log_file: Option<String>,
        "logLevel" => log_level: String,
        "machineMode" => machine_mode: String,
        "messageBox" => message_box: Option<MessageBox>,
        "nextTool" => next_tool: i64,
        "powerFailScript" => power_fail_script: String,
        "previousTool" => previous_tool: i64,
        "status" => status: MachineStatus,
        "time" => time: Option<String>,
        /// Seconds since the firmware started.
        "upTime" => up_time: i64,
    }
}

model_record! {
    /// A G-code input channel (HTTP, USB, file, daemon, ...).
    pub struct InputChannel {
        "axesRelative" => axes_relative: bool,
        "compatibility" => compatibility: String,
        "drivesRelative" => drives_relative: bool,
        "feedRate" => feed_rate: f64,
        "inMacro" => in_macro: bool,
        "lineNumber" => line_number: i64,
        "name" => name: String,
        "state" => state: InputChannelState,
    }
}
