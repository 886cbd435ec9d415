// ── Boards, storage and network ──

use super::macros::model_record;

model_record! {
    /// Voltage or temperature reading with its observed range.
    pub struct MinMaxCurrent {
        "current" => current: f64,
        "min" => min: f64,
        "max" => max: f64,
    }
}

model_record! {
    /// A main board or CAN expansion board.
    pub struct Board {
        "canAddress" => can_address: Option<i64>,
        "firmwareDate" => firmware_date: String,
        "firmwareFileName" => firmware_file_name: String,
        "firmwareName" => firmware_name: String,
        "firmwareVersion" => firmware_version: String,
        "maxHeaters" => max_heaters: i64,
        "maxMotors" => max_motors: i64,
        "mcuTemp" => mcu_temp: Option<MinMaxCurrent>,
        "name" => name: String,
        "shortName" => short_name: String,
        "uniqueId" => unique_id: Option<String>,
        "v12" => v12: Option<MinMaxCurrent>,
        "vIn" => v_in: Option<MinMaxCurrent>,
    }
}

model_record! {
    /// Default directories on the controller's storage.
    pub struct Directories {
        "filaments" => filaments: String,
        "firmware" => firmware: String,
        "gCodes" => gcodes: String,
        "macros" => macros: String,
        "menu" => menu: String,
        "scans" => scans: String,
        "system" => system: String,
        "web" => web: String,
    }
}

model_record! {
    /// A storage volume (SD card or USB drive).
    pub struct Volume {
        "capacity" => capacity: Option<u64>,
        "freeSpace" => free_space: Option<u64>,
        "mounted" => mounted: bool,
        "name" => name: Option<String>,
        "path" => path: Option<String>,
    }
}

model_record! {
    pub struct NetworkInterface {
        "actualIP" => actual_ip: Option<String>,
        "gateway" => gateway: Option<String>,
        "mac" => mac: Option<String>,
        "signal" => signal: Option<i64>,
        "speed" => speed: Option<i64>,
        "state" => state: Option<String>,
        "subnet" => subnet: Option<String>,
        "type" => kind: String,
    }
}

model_record! {
    pub struct Network {
        "hostname" => hostname: String,
        "interfaces" => interfaces: Vec<NetworkInterface>,
        "name" => name: String,
    }
}
