//! Wire protocol: command names, response codes, frame envelopes and the
//! typed parameter records commands decode into.
//!
//! One frame is one JSON object per line. A command looks like
//! `{"commandId": 17, "command": "moveAz", "parameters": {...}}` and a
//! reply like `{"commandId": 17, "response": 0, "timeout": 2.5}`. Status
//! replies add one field named after the subsystem holding its snapshot.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{AMCS_NUM_MOTORS, APSCS_NUM_MOTORS};
use crate::error::PlantError;

/// Commands understood by the dome controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandName {
    CloseLouvers,
    CloseShutter,
    Config,
    CrawlAz,
    CrawlEl,
    ExitFaultAz,
    ExitFaultEl,
    ExitFaultShutter,
    ExitFaultLouvers,
    ExitFaultThermal,
    Fans,
    GoStationaryAz,
    GoStationaryEl,
    GoStationaryLouvers,
    GoStationaryShutter,
    Home,
    Inflate,
    MoveAz,
    MoveEl,
    OpenShutter,
    Park,
    ResetDrivesAz,
    ResetDrivesShutter,
    Restore,
    SetDegradedAz,
    SetDegradedEl,
    SetDegradedLouvers,
    SetDegradedShutter,
    SetDegradedMonitoring,
    SetDegradedThermal,
    SetLouvers,
    SetNormalAz,
    SetNormalEl,
    SetNormalLouvers,
    SetNormalShutter,
    SetNormalMonitoring,
    SetNormalThermal,
    SetTemperature,
    SetZeroAz,
    #[serde(rename = "statusAMCS")]
    StatusAmcs,
    #[serde(rename = "statusApSCS")]
    StatusApscs,
    #[serde(rename = "statusCBCS")]
    StatusCbcs,
    #[serde(rename = "statusCSCS")]
    StatusCscs,
    #[serde(rename = "statusLCS")]
    StatusLcs,
    #[serde(rename = "statusLWSCS")]
    StatusLwscs,
    #[serde(rename = "statusMonCS")]
    StatusMoncs,
    #[serde(rename = "statusRAD")]
    StatusRad,
    #[serde(rename = "statusThCS")]
    StatusThcs,
    StopAz,
    StopEl,
    StopLouvers,
    StopShutter,
}

impl CommandName {
    /// The exact name used on the wire.
    pub fn as_wire_name(&self) -> &'static str {
        match self {
            CommandName::CloseLouvers => "closeLouvers",
            CommandName::CloseShutter => "closeShutter",
            CommandName::Config => "config",
            CommandName::CrawlAz => "crawlAz",
            CommandName::CrawlEl => "crawlEl",
            CommandName::ExitFaultAz => "exitFaultAz",
            CommandName::ExitFaultEl => "exitFaultEl",
            CommandName::ExitFaultShutter => "exitFaultShutter",
            CommandName::ExitFaultLouvers => "exitFaultLouvers",
            CommandName::ExitFaultThermal => "exitFaultThermal",
            CommandName::Fans => "fans",
            CommandName::GoStationaryAz => "goStationaryAz",
            CommandName::GoStationaryEl => "goStationaryEl",
            CommandName::GoStationaryLouvers => "goStationaryLouvers",
            CommandName::GoStationaryShutter => "goStationaryShutter",
            CommandName::Home => "home",
            CommandName::Inflate => "inflate",
            CommandName::MoveAz => "moveAz",
            CommandName::MoveEl => "moveEl",
            CommandName::OpenShutter => "openShutter",
            CommandName::Park => "park",
            CommandName::ResetDrivesAz => "resetDrivesAz",
            CommandName::ResetDrivesShutter => "resetDrivesShutter",
            CommandName::Restore => "restore",
            CommandName::SetDegradedAz => "setDegradedAz",
            CommandName::SetDegradedEl => "setDegradedEl",
            CommandName::SetDegradedLouvers => "setDegradedLouvers",
            CommandName::SetDegradedShutter => "setDegradedShutter",
            CommandName::SetDegradedMonitoring => "setDegradedMonitoring",
            CommandName::SetDegradedThermal => "setDegradedThermal",
            CommandName::SetLouvers => "setLouvers",
            CommandName::SetNormalAz => "setNormalAz",
            CommandName::SetNormalEl => "setNormalEl",
            CommandName::SetNormalLouvers => "setNormalLouvers",
            CommandName::SetNormalShutter => "setNormalShutter",
            CommandName::SetNormalMonitoring => "setNormalMonitoring",
            CommandName::SetNormalThermal => "setNormalThermal",
            CommandName::SetTemperature => "setTemperature",
            CommandName::SetZeroAz => "setZeroAz",
            CommandName::StatusAmcs => "statusAMCS",
            CommandName::StatusApscs => "statusApSCS",
            CommandName::StatusCbcs => "statusCBCS",
            CommandName::StatusCscs => "statusCSCS",
            CommandName::StatusLcs => "statusLCS",
            CommandName::StatusLwscs => "statusLWSCS",
            CommandName::StatusMoncs => "statusMonCS",
            CommandName::StatusRad => "statusRAD",
            CommandName::StatusThcs => "statusThCS",
            CommandName::StopAz => "stopAz",
            CommandName::StopEl => "stopEl",
            CommandName::StopLouvers => "stopLouvers",
            CommandName::StopShutter => "stopShutter",
        }
    }

    /// Status requests bypass the normal reply shape and never block user
    /// operations.
    pub fn is_status(&self) -> bool {
        self.as_wire_name().starts_with("status")
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire_name())
    }
}

/// Names of the lower level components as they appear on the wire. The
/// mixed-case spellings of `ApSCS` and `MonCS` are semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LlcName {
    #[serde(rename = "AMCS")]
    Amcs,
    #[serde(rename = "ApSCS")]
    Apscs,
    #[serde(rename = "CBCS")]
    Cbcs,
    #[serde(rename = "CSCS")]
    Cscs,
    #[serde(rename = "LCS")]
    Lcs,
    #[serde(rename = "LWSCS")]
    Lwscs,
    #[serde(rename = "MonCS")]
    Moncs,
    #[serde(rename = "RAD")]
    Rad,
    #[serde(rename = "ThCS")]
    Thcs,
}

impl LlcName {
    pub const ALL: [LlcName; 9] = [
        LlcName::Amcs,
        LlcName::Apscs,
        LlcName::Cbcs,
        LlcName::Cscs,
        LlcName::Lcs,
        LlcName::Lwscs,
        LlcName::Moncs,
        LlcName::Rad,
        LlcName::Thcs,
    ];

    pub fn as_wire_name(&self) -> &'static str {
        match self {
            LlcName::Amcs => "AMCS",
            LlcName::Apscs => "ApSCS",
            LlcName::Cbcs => "CBCS",
            LlcName::Cscs => "CSCS",
            LlcName::Lcs => "LCS",
            LlcName::Lwscs => "LWSCS",
            LlcName::Moncs => "MonCS",
            LlcName::Rad => "RAD",
            LlcName::Thcs => "ThCS",
        }
    }

    /// The status request for this component.
    pub fn status_command(&self) -> CommandName {
        match self {
            LlcName::Amcs => CommandName::StatusAmcs,
            LlcName::Apscs => CommandName::StatusApscs,
            LlcName::Cbcs => CommandName::StatusCbcs,
            LlcName::Cscs => CommandName::StatusCscs,
            LlcName::Lcs => CommandName::StatusLcs,
            LlcName::Lwscs => CommandName::StatusLwscs,
            LlcName::Moncs => CommandName::StatusMoncs,
            LlcName::Rad => CommandName::StatusRad,
            LlcName::Thcs => CommandName::StatusThcs,
        }
    }
}

impl std::fmt::Display for LlcName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire_name())
    }
}

bitflags! {
    /// Bitmask of subsystems, used by the operations that fan out over
    /// several lower level components (stop, exit fault, operational mode,
    /// home).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubSystemId: u32 {
        const AMCS = 1 << 0;
        const LWSCS = 1 << 1;
        const APSCS = 1 << 2;
        const LCS = 1 << 3;
        const THCS = 1 << 4;
        const MONCS = 1 << 5;
        const CBCS = 1 << 6;
        const CSCS = 1 << 7;
        const RAD = 1 << 8;
        const OBC = 1 << 9;
    }
}

/// Response codes sent by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    NotConnected,
    Unsupported,
    BadParameters,
    BadSource,
    BadState,
    RotatingNotReceived,
    RotatingNotReplied,
}

impl ResponseCode {
    pub fn as_wire(&self) -> u8 {
        match self {
            ResponseCode::Ok => 0,
            ResponseCode::NotConnected => 1,
            ResponseCode::Unsupported => 2,
            ResponseCode::BadParameters => 3,
            ResponseCode::BadSource => 4,
            ResponseCode::BadState => 5,
            ResponseCode::RotatingNotReceived => 6,
            ResponseCode::RotatingNotReplied => 7,
        }
    }

    pub fn from_wire(code: u8) -> Option<ResponseCode> {
        Some(match code {
            0 => ResponseCode::Ok,
            1 => ResponseCode::NotConnected,
            2 => ResponseCode::Unsupported,
            3 => ResponseCode::BadParameters,
            4 => ResponseCode::BadSource,
            5 => ResponseCode::BadState,
            6 => ResponseCode::RotatingNotReceived,
            7 => ResponseCode::RotatingNotReplied,
            _ => return None,
        })
    }
}

/// On/off switch parameter, e.g. for the inflatable seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnOff {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

/// One command frame as written to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    pub command_id: u64,
    pub command: String,
    pub parameters: Map<String, Value>,
}

/// The fixed part of every reply. Status replies carry the snapshot in an
/// extra field named after the subsystem; that field stays in the raw
/// `serde_json` map the reply was read from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyHeader {
    pub command_id: u64,
    pub response: u8,
    #[serde(default = "not_applicable")]
    pub timeout: f64,
}

fn not_applicable() -> f64 {
    -1.0
}

// Typed parameter records. The controller decodes the loose `parameters`
// map into one of these before touching any state, so malformed input is
// rejected in one place.

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoveAzParams {
    /// Target azimuth [rad, 0..2pi).
    pub position: f64,
    /// Crawl velocity once the target is reached [rad/s].
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoveElParams {
    /// Target elevation [rad, 0..pi/2].
    pub position: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CrawlParams {
    /// Crawl velocity [rad/s].
    pub velocity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetLouversParams {
    /// One entry per louver: percent open in `[0, 100]`, or -1 to leave the
    /// louver untouched.
    pub position: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetDrivesParams {
    /// 1 resets the drive at that index, 0 leaves it alone.
    pub reset: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetTemperatureParams {
    /// Preferred dome temperature [deg C].
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FansParams {
    /// Fan speed [%].
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InflateParams {
    pub action: OnOff,
}

/// One configuration field on the wire: `{"target": "vmax", "setting": [v]}`.
/// Settings always travel as arrays, even for scalar targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub target: String,
    pub setting: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigParams {
    pub system: String,
    pub settings: Vec<ConfigField>,
}

/// Decode a command's `parameters` map into its typed record.
pub fn decode_params<T: serde::de::DeserializeOwned>(
    command: CommandName,
    parameters: &Map<String, Value>,
) -> Result<T, PlantError> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|e| PlantError::BadParameters(format!("{command}: {e}")))
}

/// Check a drive-reset vector against the expected length for its
/// subsystem.
pub fn check_drive_vector_len(command: CommandName, actual: usize) -> Result<(), PlantError> {
    let expected = match command {
        CommandName::ResetDrivesAz => AMCS_NUM_MOTORS,
        CommandName::ResetDrivesShutter => APSCS_NUM_MOTORS,
        _ => return Ok(()),
    };
    if actual != expected {
        return Err(PlantError::BadParameters(format!(
            "{command}: expected {expected} entries, got {actual}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&CommandName::MoveAz).unwrap(),
            "\"moveAz\""
        );
        assert_eq!(
            serde_json::to_string(&CommandName::StatusApscs).unwrap(),
            "\"statusApSCS\""
        );
        assert_eq!(
            serde_json::to_string(&CommandName::GoStationaryAz).unwrap(),
            "\"goStationaryAz\""
        );
        let parsed: CommandName = serde_json::from_str("\"statusMonCS\"").unwrap();
        assert_eq!(parsed, CommandName::StatusMoncs);
    }

    #[test]
    fn test_every_wire_name_round_trips() {
        for llc in LlcName::ALL {
            let json = serde_json::to_string(&llc).unwrap();
            assert_eq!(json, format!("\"{}\"", llc.as_wire_name()));
            let back: LlcName = serde_json::from_str(&json).unwrap();
            assert_eq!(back, llc);
        }
    }

    #[test]
    fn test_status_commands_are_status() {
        assert!(CommandName::StatusAmcs.is_status());
        assert!(!CommandName::MoveAz.is_status());
        assert!(!CommandName::StopLouvers.is_status());
    }

    #[test]
    fn test_decode_move_az_params() {
        let mut map = Map::new();
        map.insert("position".into(), 1.5.into());
        map.insert("velocity".into(), 0.01.into());
        let params: MoveAzParams = decode_params(CommandName::MoveAz, &map).unwrap();
        assert_eq!(params.position, 1.5);
        assert_eq!(params.velocity, 0.01);
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let map = Map::new();
        let result: Result<MoveAzParams, _> = decode_params(CommandName::MoveAz, &map);
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_header_defaults_timeout() {
        let header: ReplyHeader =
            serde_json::from_str(r#"{"commandId": 3, "response": 0}"#).unwrap();
        assert_eq!(header.command_id, 3);
        assert_eq!(header.timeout, -1.0);
    }
}
