//! The mock dome plant: one state machine per motorized subsystem plus
//! read-only snapshot providers, driven by a line-JSON dispatcher over TCP.
//!
//! Every state machine is advanced lazily: a status request evaluates the
//! machine at the requested TAI and returns a snapshot. Motion follows the
//! profiles in [`crate::motion`]; brake and motor-power sequencing advances
//! one transition per evaluation, which at the bridge's poll cadence plays
//! out over a few hundred milliseconds of wall time.

pub mod amcs;
pub mod apscs;
pub mod cbcs;
pub mod cscs;
pub mod lcs;
pub mod lwscs;
pub mod moncs;
pub mod rad;
pub mod server;
pub mod thcs;

pub use amcs::Amcs;
pub use apscs::Apscs;
pub use cbcs::Cbcs;
pub use cscs::Cscs;
pub use lcs::Lcs;
pub use lwscs::Lwscs;
pub use moncs::Moncs;
pub use rad::Rad;
pub use server::{MockPlant, PlantOptions, PlantState};
pub use thcs::Thcs;

use serde::{Deserialize, Serialize};

/// Motion states reported by the lower level components. The wire encoding
/// is the screaming-snake name, e.g. `PROXIMITY_OPEN_LS_ENGAGED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionState {
    Moving,
    Crawling,
    Stopped,
    Stopping,
    Parking,
    Parked,
    Opening,
    Closing,
    Open,
    Closed,
    Error,
    BrakesEngaged,
    BrakesDisengaged,
    EngagingBrakes,
    DisengagingBrakes,
    MotorPowerOn,
    MotorPowerOff,
    EnablingMotorPower,
    DisablingMotorPower,
    GoStationary,
    GoNormal,
    GoDegraded,
    Inflating,
    Inflated,
    Deflating,
    Deflated,
    StartingMotorCooling,
    MotorCoolingOn,
    StoppingMotorCooling,
    MotorCoolingOff,
    Stationary,
    ProximityOpenLsEngaged,
    ProximityClosedLsEngaged,
    LpEngaging,
    LpEngaged,
    LpDisengaging,
    LpDisengaged,
    Enabled,
    Disabled,
    Enabling,
    Disabling,
    Undetermined,
}

impl MotionState {
    /// The azimuth and the shutters may only re-zero or reconfigure while
    /// at rest.
    pub fn is_at_rest(&self) -> bool {
        matches!(
            self,
            MotionState::Stopped | MotionState::Stationary | MotionState::Parked
        )
    }
}

/// Operational mode of a lower level component, independent from its
/// motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalMode {
    Normal,
    Degraded,
}

/// One entry of the `status.messages` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub code: u32,
    pub description: String,
}

/// Status messages of a healthy subsystem.
pub fn default_messages() -> Vec<StatusMessage> {
    vec![StatusMessage {
        code: 0,
        description: "No Errors".to_string(),
    }]
}

/// Status messages of a subsystem with drives in error.
pub fn fault_messages() -> Vec<StatusMessage> {
    vec![StatusMessage {
        code: 1,
        description: "Motors in error state.".to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_state_wire_encoding() {
        assert_eq!(
            serde_json::to_string(&MotionState::ProximityOpenLsEngaged).unwrap(),
            "\"PROXIMITY_OPEN_LS_ENGAGED\""
        );
        assert_eq!(
            serde_json::to_string(&MotionState::Stationary).unwrap(),
            "\"STATIONARY\""
        );
        assert_eq!(
            serde_json::to_string(&MotionState::EnablingMotorPower).unwrap(),
            "\"ENABLING_MOTOR_POWER\""
        );
        let parsed: MotionState = serde_json::from_str("\"LP_DISENGAGED\"").unwrap();
        assert_eq!(parsed, MotionState::LpDisengaged);
    }

    #[test]
    fn test_rest_states() {
        assert!(MotionState::Parked.is_at_rest());
        assert!(MotionState::Stopped.is_at_rest());
        assert!(!MotionState::Moving.is_at_rest());
        assert!(!MotionState::EngagingBrakes.is_at_rest());
    }
}
