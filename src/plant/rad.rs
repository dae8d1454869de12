//! Rear Access Door snapshot provider. Read-only; the doors are operated
//! from local push buttons, the bridge only observes them.

use serde_json::{json, Value};

use crate::constants::{RAD_NUM_DOORS, RAD_NUM_LIMIT_SWITCHES, RAD_NUM_LOCKING_PINS};
use crate::plant::{default_messages, MotionState, StatusMessage};

#[derive(Debug)]
pub struct Rad {
    pub messages: Vec<StatusMessage>,
    pub status: [MotionState; RAD_NUM_DOORS],
    pub position_actual: [f64; RAD_NUM_DOORS],
    pub position_commanded: [f64; RAD_NUM_DOORS],
    pub drive_torque_actual: [f64; RAD_NUM_DOORS],
    pub drive_torque_commanded: [f64; RAD_NUM_DOORS],
    pub drive_current_actual: [f64; RAD_NUM_DOORS],
    pub drive_temperature: [f64; RAD_NUM_DOORS],
    pub open_limit_switch_engaged: [bool; RAD_NUM_LIMIT_SWITCHES],
    pub closed_limit_switch_engaged: [bool; RAD_NUM_LIMIT_SWITCHES],
    pub locking_pins: [f64; RAD_NUM_LOCKING_PINS],
    pub brakes_engaged: [bool; RAD_NUM_DOORS],
    pub photoelectric_sensor_clear: bool,
    pub light_curtain_clear: bool,
}

impl Rad {
    pub fn new() -> Self {
        Self {
            messages: default_messages(),
            status: [MotionState::Closed; RAD_NUM_DOORS],
            position_actual: [0.0; RAD_NUM_DOORS],
            position_commanded: [0.0; RAD_NUM_DOORS],
            drive_torque_actual: [0.0; RAD_NUM_DOORS],
            drive_torque_commanded: [0.0; RAD_NUM_DOORS],
            drive_current_actual: [0.0; RAD_NUM_DOORS],
            drive_temperature: [20.0; RAD_NUM_DOORS],
            open_limit_switch_engaged: [false; RAD_NUM_LIMIT_SWITCHES],
            closed_limit_switch_engaged: [true; RAD_NUM_LIMIT_SWITCHES],
            locking_pins: [0.0; RAD_NUM_LOCKING_PINS],
            brakes_engaged: [true; RAD_NUM_DOORS],
            photoelectric_sensor_clear: true,
            light_curtain_clear: true,
        }
    }

    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        json!({
            "status": {
                "messages": self.messages,
                "status": self.status,
            },
            "positionActual": self.position_actual,
            "positionCommanded": self.position_commanded,
            "driveTorqueActual": self.drive_torque_actual,
            "driveTorqueCommanded": self.drive_torque_commanded,
            "driveCurrentActual": self.drive_current_actual,
            "driveTemperature": self.drive_temperature,
            "openLimitSwitchEngaged": self.open_limit_switch_engaged,
            "closedLimitSwitchEngaged": self.closed_limit_switch_engaged,
            "lockingPins": self.locking_pins,
            "brakesEngaged": self.brakes_engaged,
            "photoelectricSensorClear": self.photoelectric_sensor_clear,
            "lightCurtainClear": self.light_curtain_clear,
            "timestampUTC": current_tai,
        })
    }
}

impl Default for Rad {
    fn default() -> Self {
        Self::new()
    }
}
