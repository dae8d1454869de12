//! Calibration Screen Control System snapshot provider. Read-only from
//! this side of the link; the screen is operated elsewhere.

use serde_json::{json, Value};

use crate::plant::{default_messages, MotionState, OperationalMode, StatusMessage};

const CSCS_NUM_MOTORS: usize = 1;

#[derive(Debug)]
pub struct Cscs {
    pub messages: Vec<StatusMessage>,
    pub status: MotionState,
    pub position_actual: f64,
    pub position_commanded: f64,
    pub drive_torque_actual: [f64; CSCS_NUM_MOTORS],
    pub drive_torque_commanded: [f64; CSCS_NUM_MOTORS],
    pub drive_current_actual: [f64; CSCS_NUM_MOTORS],
    pub drive_temperature: [f64; CSCS_NUM_MOTORS],
    pub encoder_head_raw: [f64; CSCS_NUM_MOTORS],
    pub encoder_head_calibrated: [f64; CSCS_NUM_MOTORS],
    pub power_draw: f64,
    pub operational_mode: OperationalMode,
    pub start_tai: f64,
}

impl Cscs {
    pub fn new(start_tai: f64) -> Self {
        Self {
            messages: default_messages(),
            status: MotionState::Stopped,
            position_actual: 0.0,
            position_commanded: 0.0,
            drive_torque_actual: [0.0; CSCS_NUM_MOTORS],
            drive_torque_commanded: [0.0; CSCS_NUM_MOTORS],
            drive_current_actual: [0.0; CSCS_NUM_MOTORS],
            drive_temperature: [20.0; CSCS_NUM_MOTORS],
            encoder_head_raw: [0.0; CSCS_NUM_MOTORS],
            encoder_head_calibrated: [0.0; CSCS_NUM_MOTORS],
            power_draw: 0.0,
            operational_mode: OperationalMode::Normal,
            start_tai,
        }
    }

    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        json!({
            "status": {
                "messages": self.messages,
                "status": self.status,
                "operationalMode": self.operational_mode,
            },
            "positionActual": self.position_actual,
            "positionCommanded": self.position_commanded,
            "driveTorqueActual": self.drive_torque_actual,
            "driveTorqueCommanded": self.drive_torque_commanded,
            "driveCurrentActual": self.drive_current_actual,
            "driveTemperature": self.drive_temperature,
            "encoderHeadRaw": self.encoder_head_raw,
            "encoderHeadCalibrated": self.encoder_head_calibrated,
            "powerDraw": self.power_draw,
            "timestampUTC": current_tai,
        })
    }
}
