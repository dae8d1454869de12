//! Louvers Control System state machine.
//!
//! 34 louvers, two motors each, each louver with its own state machine.
//! A louver whose position is non-zero counts as open, even at 1%. Motion
//! is linear at the fixed louver velocity and every motion ends with the
//! brakes re-engaged and the louver back in `STATIONARY`.

use serde_json::{json, Value};

use crate::constants::{
    LCS_CURRENT_PER_MOTOR, LCS_MOTION_VELOCITY, LCS_NUM_LOUVERS, LCS_NUM_MOTORS,
    LCS_NUM_MOTORS_PER_LOUVER, LOUVERS_POWER_DRAW,
};
use crate::error::PlantError;
use crate::plant::{default_messages, fault_messages, MotionState, OperationalMode, StatusMessage};

/// Sentinel in a `setLouvers` position array: leave this louver alone.
pub const LOUVER_UNCHANGED: f64 = -1.0;

#[derive(Debug)]
pub struct Lcs {
    pub messages: Vec<StatusMessage>,
    pub start_position: [f64; LCS_NUM_LOUVERS],
    pub position_actual: [f64; LCS_NUM_LOUVERS],
    pub position_commanded: [f64; LCS_NUM_LOUVERS],
    pub drive_torque_actual: [f64; LCS_NUM_MOTORS],
    pub drive_torque_commanded: [f64; LCS_NUM_MOTORS],
    pub drive_current_actual: [f64; LCS_NUM_MOTORS],
    pub drive_temperature: [f64; LCS_NUM_MOTORS],
    pub encoder_head_raw: [f64; LCS_NUM_MOTORS],
    pub encoder_head_calibrated: [f64; LCS_NUM_MOTORS],
    pub power_draw: f64,
    pub current_state: [MotionState; LCS_NUM_LOUVERS],
    pub start_state: [MotionState; LCS_NUM_LOUVERS],
    pub target_state: [MotionState; LCS_NUM_LOUVERS],
    pub drives_in_error_state: [[bool; LCS_NUM_MOTORS_PER_LOUVER]; LCS_NUM_LOUVERS],
    pub operational_mode: OperationalMode,
    pub command_time_tai: f64,
}

impl Lcs {
    pub fn new() -> Self {
        Self {
            messages: default_messages(),
            start_position: [0.0; LCS_NUM_LOUVERS],
            position_actual: [0.0; LCS_NUM_LOUVERS],
            position_commanded: [0.0; LCS_NUM_LOUVERS],
            drive_torque_actual: [0.0; LCS_NUM_MOTORS],
            drive_torque_commanded: [0.0; LCS_NUM_MOTORS],
            drive_current_actual: [0.0; LCS_NUM_MOTORS],
            drive_temperature: [20.0; LCS_NUM_MOTORS],
            encoder_head_raw: [0.0; LCS_NUM_MOTORS],
            encoder_head_calibrated: [0.0; LCS_NUM_MOTORS],
            power_draw: 0.0,
            current_state: [MotionState::Stationary; LCS_NUM_LOUVERS],
            start_state: [MotionState::Stationary; LCS_NUM_LOUVERS],
            target_state: [MotionState::Stationary; LCS_NUM_LOUVERS],
            drives_in_error_state: [[false; LCS_NUM_MOTORS_PER_LOUVER]; LCS_NUM_LOUVERS],
            operational_mode: OperationalMode::Normal,
            command_time_tai: 0.0,
        }
    }

    /// Command per-louver positions. Each entry is a percent in `[0, 100]`
    /// or [`LOUVER_UNCHANGED`]; anything else rejects the whole command
    /// before any louver moves.
    pub fn set_louvers(&mut self, position: &[f64], current_tai: f64) -> Result<(), PlantError> {
        self.check_not_in_error()?;
        if position.len() != LCS_NUM_LOUVERS {
            return Err(PlantError::BadParameters(format!(
                "expected {LCS_NUM_LOUVERS} louver positions, got {}",
                position.len()
            )));
        }
        for (louver_id, &pos) in position.iter().enumerate() {
            if pos != LOUVER_UNCHANGED && !(0.0..=100.0).contains(&pos) {
                return Err(PlantError::BadParameters(format!(
                    "louver {louver_id} position {pos} is outside [0, 100]"
                )));
            }
        }
        self.command_time_tai = current_tai;
        self.start_position = self.position_actual;
        for (louver_id, &pos) in position.iter().enumerate() {
            if pos == LOUVER_UNCHANGED || (self.position_actual[louver_id] - pos).abs() < 1e-9 {
                continue;
            }
            self.start_state[louver_id] = if pos > 0.0 {
                MotionState::Opening
            } else {
                MotionState::Closing
            };
            self.target_state[louver_id] = MotionState::Stationary;
            self.position_commanded[louver_id] = pos;
        }
        Ok(())
    }

    /// Close all louvers.
    pub fn close_louvers(&mut self, current_tai: f64) -> Result<(), PlantError> {
        self.check_not_in_error()?;
        self.command_time_tai = current_tai;
        self.start_position = self.position_actual;
        for louver_id in 0..LCS_NUM_LOUVERS {
            if self.position_actual[louver_id].abs() > 1e-9 {
                self.start_state[louver_id] = MotionState::Closing;
                self.target_state[louver_id] = MotionState::Stationary;
            }
            self.position_commanded[louver_id] = 0.0;
        }
        Ok(())
    }

    /// Stop all louver motion where it is, without engaging the brakes.
    pub fn stop_louvers(&mut self, current_tai: f64) -> Result<(), PlantError> {
        self.check_not_in_error()?;
        for louver_id in 0..LCS_NUM_LOUVERS {
            if self.current_state[louver_id] == MotionState::Moving {
                self.evaluate_moving(current_tai, louver_id);
            }
            self.start_state[louver_id] = MotionState::Stopping;
            self.current_state[louver_id] = MotionState::Stopped;
            self.target_state[louver_id] = MotionState::Stopped;
        }
        self.command_time_tai = current_tai;
        Ok(())
    }

    /// Let any ongoing motion finish, then engage the brakes everywhere.
    pub fn go_stationary(&mut self, current_tai: f64) -> Result<(), PlantError> {
        self.command_time_tai = current_tai;
        for louver_id in 0..LCS_NUM_LOUVERS {
            self.target_state[louver_id] = MotionState::Stationary;
        }
        Ok(())
    }

    /// Leave the fault state. Fails while any drive is still in error.
    pub fn exit_fault(&mut self, current_tai: f64) -> Result<(), PlantError> {
        for louver_id in 0..LCS_NUM_LOUVERS {
            if self.drives_in_error_state[louver_id].iter().any(|&e| e) {
                return Err(PlantError::BadState(
                    "make sure to reset drives before exiting from fault".into(),
                ));
            }
        }
        self.command_time_tai = current_tai;
        for louver_id in 0..LCS_NUM_LOUVERS {
            self.start_state[louver_id] = MotionState::Stationary;
            self.current_state[louver_id] = MotionState::Stationary;
            self.target_state[louver_id] = MotionState::Stationary;
        }
        self.messages = default_messages();
        Ok(())
    }

    /// Reset the drives flagged with 1 in `reset` (one entry per motor,
    /// louver-major order). Test hook; there is no wire command for it.
    pub fn reset_drives_louvers(&mut self, current_tai: f64, reset: &[u8]) -> Result<f64, PlantError> {
        if reset.len() != LCS_NUM_MOTORS {
            return Err(PlantError::BadParameters(format!(
                "expected {LCS_NUM_MOTORS} reset entries, got {}",
                reset.len()
            )));
        }
        self.command_time_tai = current_tai;
        for louver_id in 0..LCS_NUM_LOUVERS {
            for motor_id in 0..LCS_NUM_MOTORS_PER_LOUVER {
                if reset[louver_id * LCS_NUM_MOTORS_PER_LOUVER + motor_id] == 1 {
                    self.drives_in_error_state[louver_id][motor_id] = false;
                }
            }
        }
        Ok(0.0)
    }

    /// Force the fault state with the given drives in error (one entry per
    /// motor, louver-major order). Test hook.
    pub fn set_fault(&mut self, current_tai: f64, drives_in_error: &[u8]) {
        for louver_id in 0..LCS_NUM_LOUVERS {
            if self.current_state[louver_id] == MotionState::Moving {
                self.evaluate_moving(current_tai, louver_id);
            }
            for motor_id in 0..LCS_NUM_MOTORS_PER_LOUVER {
                self.drives_in_error_state[louver_id][motor_id] =
                    drives_in_error.get(louver_id * LCS_NUM_MOTORS_PER_LOUVER + motor_id)
                        == Some(&1);
            }
            self.start_state[louver_id] = MotionState::Error;
            self.current_state[louver_id] = MotionState::Error;
            self.target_state[louver_id] = MotionState::Error;
        }
        self.messages = fault_messages();
    }

    pub fn set_normal(&mut self) {
        self.operational_mode = OperationalMode::Normal;
    }

    pub fn set_degraded(&mut self) {
        self.operational_mode = OperationalMode::Degraded;
    }

    /// Advance all louver machines to `current_tai` and return the
    /// snapshot.
    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        let mut any_moving = false;
        for louver_id in 0..LCS_NUM_LOUVERS {
            self.evaluate_state(current_tai, louver_id);
            let moving = self.current_state[louver_id] == MotionState::Moving;
            any_moving |= moving;
            let motor_current = if moving { LCS_CURRENT_PER_MOTOR } else { 0.0 };
            for motor_id in 0..LCS_NUM_MOTORS_PER_LOUVER {
                self.drive_current_actual[louver_id * LCS_NUM_MOTORS_PER_LOUVER + motor_id] =
                    motor_current;
            }
        }
        self.power_draw = if any_moving { LOUVERS_POWER_DRAW } else { 0.0 };
        json!({
            "status": {
                "messages": self.messages,
                "status": &self.current_state[..],
                "operationalMode": self.operational_mode,
            },
            "positionActual": &self.position_actual[..],
            "positionCommanded": &self.position_commanded[..],
            "driveTorqueActual": &self.drive_torque_actual[..],
            "driveTorqueCommanded": &self.drive_torque_commanded[..],
            "driveCurrentActual": &self.drive_current_actual[..],
            "driveTemperature": &self.drive_temperature[..],
            "encoderHeadRaw": &self.encoder_head_raw[..],
            "encoderHeadCalibrated": &self.encoder_head_calibrated[..],
            "powerDraw": self.power_draw,
            "timestampUTC": current_tai,
        })
    }

    fn check_not_in_error(&self) -> Result<(), PlantError> {
        if self.current_state.contains(&MotionState::Error) {
            return Err(PlantError::BadState(
                "louvers are in fault; reset drives and exit fault first".into(),
            ));
        }
        Ok(())
    }

    fn evaluate_state(&mut self, current_tai: f64, louver_id: usize) {
        use MotionState as S;
        if self.target_state[louver_id] != S::Stationary {
            // Stopped and Error are terminal until the next command.
            return;
        }
        match self.current_state[louver_id] {
            S::Stationary => {
                if matches!(self.start_state[louver_id], S::Opening | S::Closing) {
                    self.current_state[louver_id] = S::EnablingMotorPower;
                }
            }
            S::EnablingMotorPower => self.current_state[louver_id] = S::MotorPowerOn,
            S::MotorPowerOn => self.current_state[louver_id] = S::GoNormal,
            S::GoNormal => self.current_state[louver_id] = S::DisengagingBrakes,
            S::DisengagingBrakes => self.current_state[louver_id] = S::BrakesDisengaged,
            S::BrakesDisengaged => self.current_state[louver_id] = S::Moving,
            S::Moving => self.evaluate_moving(current_tai, louver_id),
            S::Stopping => self.current_state[louver_id] = S::Stopped,
            S::Stopped => self.current_state[louver_id] = S::EngagingBrakes,
            S::EngagingBrakes => self.current_state[louver_id] = S::BrakesEngaged,
            S::BrakesEngaged => self.current_state[louver_id] = S::GoStationary,
            S::GoStationary => self.current_state[louver_id] = S::DisablingMotorPower,
            S::DisablingMotorPower => self.current_state[louver_id] = S::MotorPowerOff,
            S::MotorPowerOff => {
                self.start_state[louver_id] = S::Stationary;
                self.current_state[louver_id] = S::Stationary;
                self.target_state[louver_id] = S::Stationary;
            }
            _ => {}
        }
    }

    fn evaluate_moving(&mut self, current_tai: f64, louver_id: usize) {
        let distance = self.position_commanded[louver_id] - self.start_position[louver_id];
        let time_needed = distance.abs() / LCS_MOTION_VELOCITY;
        let time_so_far = current_tai - self.command_time_tai;
        let time_frac = if time_needed < 1e-9 {
            1.0
        } else {
            time_so_far / time_needed
        };
        if time_frac >= 1.0 {
            self.position_actual[louver_id] = self.position_commanded[louver_id];
            self.current_state[louver_id] = MotionState::Stopping;
        } else {
            self.position_actual[louver_id] =
                self.start_position[louver_id] + distance * time_frac;
        }
    }
}

impl Default for Lcs {
    fn default() -> Self {
        Self::new()
    }
}
