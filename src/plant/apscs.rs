//! Aperture Shutter Control System state machine.
//!
//! Two shutters, two motors each. Positions are percent open; motion is
//! linear at the fixed shutter speed. A fully opened shutter engages the
//! open proximity limit switch, a fully closed one the closed switch.

use serde_json::{json, Value};

use crate::constants::{
    APSCS_CLOSED_POSITION, APSCS_CURRENT_PER_MOTOR, APSCS_NUM_MOTORS,
    APSCS_NUM_MOTORS_PER_SHUTTER, APSCS_NUM_SHUTTERS, APSCS_OPEN_POSITION,
    APSCS_POSITION_JITTER, APSCS_SHUTTER_SPEED, APS_POWER_DRAW,
};
use crate::error::PlantError;
use crate::motion::{LinearProfile, MotionPhase};
use crate::plant::{default_messages, fault_messages, MotionState, OperationalMode, StatusMessage};

#[derive(Debug)]
pub struct Apscs {
    pub messages: Vec<StatusMessage>,
    pub position_actual: [f64; APSCS_NUM_SHUTTERS],
    pub position_commanded: [f64; APSCS_NUM_SHUTTERS],
    pub drive_torque_actual: [f64; APSCS_NUM_MOTORS],
    pub drive_torque_commanded: [f64; APSCS_NUM_MOTORS],
    pub drive_current_actual: [f64; APSCS_NUM_MOTORS],
    pub drive_temperature: [f64; APSCS_NUM_MOTORS],
    pub power_draw: f64,
    pub current_state: [MotionState; APSCS_NUM_SHUTTERS],
    pub start_state: [MotionState; APSCS_NUM_SHUTTERS],
    pub target_state: [MotionState; APSCS_NUM_SHUTTERS],
    pub drives_in_error_state: [[bool; APSCS_NUM_MOTORS_PER_SHUTTER]; APSCS_NUM_SHUTTERS],
    pub operational_mode: OperationalMode,
    pub command_time_tai: f64,
    pub start_tai: f64,
    motion: [Option<LinearProfile>; APSCS_NUM_SHUTTERS],
}

impl Apscs {
    pub fn new(start_tai: f64) -> Self {
        Self {
            messages: default_messages(),
            position_actual: [APSCS_CLOSED_POSITION; APSCS_NUM_SHUTTERS],
            position_commanded: [APSCS_CLOSED_POSITION; APSCS_NUM_SHUTTERS],
            drive_torque_actual: [0.0; APSCS_NUM_MOTORS],
            drive_torque_commanded: [0.0; APSCS_NUM_MOTORS],
            drive_current_actual: [0.0; APSCS_NUM_MOTORS],
            drive_temperature: [20.0; APSCS_NUM_MOTORS],
            power_draw: 0.0,
            current_state: [MotionState::Closed; APSCS_NUM_SHUTTERS],
            start_state: [MotionState::Closed; APSCS_NUM_SHUTTERS],
            target_state: [MotionState::Closed; APSCS_NUM_SHUTTERS],
            drives_in_error_state: [[false; APSCS_NUM_MOTORS_PER_SHUTTER]; APSCS_NUM_SHUTTERS],
            operational_mode: OperationalMode::Normal,
            command_time_tai: start_tai,
            start_tai,
            motion: [None; APSCS_NUM_SHUTTERS],
        }
    }

    /// Open both shutters. Returns the estimated duration [s].
    pub fn open_shutter(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.start_motion(APSCS_OPEN_POSITION, MotionState::Opening, MotionState::Open, start_tai)
    }

    /// Close both shutters. Returns the estimated duration [s].
    pub fn close_shutter(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.start_motion(
            APSCS_CLOSED_POSITION,
            MotionState::Closing,
            MotionState::Closed,
            start_tai,
        )
    }

    /// Stop shutter motion where it is, without engaging the brakes.
    pub fn stop_shutter(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.command_time_tai = start_tai;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.evaluate_motion(start_tai, shutter_id);
            self.motion[shutter_id] = None;
            self.start_state[shutter_id] = MotionState::Stopping;
            self.current_state[shutter_id] = MotionState::Stopped;
            self.target_state[shutter_id] = MotionState::Stopped;
        }
        Ok(0.0)
    }

    /// Stop shutter motion and run the brake-engage shutdown.
    pub fn go_stationary(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.command_time_tai = start_tai;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.evaluate_motion(start_tai, shutter_id);
            self.motion[shutter_id] = None;
            self.start_state[shutter_id] = MotionState::GoStationary;
            self.current_state[shutter_id] = MotionState::GoStationary;
            self.target_state[shutter_id] = MotionState::Stationary;
        }
        Ok(0.0)
    }

    /// Drive both shutters to the homed (fully closed) position regardless
    /// of their commanded state.
    pub fn home(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.command_time_tai = start_tai;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.position_actual[shutter_id] = APSCS_CLOSED_POSITION;
            self.position_commanded[shutter_id] = APSCS_CLOSED_POSITION;
            self.motion[shutter_id] = None;
            self.start_state[shutter_id] = MotionState::Closing;
            self.current_state[shutter_id] = MotionState::ProximityClosedLsEngaged;
            self.target_state[shutter_id] = MotionState::Closed;
        }
        Ok(0.0)
    }

    /// Reset the drives flagged with 1 in `reset` (one entry per motor,
    /// shutter-major order).
    pub fn reset_drives_shutter(&mut self, start_tai: f64, reset: &[u8]) -> Result<f64, PlantError> {
        self.command_time_tai = start_tai;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            for motor_id in 0..APSCS_NUM_MOTORS_PER_SHUTTER {
                let index = shutter_id * APSCS_NUM_MOTORS_PER_SHUTTER + motor_id;
                if reset.get(index) == Some(&1) {
                    self.drives_in_error_state[shutter_id][motor_id] = false;
                }
            }
        }
        Ok(0.0)
    }

    /// Leave the fault state. Fails while any drive is still in error.
    pub fn exit_fault(&mut self, start_tai: f64) -> Result<(), PlantError> {
        if self
            .drives_in_error_state
            .iter()
            .any(|shutter| shutter.iter().any(|&e| e))
        {
            return Err(PlantError::BadState(
                "make sure to reset drives before exiting from fault".into(),
            ));
        }
        self.command_time_tai = start_tai;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.start_state[shutter_id] = MotionState::Stationary;
            self.current_state[shutter_id] = MotionState::Stationary;
            self.target_state[shutter_id] = MotionState::Stationary;
            self.motion[shutter_id] = None;
        }
        self.messages = default_messages();
        Ok(())
    }

    /// Force the fault state with the given drives in error (one entry per
    /// motor, shutter-major order). Test hook.
    pub fn set_fault(&mut self, start_tai: f64, drives_in_error: &[u8]) {
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.evaluate_motion(start_tai, shutter_id);
            self.motion[shutter_id] = None;
            for motor_id in 0..APSCS_NUM_MOTORS_PER_SHUTTER {
                let index = shutter_id * APSCS_NUM_MOTORS_PER_SHUTTER + motor_id;
                self.drives_in_error_state[shutter_id][motor_id] =
                    drives_in_error.get(index) == Some(&1);
            }
            self.start_state[shutter_id] = MotionState::Error;
            self.current_state[shutter_id] = MotionState::Error;
            self.target_state[shutter_id] = MotionState::Error;
        }
        self.messages = fault_messages();
    }

    pub fn set_normal(&mut self) {
        self.operational_mode = OperationalMode::Normal;
    }

    pub fn set_degraded(&mut self) {
        self.operational_mode = OperationalMode::Degraded;
    }

    /// Advance both shutter machines to `current_tai` and return the
    /// snapshot.
    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            self.evaluate_state(current_tai, shutter_id);
        }
        let mut any_moving = false;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            let moving = matches!(
                self.current_state[shutter_id],
                MotionState::Opening | MotionState::Closing
            );
            any_moving |= moving;
            let motor_current = if moving { APSCS_CURRENT_PER_MOTOR } else { 0.0 };
            for motor_id in 0..APSCS_NUM_MOTORS_PER_SHUTTER {
                self.drive_current_actual[shutter_id * APSCS_NUM_MOTORS_PER_SHUTTER + motor_id] =
                    motor_current;
            }
        }
        self.power_draw = if any_moving { APS_POWER_DRAW } else { 0.0 };
        json!({
            "status": {
                "messages": self.messages,
                "status": self.current_state,
                "operationalMode": self.operational_mode,
            },
            "positionActual": self.position_actual,
            "positionCommanded": self.position_commanded,
            "driveTorqueActual": self.drive_torque_actual,
            "driveTorqueCommanded": self.drive_torque_commanded,
            "driveCurrentActual": self.drive_current_actual,
            "driveTemperature": self.drive_temperature,
            "powerDraw": self.power_draw,
            "timestampUTC": current_tai,
        })
    }

    fn check_not_in_error(&self) -> Result<(), PlantError> {
        if self.current_state.contains(&MotionState::Error) {
            return Err(PlantError::BadState(
                "shutter is in fault; reset drives and exit fault first".into(),
            ));
        }
        Ok(())
    }

    fn start_motion(
        &mut self,
        target_position: f64,
        moving_state: MotionState,
        target_state: MotionState,
        start_tai: f64,
    ) -> Result<f64, PlantError> {
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        let mut duration: f64 = 0.0;
        for shutter_id in 0..APSCS_NUM_SHUTTERS {
            let profile = LinearProfile::new(
                self.position_actual[shutter_id],
                target_position,
                APSCS_SHUTTER_SPEED,
                start_tai,
            );
            duration = duration.max(profile.duration());
            self.position_commanded[shutter_id] = target_position;
            self.target_state[shutter_id] = target_state;
            self.motion[shutter_id] = Some(profile);
            // An already moving shutter keeps reporting its original
            // direction until it arrives, like the real drive electronics.
            if !matches!(
                self.current_state[shutter_id],
                MotionState::Opening | MotionState::Closing
            ) {
                self.start_state[shutter_id] = moving_state;
                self.current_state[shutter_id] = moving_state;
            }
        }
        Ok(duration)
    }

    fn evaluate_state(&mut self, current_tai: f64, shutter_id: usize) {
        use MotionState as S;
        match self.current_state[shutter_id] {
            S::Opening | S::Closing => self.evaluate_motion(current_tai, shutter_id),
            S::GoStationary => self.current_state[shutter_id] = S::Stopping,
            S::Stopping => self.current_state[shutter_id] = S::Stopped,
            S::Stopped => {
                if self.target_state[shutter_id] == S::Stationary {
                    self.current_state[shutter_id] = S::EngagingBrakes;
                }
            }
            S::EngagingBrakes => self.current_state[shutter_id] = S::BrakesEngaged,
            S::BrakesEngaged => self.current_state[shutter_id] = S::DisablingMotorPower,
            S::DisablingMotorPower => self.current_state[shutter_id] = S::MotorPowerOff,
            S::MotorPowerOff => {
                self.current_state[shutter_id] = self.target_state[shutter_id];
                self.start_state[shutter_id] = self.target_state[shutter_id];
            }
            _ => {}
        }
    }

    fn evaluate_motion(&mut self, current_tai: f64, shutter_id: usize) {
        if let Some(profile) = self.motion[shutter_id] {
            let (position, phase) = profile.sample(current_tai);
            self.position_actual[shutter_id] = position;
            if phase == MotionPhase::Done {
                // The motors settle just shy of the commanded position; the
                // proximity limit switch engages all the same.
                self.position_actual[shutter_id] = profile.target() - APSCS_POSITION_JITTER;
                self.motion[shutter_id] = None;
                if matches!(
                    self.current_state[shutter_id],
                    MotionState::Opening | MotionState::Closing
                ) {
                    self.current_state[shutter_id] = if profile.target() == APSCS_OPEN_POSITION {
                        MotionState::ProximityOpenLsEngaged
                    } else {
                        MotionState::ProximityClosedLsEngaged
                    };
                }
            }
        }
    }
}
