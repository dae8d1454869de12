//! Light and Wind Screen Control System state machine.
//!
//! Same shape as the azimuth machine, but over the half-open elevation
//! range `[0, pi/2]` with no wrap: a crawl that reaches a range end clamps
//! there and stops.

use serde_json::{json, Value};

use crate::constants::{
    LWSCS_AMAX, LWSCS_CURRENT_PER_MOTOR, LWSCS_JMAX, LWSCS_MAX_POSITION, LWSCS_MIN_POSITION,
    LWSCS_NUM_MOTORS, LWSCS_VMAX, LWS_POWER_DRAW,
};
use crate::error::PlantError;
use crate::motion::{CrawlProfile, LinearProfile, MotionPhase};
use crate::plant::{default_messages, fault_messages, MotionState, OperationalMode, StatusMessage};

#[derive(Debug, Clone, Copy)]
enum ElMotion {
    Idle,
    Move {
        profile: LinearProfile,
        velocity: f64,
    },
    Crawl(CrawlProfile),
}

#[derive(Debug)]
pub struct Lwscs {
    pub messages: Vec<StatusMessage>,
    pub start_position: f64,
    pub position_actual: f64,
    pub position_commanded: f64,
    pub velocity_actual: f64,
    pub velocity_commanded: f64,
    pub crawl_velocity: f64,
    pub drive_torque_actual: [f64; LWSCS_NUM_MOTORS],
    pub drive_torque_commanded: [f64; LWSCS_NUM_MOTORS],
    pub drive_current_actual: [f64; LWSCS_NUM_MOTORS],
    pub drive_temperature: [f64; LWSCS_NUM_MOTORS],
    pub encoder_head_raw: [f64; LWSCS_NUM_MOTORS],
    pub encoder_head_calibrated: [f64; LWSCS_NUM_MOTORS],
    pub power_draw: f64,
    pub jmax: f64,
    pub amax: f64,
    pub vmax: f64,
    pub current_state: MotionState,
    pub start_state: MotionState,
    pub target_state: MotionState,
    pub drives_in_error_state: [bool; LWSCS_NUM_MOTORS],
    pub operational_mode: OperationalMode,
    pub command_time_tai: f64,
    pub start_tai: f64,
    motion: ElMotion,
}

impl Lwscs {
    pub fn new(start_tai: f64) -> Self {
        Self {
            messages: default_messages(),
            start_position: LWSCS_MIN_POSITION,
            position_actual: LWSCS_MIN_POSITION,
            position_commanded: LWSCS_MIN_POSITION,
            velocity_actual: 0.0,
            velocity_commanded: 0.0,
            crawl_velocity: 0.0,
            drive_torque_actual: [0.0; LWSCS_NUM_MOTORS],
            drive_torque_commanded: [0.0; LWSCS_NUM_MOTORS],
            drive_current_actual: [0.0; LWSCS_NUM_MOTORS],
            drive_temperature: [20.0; LWSCS_NUM_MOTORS],
            encoder_head_raw: [0.0; LWSCS_NUM_MOTORS],
            encoder_head_calibrated: [0.0; LWSCS_NUM_MOTORS],
            power_draw: 0.0,
            jmax: LWSCS_JMAX,
            amax: LWSCS_AMAX,
            vmax: LWSCS_VMAX,
            current_state: MotionState::Stationary,
            start_state: MotionState::Stationary,
            target_state: MotionState::Stationary,
            drives_in_error_state: [false; LWSCS_NUM_MOTORS],
            operational_mode: OperationalMode::Normal,
            command_time_tai: start_tai,
            start_tai,
            motion: ElMotion::Idle,
        }
    }

    /// Move the screen to `position` [rad]. Returns the estimated duration.
    pub fn move_el(&mut self, position: f64, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        if !(LWSCS_MIN_POSITION..=LWSCS_MAX_POSITION).contains(&position) {
            return Err(PlantError::BadParameters(format!(
                "position {position} is outside [0, pi/2]"
            )));
        }
        let profile = LinearProfile::new(self.position_actual, position, self.vmax, start_tai);
        let duration = profile.duration();
        let velocity = if position >= self.position_actual {
            self.vmax
        } else {
            -self.vmax
        };
        self.start_position = self.position_actual;
        self.position_commanded = position;
        self.crawl_velocity = 0.0;
        self.velocity_commanded = 0.0;
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        self.motion = ElMotion::Move { profile, velocity };
        self.begin_motion(MotionState::Moving, MotionState::Stopped);
        Ok(duration)
    }

    /// Crawl at `velocity` [rad/s] until a range end is reached.
    pub fn crawl_el(&mut self, velocity: f64, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        if velocity.abs() > self.vmax {
            return Err(PlantError::BadParameters(format!(
                "crawl velocity {velocity} exceeds vmax {}",
                self.vmax
            )));
        }
        if velocity == 0.0 {
            return self.stop_el(start_tai);
        }
        self.crawl_velocity = velocity;
        self.velocity_commanded = velocity;
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        self.motion = ElMotion::Crawl(CrawlProfile::clamped(
            self.position_actual,
            velocity,
            start_tai,
            LWSCS_MIN_POSITION,
            LWSCS_MAX_POSITION,
        ));
        self.start_state = MotionState::Moving;
        self.current_state = MotionState::Crawling;
        self.target_state = MotionState::Crawling;
        Ok(0.0)
    }

    /// Stop all screen motion without engaging the brakes.
    pub fn stop_el(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.halt(start_tai, MotionState::Stopping, MotionState::Stopped);
        Ok(0.0)
    }

    /// Stop screen motion and run the brake-engage shutdown.
    pub fn go_stationary(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.halt(start_tai, MotionState::GoStationary, MotionState::Stationary);
        Ok(0.0)
    }

    /// Reset the drives flagged with 1. Test hook; the screen has no
    /// drive-reset command on the wire.
    pub fn reset_drives_el(&mut self, start_tai: f64, reset: &[u8]) -> Result<f64, PlantError> {
        self.command_time_tai = start_tai;
        for (flag, reset_it) in self.drives_in_error_state.iter_mut().zip(reset) {
            if *reset_it == 1 {
                *flag = false;
            }
        }
        Ok(0.0)
    }

    /// Leave the fault state. Fails while any drive is still in error.
    pub fn exit_fault(&mut self, start_tai: f64) -> Result<(), PlantError> {
        if self.drives_in_error_state.iter().any(|&e| e) {
            return Err(PlantError::BadState(
                "make sure to reset drives before exiting from fault".into(),
            ));
        }
        self.command_time_tai = start_tai;
        self.start_state = MotionState::Stationary;
        self.current_state = MotionState::Stationary;
        self.target_state = MotionState::Stationary;
        self.motion = ElMotion::Idle;
        self.messages = default_messages();
        Ok(())
    }

    /// Test hook mirroring a hardware fault report.
    pub fn set_fault(&mut self, start_tai: f64, drives_in_error: &[u8]) {
        self.evaluate_motion(start_tai);
        for (flag, in_error) in self.drives_in_error_state.iter_mut().zip(drives_in_error) {
            *flag = *in_error == 1;
        }
        self.velocity_actual = 0.0;
        self.motion = ElMotion::Idle;
        self.start_state = MotionState::Error;
        self.current_state = MotionState::Error;
        self.target_state = MotionState::Error;
        self.messages = fault_messages();
    }

    pub fn set_normal(&mut self) {
        self.operational_mode = OperationalMode::Normal;
    }

    pub fn set_degraded(&mut self) {
        self.operational_mode = OperationalMode::Degraded;
    }

    /// Advance the state machine to `current_tai` and return the snapshot.
    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        self.evaluate_state(current_tai);
        let moving = matches!(
            self.current_state,
            MotionState::Moving | MotionState::Crawling
        );
        let motor_current = if moving { LWSCS_CURRENT_PER_MOTOR } else { 0.0 };
        self.drive_current_actual = [motor_current; LWSCS_NUM_MOTORS];
        self.power_draw = if moving { LWS_POWER_DRAW } else { 0.0 };
        json!({
            "status": {
                "messages": self.messages,
                "status": self.current_state,
                "operationalMode": self.operational_mode,
            },
            "positionActual": self.position_actual,
            "positionCommanded": self.position_commanded,
            "velocityActual": self.velocity_actual,
            "velocityCommanded": self.velocity_commanded,
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

    fn check_not_in_error(&self) -> Result<(), PlantError> {
        if self.current_state == MotionState::Error {
            return Err(PlantError::BadState(
                "screen is in fault; reset drives and exit fault first".into(),
            ));
        }
        Ok(())
    }

    fn begin_motion(&mut self, start_state: MotionState, target_state: MotionState) {
        self.start_state = start_state;
        self.target_state = target_state;
        self.current_state = match self.current_state {
            MotionState::Moving | MotionState::Crawling | MotionState::Stopped => MotionState::Moving,
            _ => MotionState::EnablingMotorPower,
        };
    }

    fn halt(&mut self, start_tai: f64, start_state: MotionState, target_state: MotionState) {
        self.evaluate_motion(start_tai);
        self.command_time_tai = start_tai;
        self.velocity_actual = 0.0;
        self.velocity_commanded = 0.0;
        self.crawl_velocity = 0.0;
        self.motion = ElMotion::Idle;
        self.start_state = start_state;
        self.current_state = MotionState::Stopping;
        self.target_state = target_state;
    }

    fn evaluate_state(&mut self, current_tai: f64) {
        use MotionState as S;
        match self.current_state {
            S::EnablingMotorPower => self.current_state = S::MotorPowerOn,
            S::MotorPowerOn => self.current_state = S::GoNormal,
            S::GoNormal => self.current_state = S::DisengagingBrakes,
            S::DisengagingBrakes => self.current_state = S::BrakesDisengaged,
            S::BrakesDisengaged => {
                self.current_state = S::Moving;
                self.evaluate_motion(current_tai);
            }
            S::Moving | S::Crawling => self.evaluate_motion(current_tai),
            S::Stopping => self.current_state = S::Stopped,
            S::Stopped => {
                if self.target_state == S::Stationary {
                    self.current_state = S::EngagingBrakes;
                }
            }
            S::EngagingBrakes => self.current_state = S::BrakesEngaged,
            S::BrakesEngaged => self.current_state = S::GoStationary,
            S::GoStationary => self.current_state = S::DisablingMotorPower,
            S::DisablingMotorPower => self.current_state = S::MotorPowerOff,
            S::MotorPowerOff => {
                self.current_state = self.target_state;
                self.start_state = self.target_state;
            }
            _ => {}
        }
    }

    fn evaluate_motion(&mut self, current_tai: f64) {
        match self.motion {
            ElMotion::Move { profile, velocity } => {
                let (position, phase) = profile.sample(current_tai);
                self.position_actual = position;
                self.velocity_actual = velocity;
                if phase == MotionPhase::Done {
                    self.velocity_actual = 0.0;
                    self.motion = ElMotion::Idle;
                    if self.current_state == MotionState::Moving {
                        self.current_state = MotionState::Stopped;
                    }
                }
            }
            ElMotion::Crawl(profile) => {
                let (position, in_progress) = profile.sample(current_tai);
                self.position_actual = position;
                self.velocity_actual = profile.velocity();
                if !in_progress {
                    // Clamped at a range end.
                    self.velocity_actual = 0.0;
                    self.motion = ElMotion::Idle;
                    if self.current_state == MotionState::Crawling {
                        self.current_state = MotionState::Stopped;
                    }
                }
            }
            ElMotion::Idle => {}
        }
    }
}
