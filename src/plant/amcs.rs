//! Azimuth Motion Control System state machine.
//!
//! The azimuth drives at its configured `vmax` along the shortest wrap
//! direction, optionally handing over to an endless crawl at the target.
//! Powering the drive train up and down walks through the motor-power,
//! cooling and brake states one transition per evaluation.

use serde_json::{json, Value};

use crate::constants::{
    AMCS_AMAX, AMCS_CURRENT_PER_MOTOR_CRAWLING, AMCS_CURRENT_PER_MOTOR_MOVING, AMCS_JMAX,
    AMCS_NUM_ENCODERS, AMCS_NUM_MOTORS, AMCS_NUM_MOTOR_TEMPERATURES, AMCS_NUM_RESOLVERS,
    AMCS_PARK_POSITION, AMCS_VMAX, FANS_POWER_DRAW,
};
use crate::error::PlantError;
use crate::motion::{AzimuthProfile, CrawlProfile, MotionPhase};
use crate::plant::{default_messages, fault_messages, MotionState, OperationalMode, StatusMessage};
use crate::protocol::OnOff;

use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy)]
enum AzMotion {
    Idle,
    Move(AzimuthProfile),
    Crawl(CrawlProfile),
}

#[derive(Debug)]
pub struct Amcs {
    pub messages: Vec<StatusMessage>,
    pub start_position: f64,
    pub position_actual: f64,
    pub position_commanded: f64,
    pub velocity_actual: f64,
    pub velocity_commanded: f64,
    pub crawl_velocity: f64,
    pub drive_torque_actual: [f64; AMCS_NUM_MOTORS],
    pub drive_torque_commanded: [f64; AMCS_NUM_MOTORS],
    pub drive_current_actual: [f64; AMCS_NUM_MOTORS],
    pub drive_temperature: [f64; AMCS_NUM_MOTOR_TEMPERATURES],
    pub encoder_head_raw: [f64; AMCS_NUM_ENCODERS],
    pub encoder_head_calibrated: [f64; AMCS_NUM_ENCODERS],
    pub resolver_raw: [f64; AMCS_NUM_RESOLVERS],
    pub resolver_calibrated: [f64; AMCS_NUM_RESOLVERS],
    pub power_draw: f64,
    pub jmax: f64,
    pub amax: f64,
    pub vmax: f64,
    pub fans_speed: f64,
    pub seal_inflated: OnOff,
    pub current_state: MotionState,
    pub start_state: MotionState,
    pub target_state: MotionState,
    pub drives_in_error_state: [bool; AMCS_NUM_MOTORS],
    pub operational_mode: OperationalMode,
    /// TAI of the last accepted command [unix s].
    pub command_time_tai: f64,
    pub start_tai: f64,
    motion: AzMotion,
}

impl Amcs {
    pub fn new(start_tai: f64) -> Self {
        Self {
            messages: default_messages(),
            start_position: AMCS_PARK_POSITION,
            position_actual: AMCS_PARK_POSITION,
            position_commanded: AMCS_PARK_POSITION,
            velocity_actual: 0.0,
            velocity_commanded: 0.0,
            crawl_velocity: 0.0,
            drive_torque_actual: [0.0; AMCS_NUM_MOTORS],
            drive_torque_commanded: [0.0; AMCS_NUM_MOTORS],
            drive_current_actual: [0.0; AMCS_NUM_MOTORS],
            drive_temperature: [20.0; AMCS_NUM_MOTOR_TEMPERATURES],
            encoder_head_raw: [0.0; AMCS_NUM_ENCODERS],
            encoder_head_calibrated: [0.0; AMCS_NUM_ENCODERS],
            resolver_raw: [0.0; AMCS_NUM_RESOLVERS],
            resolver_calibrated: [0.0; AMCS_NUM_RESOLVERS],
            power_draw: 0.0,
            jmax: AMCS_JMAX,
            amax: AMCS_AMAX,
            vmax: AMCS_VMAX,
            fans_speed: 0.0,
            seal_inflated: OnOff::Off,
            current_state: MotionState::Parked,
            start_state: MotionState::Parked,
            target_state: MotionState::Parked,
            drives_in_error_state: [false; AMCS_NUM_MOTORS],
            operational_mode: OperationalMode::Normal,
            command_time_tai: start_tai,
            start_tai,
            motion: AzMotion::Idle,
        }
    }

    /// Move to `position` [rad] and crawl at `velocity` [rad/s] once there.
    /// Returns the estimated duration of the move [s].
    pub fn move_az(&mut self, position: f64, velocity: f64, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        if !(0.0..TAU).contains(&position) {
            return Err(PlantError::BadParameters(format!(
                "position {position} is outside [0, 2*pi)"
            )));
        }
        if velocity.abs() > self.vmax {
            return Err(PlantError::BadParameters(format!(
                "crawl velocity {velocity} exceeds vmax {}",
                self.vmax
            )));
        }
        // A new move picks up from the last evaluated position, like the
        // real controller replanning on its own cycle.
        let profile =
            AzimuthProfile::new(self.position_actual, position, self.vmax, velocity, start_tai);
        let duration = profile.duration();
        self.start_position = self.position_actual;
        self.position_commanded = position;
        self.crawl_velocity = velocity;
        self.velocity_commanded = velocity;
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        self.motion = AzMotion::Move(profile);
        self.begin_motion(MotionState::Moving, if velocity == 0.0 {
            MotionState::Stopped
        } else {
            MotionState::Crawling
        });
        Ok(duration)
    }

    /// Crawl indefinitely at `velocity` [rad/s]. A zero velocity stops.
    pub fn crawl_az(&mut self, velocity: f64, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        if velocity.abs() > self.vmax {
            return Err(PlantError::BadParameters(format!(
                "crawl velocity {velocity} exceeds vmax {}",
                self.vmax
            )));
        }
        if velocity == 0.0 {
            return self.stop_az(start_tai);
        }
        self.crawl_velocity = velocity;
        self.velocity_commanded = velocity;
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        self.motion = AzMotion::Crawl(CrawlProfile::wrapping(
            self.position_actual,
            velocity,
            start_tai,
        ));
        self.start_state = MotionState::Moving;
        self.current_state = MotionState::Crawling;
        self.target_state = MotionState::Crawling;
        Ok(0.0)
    }

    /// Stop all azimuth motion without engaging the brakes.
    pub fn stop_az(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.halt(start_tai, MotionState::Stopping, MotionState::Stopped);
        Ok(0.0)
    }

    /// Stop azimuth motion and run the full brake-engage shutdown.
    pub fn go_stationary(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        self.halt(start_tai, MotionState::GoStationary, MotionState::Stationary);
        Ok(0.0)
    }

    /// Move to the park position and shut the drive train down there.
    pub fn park(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        self.check_not_in_error()?;
        let profile = AzimuthProfile::new(
            self.position_actual,
            AMCS_PARK_POSITION,
            self.vmax,
            0.0,
            start_tai,
        );
        let duration = profile.duration();
        self.start_position = self.position_actual;
        self.position_commanded = AMCS_PARK_POSITION;
        self.crawl_velocity = 0.0;
        self.velocity_commanded = 0.0;
        self.command_time_tai = start_tai;
        self.start_tai = start_tai;
        self.motion = AzMotion::Move(profile);
        self.begin_motion(MotionState::Parking, MotionState::Parked);
        Ok(duration)
    }

    /// Take the current position as the new zero. Only legal at rest.
    pub fn set_zero_az(&mut self, start_tai: f64) -> Result<f64, PlantError> {
        if !self.current_state.is_at_rest() {
            return Err(PlantError::BadState(format!(
                "setZeroAz requires the azimuth at rest, not {:?}",
                self.current_state
            )));
        }
        self.command_time_tai = start_tai;
        self.start_position = 0.0;
        self.position_actual = 0.0;
        self.position_commanded = 0.0;
        self.motion = AzMotion::Idle;
        Ok(0.0)
    }

    /// Inflate or deflate the inflatable seal.
    pub fn inflate(&mut self, start_tai: f64, action: OnOff) -> Result<(), PlantError> {
        self.command_time_tai = start_tai;
        self.seal_inflated = action;
        self.current_state = match action {
            OnOff::On => MotionState::Inflating,
            OnOff::Off => MotionState::Deflating,
        };
        Ok(())
    }

    /// Set the fan speed [%]. Running fans draw power from the slip ring.
    pub fn fans(&mut self, start_tai: f64, speed: f64) -> Result<(), PlantError> {
        if !(0.0..=100.0).contains(&speed) {
            return Err(PlantError::BadParameters(format!(
                "fan speed {speed} is outside [0, 100]"
            )));
        }
        self.command_time_tai = start_tai;
        self.fans_speed = speed;
        Ok(())
    }

    /// Reset the drives flagged with 1 in `reset`.
    pub fn reset_drives_az(&mut self, start_tai: f64, reset: &[u8]) -> Result<f64, PlantError> {
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
        self.motion = AzMotion::Idle;
        self.messages = default_messages();
        Ok(())
    }

    /// Force the machine into the fault state with the given drives in
    /// error. Test hook, not reachable over the wire.
    pub fn set_fault(&mut self, start_tai: f64, drives_in_error: &[u8]) {
        self.evaluate_motion(start_tai);
        for (flag, in_error) in self.drives_in_error_state.iter_mut().zip(drives_in_error) {
            *flag = *in_error == 1;
        }
        self.velocity_actual = 0.0;
        self.motion = AzMotion::Idle;
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
        let motor_current = match self.current_state {
            MotionState::Moving => AMCS_CURRENT_PER_MOTOR_MOVING,
            MotionState::Crawling => AMCS_CURRENT_PER_MOTOR_CRAWLING,
            _ => 0.0,
        };
        self.drive_current_actual = [motor_current; AMCS_NUM_MOTORS];
        // The azimuth motors are fed from the fixed part; only the fans
        // load the slip ring.
        self.power_draw = if self.fans_speed > 0.0 {
            FANS_POWER_DRAW
        } else {
            0.0
        };
        json!({
            "status": {
                "messages": self.messages,
                "status": self.current_state,
                "fans": self.fans_speed > 0.0,
                "inflate": self.seal_inflated == OnOff::On,
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
            "resolverRaw": self.resolver_raw,
            "resolverCalibrated": self.resolver_calibrated,
            "appliedConfiguration": {
                "jmax": self.jmax,
                "amax": self.amax,
                "vmax": self.vmax,
            },
            "powerDraw": self.power_draw,
            "timestampUTC": current_tai,
        })
    }

    fn check_not_in_error(&self) -> Result<(), PlantError> {
        if self.current_state == MotionState::Error {
            return Err(PlantError::BadState(
                "azimuth is in fault; reset drives and exit fault first".into(),
            ));
        }
        Ok(())
    }

    /// Enter a new motion: directly if the drive train is powered, else
    /// through the power-up walk.
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
        self.motion = AzMotion::Idle;
        self.start_state = start_state;
        self.current_state = MotionState::Stopping;
        self.target_state = target_state;
    }

    fn evaluate_state(&mut self, current_tai: f64) {
        use MotionState as S;
        match self.current_state {
            S::EnablingMotorPower => self.current_state = S::MotorPowerOn,
            S::MotorPowerOn => self.current_state = S::StartingMotorCooling,
            S::StartingMotorCooling => self.current_state = S::MotorCoolingOn,
            S::MotorCoolingOn => self.current_state = S::GoNormal,
            S::GoNormal => self.current_state = S::DisengagingBrakes,
            S::DisengagingBrakes => self.current_state = S::BrakesDisengaged,
            S::BrakesDisengaged => {
                self.current_state = S::Moving;
                self.evaluate_motion(current_tai);
            }
            S::Moving | S::Crawling => self.evaluate_motion(current_tai),
            S::Stopping => self.current_state = S::Stopped,
            S::Stopped => {
                if matches!(self.target_state, S::Stationary | S::Parked) {
                    self.current_state = S::EngagingBrakes;
                }
            }
            S::EngagingBrakes => self.current_state = S::BrakesEngaged,
            S::BrakesEngaged => self.current_state = S::GoStationary,
            S::GoStationary => self.current_state = S::DisablingMotorPower,
            S::DisablingMotorPower => self.current_state = S::MotorPowerOff,
            S::MotorPowerOff => self.current_state = S::StoppingMotorCooling,
            S::StoppingMotorCooling => self.current_state = S::MotorCoolingOff,
            S::MotorCoolingOff => {
                self.current_state = self.target_state;
                self.start_state = self.target_state;
            }
            S::Inflating => self.current_state = S::Inflated,
            S::Deflating => self.current_state = S::Deflated,
            _ => {}
        }
    }

    fn evaluate_motion(&mut self, current_tai: f64) {
        match self.motion {
            AzMotion::Move(profile) => {
                let (position, velocity, phase) = profile.sample(current_tai);
                self.position_actual = position;
                self.velocity_actual = velocity;
                if phase == MotionPhase::Done {
                    if profile.crawl_velocity() == 0.0 {
                        self.velocity_actual = 0.0;
                        self.motion = AzMotion::Idle;
                        if matches!(self.current_state, MotionState::Moving) {
                            self.current_state = MotionState::Stopped;
                        }
                    } else if matches!(self.current_state, MotionState::Moving) {
                        self.current_state = MotionState::Crawling;
                    }
                }
            }
            AzMotion::Crawl(profile) => {
                let (position, _) = profile.sample(current_tai);
                self.position_actual = position;
                self.velocity_actual = profile.velocity();
            }
            AzMotion::Idle => {}
        }
    }
}
