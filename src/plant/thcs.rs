//! Thermal Control System state machine.
//!
//! A two-state machine (`DISABLED` <-> `ENABLED`) with one-evaluation
//! transients. Cooling is switched by the azimuth drive train: the
//! dispatcher calls [`Thcs::start_cooling`] and [`Thcs::stop_cooling`] when
//! the AMCS reports its motor-cooling status words.

use serde_json::{json, Value};

use crate::constants::{
    THCS_NUM_CABINET_TEMPERATURES, THCS_NUM_MOTOR_COIL_TEMPERATURES,
    THCS_NUM_MOTOR_DRIVE_TEMPERATURES, THCS_NUM_SENSORS,
};
use crate::error::PlantError;
use crate::plant::{default_messages, MotionState, OperationalMode, StatusMessage};

#[derive(Debug)]
pub struct Thcs {
    pub messages: Vec<StatusMessage>,
    pub drive_temperature: [f64; THCS_NUM_MOTOR_DRIVE_TEMPERATURES],
    pub motor_coil_temperature: [f64; THCS_NUM_MOTOR_COIL_TEMPERATURES],
    pub cabinet_temperature: [f64; THCS_NUM_CABINET_TEMPERATURES],
    /// Flat sensor array of the legacy telemetry schema.
    pub temperature: [f64; THCS_NUM_SENSORS],
    pub current_state: MotionState,
    pub target_state: MotionState,
    pub operational_mode: OperationalMode,
    pub command_time_tai: f64,
    /// Emit the legacy flat `temperature` array instead of the split
    /// drive/motor-coil/cabinet arrays.
    legacy_schema: bool,
}

impl Thcs {
    pub fn new(legacy_schema: bool) -> Self {
        Self {
            messages: default_messages(),
            drive_temperature: [0.0; THCS_NUM_MOTOR_DRIVE_TEMPERATURES],
            motor_coil_temperature: [0.0; THCS_NUM_MOTOR_COIL_TEMPERATURES],
            cabinet_temperature: [0.0; THCS_NUM_CABINET_TEMPERATURES],
            temperature: [0.0; THCS_NUM_SENSORS],
            current_state: MotionState::Disabled,
            target_state: MotionState::Disabled,
            operational_mode: OperationalMode::Normal,
            command_time_tai: 0.0,
            legacy_schema,
        }
    }

    /// Stamp every temperature sensor with the preferred temperature
    /// [deg C].
    pub fn set_temperature(&mut self, temperature: f64, current_tai: f64) -> Result<(), PlantError> {
        self.command_time_tai = current_tai;
        self.drive_temperature = [temperature; THCS_NUM_MOTOR_DRIVE_TEMPERATURES];
        self.motor_coil_temperature = [temperature; THCS_NUM_MOTOR_COIL_TEMPERATURES];
        self.cabinet_temperature = [temperature; THCS_NUM_CABINET_TEMPERATURES];
        self.temperature = [temperature; THCS_NUM_SENSORS];
        Ok(())
    }

    pub fn start_cooling(&mut self, current_tai: f64) {
        self.command_time_tai = current_tai;
        self.target_state = MotionState::Enabled;
    }

    pub fn stop_cooling(&mut self, current_tai: f64) {
        self.command_time_tai = current_tai;
        self.target_state = MotionState::Disabled;
    }

    pub fn exit_fault(&mut self) {
        self.current_state = MotionState::Stationary;
    }

    pub fn set_normal(&mut self) {
        self.operational_mode = OperationalMode::Normal;
    }

    pub fn set_degraded(&mut self) {
        self.operational_mode = OperationalMode::Degraded;
    }

    /// Advance the machine one transition and return the snapshot.
    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        self.evaluate_state();
        let mut status = json!({
            "status": {
                "messages": self.messages,
                "status": self.current_state,
                "operationalMode": self.operational_mode,
            },
            "timestampUTC": current_tai,
        });
        let map = status.as_object_mut().expect("status is an object");
        if self.legacy_schema {
            map.insert("temperature".into(), json!(self.temperature));
        } else {
            map.insert("driveTemperature".into(), json!(self.drive_temperature));
            map.insert(
                "motorCoilTemperature".into(),
                json!(self.motor_coil_temperature),
            );
            map.insert("cabinetTemperature".into(), json!(self.cabinet_temperature));
        }
        status
    }

    fn evaluate_state(&mut self) {
        use MotionState as S;
        match self.target_state {
            S::Enabled => match self.current_state {
                S::Disabled => self.current_state = S::Enabling,
                S::Enabling => self.current_state = S::Enabled,
                _ => {}
            },
            S::Disabled => match self.current_state {
                S::Enabled => self.current_state = S::Disabling,
                S::Disabling => self.current_state = S::Disabled,
                _ => {}
            },
            _ => {}
        }
    }
}
