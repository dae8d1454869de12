//! Capacitor Banks Control System snapshot provider.
//!
//! The capacitor banks are read-only from the bridge's perspective; the
//! snapshot only gets a fresh timestamp.

use serde_json::{json, Value};

use crate::constants::CBCS_NUM_CAPACITOR_BANKS;
use crate::plant::{default_messages, StatusMessage};

#[derive(Debug)]
pub struct Cbcs {
    pub messages: Vec<StatusMessage>,
    pub fuse_intervention: [bool; CBCS_NUM_CAPACITOR_BANKS],
    pub smoke_detected: [bool; CBCS_NUM_CAPACITOR_BANKS],
    pub high_temperature: [bool; CBCS_NUM_CAPACITOR_BANKS],
    pub low_residual_voltage: [bool; CBCS_NUM_CAPACITOR_BANKS],
    pub door_open: [bool; CBCS_NUM_CAPACITOR_BANKS],
    pub dc_bus_voltage: f64,
}

impl Cbcs {
    pub fn new() -> Self {
        Self {
            messages: default_messages(),
            fuse_intervention: [false; CBCS_NUM_CAPACITOR_BANKS],
            smoke_detected: [false; CBCS_NUM_CAPACITOR_BANKS],
            high_temperature: [false; CBCS_NUM_CAPACITOR_BANKS],
            low_residual_voltage: [false; CBCS_NUM_CAPACITOR_BANKS],
            door_open: [false; CBCS_NUM_CAPACITOR_BANKS],
            dc_bus_voltage: 0.0,
        }
    }

    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        json!({
            "status": {
                "messages": self.messages,
            },
            "fuseIntervention": self.fuse_intervention,
            "smokeDetected": self.smoke_detected,
            "highTemperature": self.high_temperature,
            "lowResidualVoltage": self.low_residual_voltage,
            "doorOpen": self.door_open,
            "dcBusVoltage": self.dc_bus_voltage,
            "timestampUTC": current_tai,
        })
    }
}

impl Default for Cbcs {
    fn default() -> Self {
        Self::new()
    }
}
