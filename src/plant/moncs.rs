//! Monitoring Control System snapshot provider, interfacing with the dome
//! interlock sensors. Read-only; state does not evolve over time.

use serde_json::{json, Value};

use crate::constants::MON_NUM_SENSORS;
use crate::plant::{default_messages, MotionState, OperationalMode, StatusMessage};

#[derive(Debug)]
pub struct Moncs {
    pub messages: Vec<StatusMessage>,
    pub status: MotionState,
    pub data: [f64; MON_NUM_SENSORS],
    pub operational_mode: OperationalMode,
}

impl Moncs {
    pub fn new() -> Self {
        Self {
            messages: default_messages(),
            status: MotionState::Closed,
            data: [0.0; MON_NUM_SENSORS],
            operational_mode: OperationalMode::Normal,
        }
    }

    pub fn set_normal(&mut self) {
        self.operational_mode = OperationalMode::Normal;
    }

    pub fn set_degraded(&mut self) {
        self.operational_mode = OperationalMode::Degraded;
    }

    pub fn determine_status(&mut self, current_tai: f64) -> Value {
        json!({
            "status": {
                "messages": self.messages,
                "status": self.status,
                "operationalMode": self.operational_mode,
            },
            "data": self.data,
            "timestampUTC": current_tai,
        })
    }
}

impl Default for Moncs {
    fn default() -> Self {
        Self::new()
    }
}
