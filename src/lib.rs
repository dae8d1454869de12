//! # Dome Controller Bridge
//!
//! Control-and-simulation core of a telescope-dome controller bridge. The
//! bridge speaks a line-oriented JSON command protocol over a single TCP
//! connection to the dome controller and exposes typed operations for
//! moving the dome, the windscreen, the aperture shutters and the louvers,
//! plus thermal control, fault recovery, configuration and telemetry
//! subscription.
//!
//! ## Features
//!
//! - **Command dispatch & telemetry pump**: one ordered connection, reply
//!   correlation by command id, per-subsystem poll cadences, unit and
//!   offset translation
//! - **Power-aware command scheduling**: a priority queue that admits
//!   power-drawing commands only while the slip-ring budget holds
//! - **In-process plant simulator**: one state machine per motorized
//!   subsystem with motion profiles, brake sequencing and fault injection
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use domebus::bridge::{BridgeConfig, DomeBridge, SimulationMode};
//!
//! # async fn run() -> Result<(), domebus::error::DomeError> {
//! let config = BridgeConfig {
//!     host: "127.0.0.1".to_string(),
//!     port: 0,
//!     simulation_mode: SimulationMode::SimulationWithPlant,
//! };
//! let mut bridge = DomeBridge::new(config, HashMap::new());
//! bridge.connect().await?;
//! bridge.move_az(90.0, 0.0).await?;
//! bridge.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`bridge`] - dispatcher, reply correlator and telemetry pump
//! - [`scheduler`] - power-aware command scheduler
//! - [`plant`] - per-subsystem state machines and the mock controller
//! - [`protocol`] - wire command names, response codes and envelopes
//! - [`motion`] - kinematic profiles
//! - [`framing`] - newline-delimited JSON over TCP
//! - [`limits`] - motion-limit configuration validation
//! - [`telemetry`] - inbound snapshot shaping

pub mod bridge;
pub mod constants;
pub mod error;
pub mod framing;
pub mod limits;
pub mod motion;
pub mod plant;
pub mod protocol;
pub mod scheduler;
pub mod telemetry;

// Re-export the main public types for convenience.
pub use bridge::{BridgeConfig, DomeBridge, SimulationMode, TelemetryCallback};
pub use error::DomeError;
pub use plant::{MockPlant, MotionState, OperationalMode};
pub use protocol::{CommandName, LlcName, ResponseCode, SubSystemId};
pub use scheduler::{PowerManagementMode, PowerScheduler, ScheduledCommand};
