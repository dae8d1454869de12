//! The dome bridge: a stateful TCP client multiplexing user operations and
//! periodic status polls onto one ordered connection.
//!
//! All sends and reply reads happen under one serialization lock, so at
//! most one command is in flight at any time. Replies are correlated by
//! command id; commands that never get one are swept by a watchdog. A
//! periodic poller requests status per subsystem at its own cadence and
//! publishes shaped snapshots to the registered telemetry callbacks.
//!
//! Telemetry callbacks run inside the polling task and must not call back
//! into the bridge; use [`DomeBridge::latest_status`] for lock-free reads
//! of the last seen telemetry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::constants::{
    AMCS_NUM_MOTORS, APSCS_NUM_MOTORS, COMMANDS_REPLIED_PERIOD, COMMAND_QUEUE_PERIOD,
    COMMAND_REPLY_TIMEOUT, DOME_AZIMUTH_OFFSET, FANS_POWER_DRAW, STATUS_POKE_PERIOD,
};
use crate::error::DomeError;
use crate::framing::{read_frame, write_frame};
use crate::limits::MotionLimits;
use crate::plant::server::current_tai;
use crate::plant::{MockPlant, OperationalMode, PlantOptions};
use crate::protocol::{
    CommandFrame, CommandName, ConfigField, LlcName, OnOff, ReplyHeader, ResponseCode, SubSystemId,
};
use crate::scheduler::{PowerManagementMode, PowerScheduler, ScheduledCommand};
use crate::telemetry::preprocess_status;

/// Timeout for establishing the TCP connection [s].
const CONNECT_TIMEOUT: f64 = 20.0;

/// How the bridge reaches a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Talk to the real controller at the configured host and port.
    Normal,
    /// Spawn an in-process [`MockPlant`] and talk to it.
    SimulationWithPlant,
    /// Talk to an externally started simulator on localhost.
    SimulationWithoutPlant,
}

/// Connection configuration handed in by the enclosing service.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub simulation_mode: SimulationMode,
}

/// Per-subsystem telemetry sink. Invoked from the polling task with either
/// a shaped snapshot or, on communication errors, an error report of the
/// form `{command_name, exception, response_code}`.
pub type TelemetryCallback = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Extra knobs, mostly for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeOptions {
    /// Skip starting the periodic tasks on connect.
    pub suppress_periodic_tasks: bool,
    /// Options passed through to a spawned [`MockPlant`].
    pub plant_options: PlantOptions,
}

/// The send time of a command still waiting for its reply.
#[derive(Debug, Clone, Copy)]
struct CommandTime {
    command: CommandName,
    tai: f64,
}

struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// State shared with the periodic tasks.
///
/// Lock order: `link` before `has_non_status_command`; the std mutexes are
/// leaf locks and are never held across an await.
struct BridgeShared {
    link: Mutex<Option<Link>>,
    has_non_status_command: Mutex<bool>,
    next_command_id: AtomicU64,
    outstanding: std::sync::Mutex<HashMap<u64, CommandTime>>,
    latest_status: std::sync::Mutex<HashMap<LlcName, Map<String, Value>>>,
    communication_error_report: std::sync::Mutex<Map<String, Value>>,
    callbacks: HashMap<LlcName, TelemetryCallback>,
    scheduler: std::sync::Mutex<PowerScheduler>,
}

/// TCP interface to the dome controller.
pub struct DomeBridge {
    config: BridgeConfig,
    options: BridgeOptions,
    shared: Arc<BridgeShared>,
    plant: Option<MockPlant>,
    periodic_tasks: Vec<JoinHandle<()>>,
    /// Operational-mode commands per subsystem; restricted to the
    /// commissioned subset outside simulation.
    operational_mode_commands: HashMap<SubSystemId, (CommandName, CommandName)>,
}

impl DomeBridge {
    pub fn new(config: BridgeConfig, callbacks: HashMap<LlcName, TelemetryCallback>) -> Self {
        Self::with_options(config, callbacks, BridgeOptions::default())
    }

    pub fn with_options(
        config: BridgeConfig,
        callbacks: HashMap<LlcName, TelemetryCallback>,
        options: BridgeOptions,
    ) -> Self {
        // (normal, degraded) command per subsystem. During commissioning
        // only the azimuth and the shutters accept mode changes.
        let mut operational_mode_commands = HashMap::from([
            (
                SubSystemId::AMCS,
                (CommandName::SetNormalAz, CommandName::SetDegradedAz),
            ),
            (
                SubSystemId::APSCS,
                (CommandName::SetNormalShutter, CommandName::SetDegradedShutter),
            ),
        ]);
        if config.simulation_mode != SimulationMode::Normal {
            operational_mode_commands.extend([
                (
                    SubSystemId::LWSCS,
                    (CommandName::SetNormalEl, CommandName::SetDegradedEl),
                ),
                (
                    SubSystemId::LCS,
                    (CommandName::SetNormalLouvers, CommandName::SetDegradedLouvers),
                ),
                (
                    SubSystemId::MONCS,
                    (
                        CommandName::SetNormalMonitoring,
                        CommandName::SetDegradedMonitoring,
                    ),
                ),
                (
                    SubSystemId::THCS,
                    (CommandName::SetNormalThermal, CommandName::SetDegradedThermal),
                ),
            ]);
        }
        Self {
            config,
            options,
            shared: Arc::new(BridgeShared {
                link: Mutex::new(None),
                has_non_status_command: Mutex::new(false),
                next_command_id: AtomicU64::new(1),
                outstanding: std::sync::Mutex::new(HashMap::new()),
                latest_status: std::sync::Mutex::new(HashMap::new()),
                communication_error_report: std::sync::Mutex::new(Map::new()),
                callbacks,
                scheduler: std::sync::Mutex::new(PowerScheduler::new()),
            }),
            plant: None,
            periodic_tasks: Vec::new(),
            operational_mode_commands,
        }
    }

    pub async fn connected(&self) -> bool {
        self.shared.link.lock().await.is_some()
    }

    /// Connect to the controller; in simulation, spawn the plant first.
    pub async fn connect(&mut self) -> Result<(), DomeError> {
        if self.connected().await {
            return Err(DomeError::AlreadyConnected);
        }
        let (host, port) = match self.config.simulation_mode {
            SimulationMode::SimulationWithPlant => {
                let plant = MockPlant::start(0, self.options.plant_options).await?;
                let port = plant.port();
                self.plant = Some(plant);
                ("127.0.0.1".to_string(), port)
            }
            SimulationMode::SimulationWithoutPlant => ("127.0.0.1".to_string(), self.config.port),
            SimulationMode::Normal => (self.config.host.clone(), self.config.port),
        };
        info!(%host, port, "connecting to the dome controller");
        let stream = timeout(
            Duration::from_secs_f64(CONNECT_TIMEOUT),
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| DomeError::NotConnected)??;
        let (read_half, write_half) = stream.into_split();
        *self.shared.link.lock().await = Some(Link {
            reader: BufReader::new(read_half),
            writer: write_half,
        });
        if !self.options.suppress_periodic_tasks {
            self.start_periodic_tasks();
        }
        info!("connected");
        Ok(())
    }

    /// Cancel the periodic tasks, close the connection and shut down the
    /// plant if one was spawned.
    pub async fn disconnect(&mut self) {
        info!("disconnecting");
        for task in self.periodic_tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        *self.shared.link.lock().await = None;
        if let Some(plant) = self.plant.take() {
            plant.stop().await;
        }
    }

    /// The spawned simulator, when running in [`SimulationMode::SimulationWithPlant`].
    pub fn plant(&self) -> Option<&MockPlant> {
        self.plant.as_ref()
    }

    /// The last shaped snapshot seen per subsystem. Never blocks on the
    /// link; safe to call from telemetry callbacks.
    pub fn latest_status(&self) -> HashMap<LlcName, Map<String, Value>> {
        self.shared.latest_status.lock().expect("status lock").clone()
    }

    /// The latest communication-error report, empty when the last command
    /// succeeded.
    pub fn communication_error_report(&self) -> Map<String, Value> {
        self.shared
            .communication_error_report
            .lock()
            .expect("report lock")
            .clone()
    }

    // Azimuth operations.

    /// Move the dome to `position` [deg, sky coordinates] and crawl at
    /// `velocity` [deg/s] once there.
    pub async fn move_az(&self, position: f64, velocity: f64) -> Result<(), DomeError> {
        debug!(position, velocity, "move_az");
        let dome_position = (position + DOME_AZIMUTH_OFFSET).rem_euclid(360.0);
        let params = params([
            ("position", json!(dome_position.to_radians())),
            ("velocity", json!(velocity.to_radians())),
        ]);
        self.shared
            .send_command(CommandName::MoveAz, params)
            .await?;
        Ok(())
    }

    /// Crawl the dome at `velocity` [deg/s].
    pub async fn crawl_az(&self, velocity: f64) -> Result<(), DomeError> {
        debug!(velocity, "crawl_az");
        let params = params([("velocity", json!(velocity.to_radians()))]);
        self.shared
            .send_command(CommandName::CrawlAz, params)
            .await?;
        Ok(())
    }

    /// Stop azimuth motion; `engage_brakes` runs the full stationary
    /// sequence instead.
    pub async fn stop_az(&self, engage_brakes: bool) -> Result<(), DomeError> {
        let command = if engage_brakes {
            CommandName::GoStationaryAz
        } else {
            CommandName::StopAz
        };
        self.shared.send_command(command, Map::new()).await?;
        Ok(())
    }

    /// Park the dome.
    pub async fn park(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::Park, Map::new())
            .await?;
        Ok(())
    }

    /// Take the current azimuth as the new zero.
    pub async fn set_zero_az(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::SetZeroAz, Map::new())
            .await?;
        Ok(())
    }

    /// Inflate or deflate the inflatable seal.
    pub async fn inflate(&self, action: OnOff) -> Result<(), DomeError> {
        let params = params([("action", serde_json::to_value(action)?)]);
        self.shared
            .send_command(CommandName::Inflate, params)
            .await?;
        Ok(())
    }

    /// Set the fan speed [%]. Subject to power management.
    pub async fn fans(&self, speed: f64) -> Result<(), DomeError> {
        let params = params([("speed", json!(speed))]);
        self.schedule_or_send(CommandName::Fans, params).await
    }

    // Elevation / windscreen operations.

    /// Move the windscreen to `position` [deg]. Subject to power
    /// management.
    pub async fn move_el(&self, position: f64) -> Result<(), DomeError> {
        debug!(position, "move_el");
        let params = params([("position", json!(position.to_radians()))]);
        self.schedule_or_send(CommandName::MoveEl, params).await
    }

    /// Crawl the windscreen at `velocity` [deg/s]. Subject to power
    /// management.
    pub async fn crawl_el(&self, velocity: f64) -> Result<(), DomeError> {
        debug!(velocity, "crawl_el");
        let params = params([("velocity", json!(velocity.to_radians()))]);
        self.schedule_or_send(CommandName::CrawlEl, params).await
    }

    /// Stop windscreen motion, optionally engaging the brakes.
    pub async fn stop_el(&self, engage_brakes: bool) -> Result<(), DomeError> {
        let command = if engage_brakes {
            CommandName::GoStationaryEl
        } else {
            CommandName::StopEl
        };
        self.shared.send_command(command, Map::new()).await?;
        Ok(())
    }

    // Shutter operations.

    /// Open the aperture shutters. Subject to power management.
    pub async fn open_shutter(&self) -> Result<(), DomeError> {
        self.schedule_or_send(CommandName::OpenShutter, Map::new())
            .await
    }

    /// Close the aperture shutters. Subject to power management.
    pub async fn close_shutter(&self) -> Result<(), DomeError> {
        self.schedule_or_send(CommandName::CloseShutter, Map::new())
            .await
    }

    /// Stop shutter motion, optionally engaging the brakes.
    pub async fn stop_shutter(&self, engage_brakes: bool) -> Result<(), DomeError> {
        let command = if engage_brakes {
            CommandName::GoStationaryShutter
        } else {
            CommandName::StopShutter
        };
        self.shared.send_command(command, Map::new()).await?;
        Ok(())
    }

    /// Home the shutters. Only the APSCS supports homing; other masked
    /// subsystems are logged and skipped.
    pub async fn home(&self, sub_system_ids: SubSystemId) -> Result<(), DomeError> {
        for id in sub_system_ids.iter() {
            if id == SubSystemId::APSCS {
                self.schedule_or_send(CommandName::Home, Map::new()).await?;
            } else {
                warn!(?id, "subsystem cannot be homed, ignoring");
            }
        }
        Ok(())
    }

    // Louver operations.

    /// Set per-louver positions [%]; -1 leaves a louver unchanged. Subject
    /// to power management.
    pub async fn set_louvers(&self, position: &[f64]) -> Result<(), DomeError> {
        debug!(?position, "set_louvers");
        let params = params([("position", json!(position))]);
        self.schedule_or_send(CommandName::SetLouvers, params).await
    }

    /// Close all louvers. Subject to power management.
    pub async fn close_louvers(&self) -> Result<(), DomeError> {
        self.schedule_or_send(CommandName::CloseLouvers, Map::new())
            .await
    }

    /// Stop louver motion, optionally engaging the brakes.
    pub async fn stop_louvers(&self, engage_brakes: bool) -> Result<(), DomeError> {
        let command = if engage_brakes {
            CommandName::GoStationaryLouvers
        } else {
            CommandName::StopLouvers
        };
        self.shared.send_command(command, Map::new()).await?;
        Ok(())
    }

    /// Stop every masked subsystem, optionally engaging the brakes.
    pub async fn stop_sub_systems(
        &self,
        sub_system_ids: SubSystemId,
        engage_brakes: bool,
    ) -> Result<(), DomeError> {
        for id in sub_system_ids.iter() {
            if id == SubSystemId::AMCS {
                self.stop_az(engage_brakes).await?;
            } else if id == SubSystemId::LWSCS {
                self.stop_el(engage_brakes).await?;
            } else if id == SubSystemId::APSCS {
                self.stop_shutter(engage_brakes).await?;
            } else if id == SubSystemId::LCS {
                self.stop_louvers(engage_brakes).await?;
            } else {
                warn!(?id, "subsystem has no stop command, ignoring");
            }
        }
        Ok(())
    }

    // Thermal operations.

    /// Set the preferred dome temperature [deg C].
    pub async fn set_temperature(&self, temperature: f64) -> Result<(), DomeError> {
        let params = params([("temperature", json!(temperature))]);
        self.shared
            .send_command(CommandName::SetTemperature, params)
            .await?;
        Ok(())
    }

    // Fault recovery.

    /// Clear the fault state of every masked subsystem. For the azimuth
    /// and the shutters an unconditional drive reset is sent first, so
    /// operators need not remember to.
    pub async fn exit_fault(&self, sub_system_ids: SubSystemId) -> Result<(), DomeError> {
        for id in sub_system_ids.iter() {
            if id == SubSystemId::AMCS {
                self.exit_fault_az().await?;
            } else if id == SubSystemId::APSCS {
                self.exit_fault_shutter().await?;
            } else if id == SubSystemId::LCS {
                self.exit_fault_louvers().await?;
            } else if id == SubSystemId::LWSCS {
                self.exit_fault_el().await?;
            } else if id == SubSystemId::THCS {
                self.exit_fault_thermal().await?;
            } else {
                warn!(?id, "subsystem has no fault state, ignoring");
            }
        }
        Ok(())
    }

    pub async fn exit_fault_az(&self) -> Result<(), DomeError> {
        self.reset_drives_az(&[1; AMCS_NUM_MOTORS]).await?;
        self.shared
            .send_command(CommandName::ExitFaultAz, Map::new())
            .await?;
        Ok(())
    }

    pub async fn exit_fault_shutter(&self) -> Result<(), DomeError> {
        self.reset_drives_shutter(&[1; APSCS_NUM_MOTORS]).await?;
        self.shared
            .send_command(CommandName::ExitFaultShutter, Map::new())
            .await?;
        Ok(())
    }

    pub async fn exit_fault_louvers(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::ExitFaultLouvers, Map::new())
            .await?;
        Ok(())
    }

    pub async fn exit_fault_el(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::ExitFaultEl, Map::new())
            .await?;
        Ok(())
    }

    pub async fn exit_fault_thermal(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::ExitFaultThermal, Map::new())
            .await?;
        Ok(())
    }

    /// Reset azimuth drives; 1 resets the drive at that index.
    pub async fn reset_drives_az(&self, reset: &[u8]) -> Result<(), DomeError> {
        debug!(?reset, "reset_drives_az");
        let params = params([("reset", json!(reset))]);
        self.shared
            .send_command(CommandName::ResetDrivesAz, params)
            .await?;
        Ok(())
    }

    /// Reset shutter drives; 1 resets the drive at that index.
    pub async fn reset_drives_shutter(&self, reset: &[u8]) -> Result<(), DomeError> {
        debug!(?reset, "reset_drives_shutter");
        let params = params([("reset", json!(reset))]);
        self.shared
            .send_command(CommandName::ResetDrivesShutter, params)
            .await?;
        Ok(())
    }

    // Modes and configuration.

    /// Put every masked subsystem into normal or degraded operation, where
    /// it supports that.
    pub async fn set_operational_mode(
        &self,
        operational_mode: OperationalMode,
        sub_system_ids: SubSystemId,
    ) -> Result<(), DomeError> {
        debug!(?operational_mode, "set_operational_mode");
        for id in sub_system_ids.iter() {
            let Some(&(normal, degraded)) = self.operational_mode_commands.get(&id) else {
                warn!(?id, "subsystem has no operational mode commands, ignoring");
                continue;
            };
            let command = match operational_mode {
                OperationalMode::Normal => normal,
                OperationalMode::Degraded => degraded,
            };
            self.shared.send_command(command, Map::new()).await?;
        }
        Ok(())
    }

    /// Validate and send motion-limit configuration for the AMCS or LWSCS.
    /// Values are given in deg/s^n and converted to rad/s^n on the wire.
    pub async fn config_llcs(
        &self,
        system: LlcName,
        settings: &[ConfigField],
    ) -> Result<(), DomeError> {
        debug!(%system, ?settings, "config_llcs");
        let limits = match system {
            LlcName::Amcs => MotionLimits::AMCS,
            LlcName::Lwscs => MotionLimits::LWSCS,
            other => {
                return Err(DomeError::BadParameters(
                    CommandName::Config,
                    format!("subsystem {other} is not configurable"),
                ))
            }
        };
        let validated = limits.validate(settings)?;
        let params = params([
            ("system", json!(system)),
            ("settings", serde_json::to_value(validated)?),
        ]);
        self.shared
            .send_command(CommandName::Config, params)
            .await?;
        Ok(())
    }

    /// Restore the controller's default configuration.
    pub async fn restore_llcs(&self) -> Result<(), DomeError> {
        self.shared
            .send_command(CommandName::Restore, Map::new())
            .await?;
        Ok(())
    }

    /// Select the power management policy. Switching discards any queued
    /// commands; switching back to `NoPowerManagement` is refused.
    pub fn set_power_management_mode(&self, mode: PowerManagementMode) {
        let mut scheduler = self.shared.scheduler.lock().expect("scheduler lock");
        if mode == PowerManagementMode::NoPowerManagement {
            warn!("will not set the power management mode back to NoPowerManagement");
        } else if mode == scheduler.mode() {
            warn!("new power management mode equals the current one, ignoring");
        } else {
            scheduler.set_mode(mode);
        }
    }

    pub fn power_management_mode(&self) -> PowerManagementMode {
        self.shared.scheduler.lock().expect("scheduler lock").mode()
    }

    /// Request one subsystem status immediately and publish it to the
    /// registered callback.
    pub async fn request_llc_status(&self, llc_name: LlcName) -> Result<(), DomeError> {
        self.shared.request_llc_status(llc_name).await;
        Ok(())
    }

    /// Route a command through the power scheduler when power management
    /// is active, else send it immediately.
    async fn schedule_or_send(
        &self,
        command: CommandName,
        command_params: Map<String, Value>,
    ) -> Result<(), DomeError> {
        self.shared.schedule_or_send(command, command_params).await
    }

    fn start_periodic_tasks(&mut self) {
        let registered: Vec<LlcName> = LlcName::ALL
            .into_iter()
            .filter(|llc| self.shared.callbacks.contains_key(llc))
            .collect();
        self.periodic_tasks.push(tokio::spawn(status_poll_task(
            Arc::clone(&self.shared),
            registered,
        )));
        self.periodic_tasks
            .push(tokio::spawn(watchdog_task(Arc::clone(&self.shared))));
        self.periodic_tasks
            .push(tokio::spawn(command_queue_task(Arc::clone(&self.shared))));
    }
}

impl BridgeShared {
    /// Flag a user command and send it. The status poller yields its slot
    /// while the flag is up, so status traffic cannot starve operations on
    /// a slow link.
    async fn send_command(
        &self,
        command: CommandName,
        command_params: Map<String, Value>,
    ) -> Result<Value, DomeError> {
        if !command.is_status() {
            *self.has_non_status_command.lock().await = true;
        }
        self.write_then_read_reply(command, command_params).await
    }

    async fn schedule_or_send(
        &self,
        command: CommandName,
        command_params: Map<String, Value>,
    ) -> Result<(), DomeError> {
        let mode = self.scheduler.lock().expect("scheduler lock").mode();
        if mode == PowerManagementMode::NoPowerManagement {
            self.send_command(command, command_params).await?;
            return Ok(());
        }
        self.scheduler
            .lock()
            .expect("scheduler lock")
            .schedule(ScheduledCommand::with_params(command, command_params))
            .map_err(|_| DomeError::QueueFull)
    }

    /// Write one command and read its reply under the serialization lock.
    async fn write_then_read_reply(
        &self,
        command: CommandName,
        command_params: Map<String, Value>,
    ) -> Result<Value, DomeError> {
        let command_id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        self.outstanding.lock().expect("outstanding lock").insert(
            command_id,
            CommandTime {
                command,
                tai: current_tai(),
            },
        );
        let frame = CommandFrame {
            command_id,
            command: command.as_wire_name().to_string(),
            parameters: command_params,
        };

        let mut link_guard = self.link.lock().await;
        if !command.is_status() {
            // The flagged command is now being transmitted.
            *self.has_non_status_command.lock().await = false;
        }
        let link = link_guard.as_mut().ok_or(DomeError::NotConnected)?;

        debug!(%command, command_id, "sending");
        write_frame(&mut link.writer, &frame).await?;
        let reply = match timeout(
            Duration::from_secs_f64(COMMAND_REPLY_TIMEOUT),
            read_frame(&mut link.reader),
        )
        .await
        {
            Err(_) => {
                // The outstanding entry stays behind for the watchdog.
                self.record_error_report(command, "reply timed out", ResponseCode::Unsupported);
                return Err(DomeError::ReplyTimeout(command));
            }
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => {
                self.record_error_report(command, "connection closed", ResponseCode::Unsupported);
                return Err(DomeError::NotConnected);
            }
            Ok(Err(e)) => return Err(e),
        };
        debug!(%command, %reply, "received");

        let header: ReplyHeader = serde_json::from_value(reply.clone())
            .map_err(|e| DomeError::MalformedReply(format!("{e}")))?;
        {
            let mut outstanding = self.outstanding.lock().expect("outstanding lock");
            if outstanding.remove(&header.command_id).is_none() {
                warn!(command_id = header.command_id, "ignoring unknown commandId");
            }
        }

        let code = ResponseCode::from_wire(header.response).ok_or_else(|| {
            DomeError::MalformedReply(format!("unknown response code {}", header.response))
        })?;
        if code != ResponseCode::Ok {
            let error = DomeError::from_response_code(code, command);
            self.record_error_report(command, &error.to_string(), code);
            return Err(error);
        }
        self.communication_error_report
            .lock()
            .expect("report lock")
            .clear();
        Ok(reply)
    }

    fn record_error_report(&self, command: CommandName, exception: &str, code: ResponseCode) {
        let mut report = self
            .communication_error_report
            .lock()
            .expect("report lock");
        report.clear();
        report.insert("command_name".into(), json!(command.as_wire_name()));
        report.insert("exception".into(), json!(exception));
        report.insert("response_code".into(), json!(code.as_wire()));
    }

    /// Request, shape, store and publish one subsystem status.
    async fn request_llc_status(&self, llc_name: LlcName) {
        let Some(callback) = self.callbacks.get(&llc_name) else {
            return;
        };
        let reply = match self
            .write_then_read_reply(llc_name.status_command(), Map::new())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%llc_name, error = %e, "status request failed");
                let report = self
                    .communication_error_report
                    .lock()
                    .expect("report lock")
                    .clone();
                callback(&report);
                return;
            }
        };
        let Some(snapshot) = reply.get(llc_name.as_wire_name()).and_then(Value::as_object)
        else {
            error!(%llc_name, "status reply carries no snapshot");
            return;
        };
        let mut processed = preprocess_status(llc_name, snapshot);
        // The capacitor banks report no meaningful time.
        if llc_name == LlcName::Cbcs {
            processed.remove("timestamp");
        }
        self.latest_status
            .lock()
            .expect("status lock")
            .insert(llc_name, processed.clone());
        callback(&processed);
    }

    /// Current draw on the slip ring per subsystem, from the latest
    /// telemetry. The azimuth motors are fed from the fixed part, so the
    /// AMCS contributes only its fans.
    fn current_power_draw(&self) -> HashMap<LlcName, f64> {
        let latest = self.latest_status.lock().expect("status lock");
        let mut draw = HashMap::new();
        for (llc_name, status) in latest.iter() {
            if *llc_name == LlcName::Amcs {
                let fans_on = status
                    .get("status")
                    .and_then(|s| s.get("fans"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                draw.insert(*llc_name, if fans_on { FANS_POWER_DRAW } else { 0.0 });
            } else if let Some(power) = status.get("powerDraw").and_then(Value::as_f64) {
                draw.insert(*llc_name, power);
            }
        }
        draw
    }
}

/// Poll subsystem statuses, each at its own multiple of the base period.
async fn status_poll_task(shared: Arc<BridgeShared>, registered: Vec<LlcName>) {
    let mut ticker = interval(Duration::from_secs_f64(STATUS_POKE_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut counts: HashMap<LlcName, u32> = registered.iter().map(|llc| (*llc, 0)).collect();
    loop {
        ticker.tick().await;
        for llc_name in &registered {
            // A pending user command gets the link first.
            if *shared.has_non_status_command.lock().await {
                break;
            }
            let count = counts.get_mut(llc_name).expect("registered llc");
            *count += 1;
            if *count >= status_poke_multiplier(*llc_name) {
                *count = 0;
                shared.request_llc_status(*llc_name).await;
            }
        }
    }
}

/// Ticks of [`STATUS_POKE_PERIOD`] between polls of one subsystem. The
/// azimuth is polled most often.
fn status_poke_multiplier(llc_name: LlcName) -> u32 {
    match llc_name {
        LlcName::Amcs => 2,
        _ => 5,
    }
}

/// Sweep the outstanding-command table: warn after one period without a
/// reply, drop with an error after two.
async fn watchdog_task(shared: Arc<BridgeShared>) {
    let mut ticker = interval(Duration::from_secs_f64(COMMANDS_REPLIED_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately and would sweep nothing.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let now = current_tai();
        let mut still_waiting = Vec::new();
        let mut given_up = Vec::new();
        {
            let mut outstanding = shared.outstanding.lock().expect("outstanding lock");
            outstanding.retain(|&command_id, entry| {
                let age = now - entry.tai;
                if age >= 2.0 * COMMANDS_REPLIED_PERIOD {
                    given_up.push((command_id, entry.command));
                    false
                } else {
                    if age >= COMMANDS_REPLIED_PERIOD {
                        still_waiting.push((command_id, entry.command));
                    }
                    true
                }
            });
        }
        if !still_waiting.is_empty() {
            warn!(?still_waiting, "still waiting for replies");
        }
        if !given_up.is_empty() {
            error!(?given_up, "giving up waiting for replies");
        }
    }
}

/// Release queued power-management commands as budget allows.
async fn command_queue_task(shared: Arc<BridgeShared>) {
    let mut ticker = interval(Duration::from_secs_f64(COMMAND_QUEUE_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let mode = shared.scheduler.lock().expect("scheduler lock").mode();
        if mode == PowerManagementMode::NoPowerManagement {
            continue;
        }
        let draw = shared.current_power_draw();
        let next = shared
            .scheduler
            .lock()
            .expect("scheduler lock")
            .next_command(&draw);
        if let Some(scheduled) = next {
            if let Err(e) = shared.send_command(scheduled.command, scheduled.params).await {
                warn!(command = %scheduled.command, error = %e, "queued command failed");
            }
        }
    }
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
