//! The mock dome controller: a one-client TCP server that dispatches
//! line-JSON commands onto the subsystem state machines.
//!
//! Malformed frames are logged and dropped. Test hooks can slow the
//! network down, swallow commands entirely, or fail every command headed
//! for the rotating part.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{DomeError, PlantError};
use crate::framing::{read_frame, write_frame};
use crate::plant::{Amcs, Apscs, Cbcs, Cscs, Lcs, Lwscs, Moncs, Rad, Thcs};
use crate::plant::MotionState;
use crate::protocol::{
    check_drive_vector_len, decode_params, CommandName, ConfigParams, CrawlParams, FansParams,
    InflateParams, LlcName, MoveAzParams, MoveElParams, ResetDrivesParams, ResponseCode,
    SetLouversParams, SetTemperatureParams,
};

/// Sleep inserted before dispatch when mocking a slow network [s].
pub const SLOW_NETWORK_SLEEP: f64 = 10.0;
/// Fallback duration reported by commands without a natural one [s].
pub const LONG_DURATION: f64 = 20.0;

/// The current TAI time as unix seconds.
pub fn current_tai() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the unix epoch")
        .as_secs_f64()
}

/// Construction options for [`MockPlant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlantOptions {
    /// Fail every command for the rotating part with
    /// `ROTATING_PART_NOT_RECEIVED`.
    pub communication_error: bool,
    /// Emit the legacy flat thermal telemetry schema.
    pub legacy_thermal_schema: bool,
}

/// All mutable simulator state, shared between the server task and any
/// test that wants to inject faults directly.
#[derive(Debug)]
pub struct PlantState {
    pub amcs: Amcs,
    pub apscs: Apscs,
    pub cbcs: Cbcs,
    pub cscs: Cscs,
    pub lcs: Lcs,
    pub lwscs: Lwscs,
    pub moncs: Moncs,
    pub rad: Rad,
    pub thcs: Thcs,
    pub current_tai: f64,
    /// Sleep [`SLOW_NETWORK_SLEEP`] before dispatching each command.
    pub enable_slow_network: bool,
    /// Silently swallow every command.
    pub enable_network_interruption: bool,
    /// Fail commands for the rotating part.
    pub communication_error: bool,
}

impl PlantState {
    fn new(options: PlantOptions) -> Self {
        let start_tai = current_tai();
        Self {
            amcs: Amcs::new(start_tai),
            apscs: Apscs::new(start_tai),
            cbcs: Cbcs::new(),
            cscs: Cscs::new(start_tai),
            lcs: Lcs::new(),
            lwscs: Lwscs::new(start_tai),
            moncs: Moncs::new(),
            rad: Rad::new(),
            thcs: Thcs::new(options.legacy_thermal_schema),
            current_tai: start_tai,
            enable_slow_network: false,
            enable_network_interruption: false,
            communication_error: options.communication_error,
        }
    }
}

/// Mock dome controller serving one TCP client at a time.
pub struct MockPlant {
    state: Arc<Mutex<PlantState>>,
    port: u16,
    server_task: JoinHandle<()>,
}

impl MockPlant {
    /// Bind to `127.0.0.1:port` (0 picks an ephemeral port) and start
    /// serving.
    pub async fn start(port: u16, options: PlantOptions) -> Result<MockPlant, DomeError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        let state = Arc::new(Mutex::new(PlantState::new(options)));
        info!(port, "mock plant listening");

        let server_state = Arc::clone(&state);
        let server_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!(%peer, "client connected");
                        if let Err(e) = handle_client(stream, &server_state).await {
                            warn!(%peer, error = %e, "client connection ended");
                        }
                        info!(%peer, "client disconnected");
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        });

        Ok(MockPlant {
            state,
            port,
            server_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shared simulator state, for fault injection in tests.
    pub fn state(&self) -> Arc<Mutex<PlantState>> {
        Arc::clone(&self.state)
    }

    /// Stop accepting and drop the listener.
    pub async fn stop(self) {
        self.server_task.abort();
        let _ = self.server_task.await;
    }
}

async fn handle_client(
    stream: TcpStream,
    state: &Arc<Mutex<PlantState>>,
) -> Result<(), DomeError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(DomeError::MalformedReply(reason)) => {
                warn!(%reason, "ignoring a command that was not valid json");
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(reply) = dispatch(state, frame).await {
            write_frame(&mut write_half, &reply).await?;
        }
    }
}

/// Dispatch one command frame. Returns the reply, or `None` when the frame
/// must be silently dropped.
async fn dispatch(state: &Arc<Mutex<PlantState>>, frame: Value) -> Option<Value> {
    let Some(command_id) = frame.get("commandId").and_then(Value::as_u64) else {
        warn!(%frame, "ignoring command without a commandId");
        return None;
    };
    let reply = |code: ResponseCode, duration: f64| {
        json!({
            "commandId": command_id,
            "response": code.as_wire(),
            "timeout": duration,
        })
    };

    let (Some(command_str), Some(parameters)) = (
        frame.get("command").and_then(Value::as_str),
        frame.get("parameters").and_then(Value::as_object),
    ) else {
        warn!(%frame, "ignoring command with incorrect schema");
        return Some(reply(ResponseCode::BadParameters, -1.0));
    };

    let Ok(command) = serde_json::from_value::<CommandName>(Value::String(command_str.into()))
    else {
        error!(command = command_str, "command unknown");
        return Some(reply(ResponseCode::Unsupported, -1.0));
    };

    let (slow_network, interruption, communication_error) = {
        let state = state.lock().await;
        (
            state.enable_slow_network,
            state.enable_network_interruption,
            state.communication_error,
        )
    };
    if interruption {
        debug!(%command, "mocking a network interruption");
        return None;
    }
    if communication_error && is_rotating_command(command) {
        debug!(%command, "mocking a communication error");
        return Some(reply(ResponseCode::RotatingNotReceived, -1.0));
    }
    if slow_network {
        tokio::time::sleep(Duration::from_secs_f64(SLOW_NETWORK_SLEEP)).await;
    }

    let mut state = state.lock().await;
    state.current_tai = current_tai();
    let tai = state.current_tai;

    if command.is_status() {
        return Some(serve_status(&mut state, command, command_id, tai));
    }

    match execute(&mut state, command, parameters, tai) {
        Ok(duration) => Some(reply(ResponseCode::Ok, duration.unwrap_or(LONG_DURATION))),
        Err(e) => {
            warn!(%command, error = %e, "command rejected");
            Some(reply(e.response_code(), -1.0))
        }
    }
}

/// Serve one status request. The AMCS status doubles as the cooling signal
/// for the thermal system: the dispatcher owns both, so the cycle between
/// them crosses here instead of via mutual references.
fn serve_status(state: &mut PlantState, command: CommandName, command_id: u64, tai: f64) -> Value {
    let (llc_name, snapshot) = match command {
        CommandName::StatusAmcs => {
            let snapshot = state.amcs.determine_status(tai);
            match state.amcs.current_state {
                MotionState::StartingMotorCooling => state.thcs.start_cooling(tai),
                MotionState::StoppingMotorCooling => state.thcs.stop_cooling(tai),
                _ => {}
            }
            (LlcName::Amcs, snapshot)
        }
        CommandName::StatusApscs => (LlcName::Apscs, state.apscs.determine_status(tai)),
        CommandName::StatusCbcs => (LlcName::Cbcs, state.cbcs.determine_status(tai)),
        CommandName::StatusCscs => (LlcName::Cscs, state.cscs.determine_status(tai)),
        CommandName::StatusLcs => (LlcName::Lcs, state.lcs.determine_status(tai)),
        CommandName::StatusLwscs => (LlcName::Lwscs, state.lwscs.determine_status(tai)),
        CommandName::StatusMoncs => (LlcName::Moncs, state.moncs.determine_status(tai)),
        CommandName::StatusRad => (LlcName::Rad, state.rad.determine_status(tai)),
        CommandName::StatusThcs => (LlcName::Thcs, state.thcs.determine_status(tai)),
        _ => unreachable!("serve_status called for a non-status command"),
    };
    let mut reply = Map::new();
    reply.insert("commandId".into(), json!(command_id));
    reply.insert("response".into(), json!(ResponseCode::Ok.as_wire()));
    reply.insert(llc_name.as_wire_name().into(), snapshot);
    Value::Object(reply)
}

/// Execute a non-status command. `Ok(None)` means the command has no
/// natural duration and reports [`LONG_DURATION`].
fn execute(
    state: &mut PlantState,
    command: CommandName,
    parameters: &Map<String, Value>,
    tai: f64,
) -> Result<Option<f64>, PlantError> {
    match command {
        CommandName::MoveAz => {
            let params: MoveAzParams = decode_params(command, parameters)?;
            state
                .amcs
                .move_az(params.position, params.velocity, tai)
                .map(Some)
        }
        CommandName::CrawlAz => {
            let params: CrawlParams = decode_params(command, parameters)?;
            state.amcs.crawl_az(params.velocity, tai).map(Some)
        }
        CommandName::StopAz => state.amcs.stop_az(tai).map(Some),
        CommandName::GoStationaryAz => state.amcs.go_stationary(tai).map(Some),
        CommandName::Park => state.amcs.park(tai).map(Some),
        CommandName::SetZeroAz => state.amcs.set_zero_az(tai).map(Some),
        CommandName::Inflate => {
            let params: InflateParams = decode_params(command, parameters)?;
            state.amcs.inflate(tai, params.action).map(|_| None)
        }
        CommandName::Fans => {
            let params: FansParams = decode_params(command, parameters)?;
            state.amcs.fans(tai, params.speed).map(|_| None)
        }
        CommandName::ResetDrivesAz => {
            let params: ResetDrivesParams = decode_params(command, parameters)?;
            check_drive_vector_len(command, params.reset.len())?;
            state.amcs.reset_drives_az(tai, &params.reset).map(Some)
        }
        CommandName::ExitFaultAz => state.amcs.exit_fault(tai).map(|_| None),
        CommandName::SetNormalAz => {
            state.amcs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedAz => {
            state.amcs.set_degraded();
            Ok(None)
        }

        CommandName::MoveEl => {
            let params: MoveElParams = decode_params(command, parameters)?;
            state.lwscs.move_el(params.position, tai).map(Some)
        }
        CommandName::CrawlEl => {
            let params: CrawlParams = decode_params(command, parameters)?;
            state.lwscs.crawl_el(params.velocity, tai).map(Some)
        }
        CommandName::StopEl => state.lwscs.stop_el(tai).map(Some),
        CommandName::GoStationaryEl => state.lwscs.go_stationary(tai).map(Some),
        CommandName::ExitFaultEl => state.lwscs.exit_fault(tai).map(|_| None),
        CommandName::SetNormalEl => {
            state.lwscs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedEl => {
            state.lwscs.set_degraded();
            Ok(None)
        }

        CommandName::OpenShutter => state.apscs.open_shutter(tai).map(Some),
        CommandName::CloseShutter => state.apscs.close_shutter(tai).map(Some),
        CommandName::StopShutter => state.apscs.stop_shutter(tai).map(Some),
        CommandName::GoStationaryShutter => state.apscs.go_stationary(tai).map(Some),
        CommandName::Home => state.apscs.home(tai).map(Some),
        CommandName::ResetDrivesShutter => {
            let params: ResetDrivesParams = decode_params(command, parameters)?;
            check_drive_vector_len(command, params.reset.len())?;
            state
                .apscs
                .reset_drives_shutter(tai, &params.reset)
                .map(Some)
        }
        CommandName::ExitFaultShutter => state.apscs.exit_fault(tai).map(|_| None),
        CommandName::SetNormalShutter => {
            state.apscs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedShutter => {
            state.apscs.set_degraded();
            Ok(None)
        }

        CommandName::SetLouvers => {
            let params: SetLouversParams = decode_params(command, parameters)?;
            state.lcs.set_louvers(&params.position, tai).map(|_| None)
        }
        CommandName::CloseLouvers => state.lcs.close_louvers(tai).map(|_| None),
        CommandName::StopLouvers => state.lcs.stop_louvers(tai).map(|_| None),
        CommandName::GoStationaryLouvers => state.lcs.go_stationary(tai).map(|_| None),
        CommandName::ExitFaultLouvers => state.lcs.exit_fault(tai).map(|_| None),
        CommandName::SetNormalLouvers => {
            state.lcs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedLouvers => {
            state.lcs.set_degraded();
            Ok(None)
        }

        CommandName::SetTemperature => {
            let params: SetTemperatureParams = decode_params(command, parameters)?;
            state
                .thcs
                .set_temperature(params.temperature, tai)
                .map(|_| None)
        }
        CommandName::ExitFaultThermal => {
            state.thcs.exit_fault();
            Ok(None)
        }
        CommandName::SetNormalThermal => {
            state.thcs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedThermal => {
            state.thcs.set_degraded();
            Ok(None)
        }

        CommandName::SetNormalMonitoring => {
            state.moncs.set_normal();
            Ok(None)
        }
        CommandName::SetDegradedMonitoring => {
            state.moncs.set_degraded();
            Ok(None)
        }

        CommandName::Config => {
            let params: ConfigParams = decode_params(command, parameters)?;
            apply_config(state, &params)?;
            Ok(None)
        }
        // Accepted pending a firmware contract for restoring defaults.
        CommandName::Restore => Ok(None),

        CommandName::StatusAmcs
        | CommandName::StatusApscs
        | CommandName::StatusCbcs
        | CommandName::StatusCscs
        | CommandName::StatusLcs
        | CommandName::StatusLwscs
        | CommandName::StatusMoncs
        | CommandName::StatusRad
        | CommandName::StatusThcs => {
            unreachable!("status commands are served by serve_status")
        }
    }
}

fn apply_config(state: &mut PlantState, params: &ConfigParams) -> Result<(), PlantError> {
    enum Target {
        Amcs,
        Lwscs,
    }
    let target = match params.system.as_str() {
        "AMCS" => Target::Amcs,
        "LWSCS" => Target::Lwscs,
        other => {
            return Err(PlantError::BadParameters(format!(
                "unknown system {other:?}"
            )))
        }
    };
    for field in &params.settings {
        let value = *field.setting.first().ok_or_else(|| {
            PlantError::BadParameters(format!("empty setting for {:?}", field.target))
        })?;
        let slot = match (&target, field.target.as_str()) {
            (Target::Amcs, "jmax") => &mut state.amcs.jmax,
            (Target::Amcs, "amax") => &mut state.amcs.amax,
            (Target::Amcs, "vmax") => &mut state.amcs.vmax,
            (Target::Lwscs, "jmax") => &mut state.lwscs.jmax,
            (Target::Lwscs, "amax") => &mut state.lwscs.amax,
            (Target::Lwscs, "vmax") => &mut state.lwscs.vmax,
            (_, other) => {
                return Err(PlantError::BadParameters(format!(
                    "unknown configuration target {other:?}"
                )))
            }
        };
        *slot = value;
    }
    Ok(())
}

/// Commands that have to cross the slip ring to the rotating part.
fn is_rotating_command(command: CommandName) -> bool {
    use CommandName as C;
    matches!(
        command,
        // Light and wind screen.
        C::CrawlEl
            | C::ExitFaultEl
            | C::GoStationaryEl
            | C::MoveEl
            | C::SetDegradedEl
            | C::SetNormalEl
            | C::StatusLwscs
            | C::StopEl
            // Louvers.
            | C::CloseLouvers
            | C::ExitFaultLouvers
            | C::GoStationaryLouvers
            | C::SetDegradedLouvers
            | C::SetLouvers
            | C::SetNormalLouvers
            | C::StatusLcs
            | C::StopLouvers
            // Aperture shutters.
            | C::CloseShutter
            | C::ExitFaultShutter
            | C::GoStationaryShutter
            | C::Home
            | C::OpenShutter
            | C::ResetDrivesShutter
            | C::SetDegradedShutter
            | C::SetNormalShutter
            | C::StatusApscs
            | C::StopShutter
            // Read-only auxiliaries on the rotating part.
            | C::StatusCscs
            | C::StatusRad
    )
}
