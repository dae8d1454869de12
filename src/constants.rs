//! Constants for the dome and its lower level components, grouped by
//! subsystem. All angles are radians and all angular rates rad/s^n unless a
//! name says otherwise.

use static_assertions::const_assert;

/// Offset of the dome-internal azimuth zero east of the sky azimuth zero
/// [deg].
pub const DOME_AZIMUTH_OFFSET: f64 = 32.0;
/// Nominal voltage on the rotating part [V].
pub const DOME_VOLTAGE: f64 = 220.0;

// Power draw on the slip ring per consumer [W].
pub const APS_POWER_DRAW: f64 = 64_000.0;
pub const FANS_POWER_DRAW: f64 = 32_000.0;
pub const LWS_POWER_DRAW: f64 = 32_000.0;
pub const LOUVERS_POWER_DRAW: f64 = 15_000.0;
/// Continuous power capacity of the slip ring [W].
pub const CONTINUOUS_SLIP_RING_POWER_CAPACITY: f64 = 78_000.0;
/// Continuous draw of the electronics on the rotating part [W].
pub const CONTINUOUS_ELECTRONICS_POWER_DRAW: f64 = 10_000.0;

// AMCS, the azimuth drive train.
pub const AMCS_NUM_MOTORS: usize = 5;
pub const AMCS_NUM_MOTOR_TEMPERATURES: usize = 13;
pub const AMCS_NUM_ENCODERS: usize = 5;
pub const AMCS_NUM_RESOLVERS: usize = 3;
/// Current per motor while moving [A]. Acceleration and wind load are
/// ignored by the simulator.
pub const AMCS_CURRENT_PER_MOTOR_MOVING: f64 = 40.0;
/// Current per motor while crawling [A].
pub const AMCS_CURRENT_PER_MOTOR_CRAWLING: f64 = 4.1;
pub const AMCS_PARK_POSITION: f64 = 0.0;
/// Maximum jerk [rad/s^3].
pub const AMCS_JMAX: f64 = 3.0 * RAD_PER_DEG;
/// Maximum acceleration [rad/s^2].
pub const AMCS_AMAX: f64 = 0.75 * RAD_PER_DEG;
/// Maximum velocity [rad/s].
pub const AMCS_VMAX: f64 = 1.5 * RAD_PER_DEG;

// APSCS, the aperture shutters.
pub const APSCS_NUM_SHUTTERS: usize = 2;
pub const APSCS_NUM_MOTORS_PER_SHUTTER: usize = 2;
pub const APSCS_NUM_MOTORS: usize = APSCS_NUM_SHUTTERS * APSCS_NUM_MOTORS_PER_SHUTTER;
pub const APSCS_CLOSED_POSITION: f64 = 0.0;
pub const APSCS_OPEN_POSITION: f64 = 100.0;
/// Shutter speed [%/s], so a full open or close takes 10 seconds.
pub const APSCS_SHUTTER_SPEED: f64 = 10.0;
/// The shutter motors settle with a tiny jitter around the commanded
/// position. Telemetry consumers round this away.
pub const APSCS_POSITION_JITTER: f64 = 2.5e-7;
/// Current per shutter motor [A].
pub const APSCS_CURRENT_PER_MOTOR: f64 =
    APS_POWER_DRAW / APSCS_NUM_SHUTTERS as f64 / APSCS_NUM_MOTORS_PER_SHUTTER as f64 / DOME_VOLTAGE;

// CBCS, the capacitor banks.
pub const CBCS_NUM_CAPACITOR_BANKS: usize = 2;

// LCS, the louvers.
pub const LCS_NUM_LOUVERS: usize = 34;
pub const LCS_NUM_MOTORS_PER_LOUVER: usize = 2;
pub const LCS_NUM_MOTORS: usize = LCS_NUM_LOUVERS * LCS_NUM_MOTORS_PER_LOUVER;
/// Current per louver motor [A].
pub const LCS_CURRENT_PER_MOTOR: f64 =
    LOUVERS_POWER_DRAW / LCS_NUM_LOUVERS as f64 / DOME_VOLTAGE / LCS_NUM_MOTORS_PER_LOUVER as f64;
/// Louver motion velocity [%/s], equalling 100 % / 30 s.
pub const LCS_MOTION_VELOCITY: f64 = 100.0 / 30.0;

// LWSCS, the light and wind screen.
pub const LWSCS_NUM_MOTORS: usize = 2;
pub const LWSCS_MIN_POSITION: f64 = 0.0;
pub const LWSCS_MAX_POSITION: f64 = std::f64::consts::FRAC_PI_2;
/// Current per screen motor [A].
pub const LWSCS_CURRENT_PER_MOTOR: f64 =
    LWS_POWER_DRAW / LWSCS_NUM_MOTORS as f64 / DOME_VOLTAGE;
/// Maximum jerk [rad/s^3].
pub const LWSCS_JMAX: f64 = 3.5 * RAD_PER_DEG;
/// Maximum acceleration [rad/s^2].
pub const LWSCS_AMAX: f64 = 0.875 * RAD_PER_DEG;
/// Maximum velocity [rad/s].
pub const LWSCS_VMAX: f64 = 1.75 * RAD_PER_DEG;

// MonCS, the interlock monitoring.
pub const MON_NUM_SENSORS: usize = 16;

// RAD, the rear access door.
pub const RAD_NUM_DOORS: usize = 2;
pub const RAD_NUM_LIMIT_SWITCHES: usize = 4;
pub const RAD_NUM_LOCKING_PINS: usize = 2;

// ThCS, the thermal control system.
pub const THCS_NUM_CABINET_TEMPERATURES: usize = 3;
pub const THCS_NUM_MOTOR_COIL_TEMPERATURES: usize = 5;
pub const THCS_NUM_MOTOR_DRIVE_TEMPERATURES: usize = 10;
/// Sensor count of the legacy flat temperature schema.
pub const THCS_NUM_SENSORS: usize = 13;

// Bridge timing.
/// Base tick of the status poller [s].
pub const STATUS_POKE_PERIOD: f64 = 0.1;
/// Watchdog period for unanswered commands [s].
pub const COMMANDS_REPLIED_PERIOD: f64 = 600.0;
/// Bound on every reply read [s].
pub const COMMAND_REPLY_TIMEOUT: f64 = 20.0;
/// Tick of the power-management queue processor [s].
pub const COMMAND_QUEUE_PERIOD: f64 = 1.0;

const RAD_PER_DEG: f64 = std::f64::consts::PI / 180.0;

// The limit-switch array covers both sides of both doors and the locking
// pins come in pairs, so these counts are tied together.
const_assert!(RAD_NUM_LIMIT_SWITCHES == 2 * RAD_NUM_DOORS);
const_assert!(RAD_NUM_LOCKING_PINS == RAD_NUM_DOORS);
const_assert!(APSCS_NUM_MOTORS == 4);
const_assert!(LCS_NUM_MOTORS == 68);
