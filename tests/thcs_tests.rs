use domebus::constants::{
    THCS_NUM_CABINET_TEMPERATURES, THCS_NUM_MOTOR_COIL_TEMPERATURES,
    THCS_NUM_MOTOR_DRIVE_TEMPERATURES, THCS_NUM_SENSORS,
};
use domebus::plant::{MotionState, Thcs};
use serde_json::Value;

const START_TAI: f64 = 10001.0;

fn state_of(status: &Value) -> MotionState {
    serde_json::from_value(status["status"]["status"].clone()).unwrap()
}

#[test]
fn test_cooling_walks_through_transients() {
    let mut thcs = Thcs::new(false);
    let status = thcs.determine_status(START_TAI);
    assert_eq!(state_of(&status), MotionState::Disabled);

    thcs.start_cooling(START_TAI + 1.0);
    let status = thcs.determine_status(START_TAI + 1.1);
    assert_eq!(state_of(&status), MotionState::Enabling);
    let status = thcs.determine_status(START_TAI + 1.2);
    assert_eq!(state_of(&status), MotionState::Enabled);
    // Steady once enabled.
    let status = thcs.determine_status(START_TAI + 2.0);
    assert_eq!(state_of(&status), MotionState::Enabled);

    thcs.stop_cooling(START_TAI + 3.0);
    let status = thcs.determine_status(START_TAI + 3.1);
    assert_eq!(state_of(&status), MotionState::Disabling);
    let status = thcs.determine_status(START_TAI + 3.2);
    assert_eq!(state_of(&status), MotionState::Disabled);
}

#[test]
fn test_set_temperature_stamps_all_sensors() {
    let mut thcs = Thcs::new(false);
    thcs.set_temperature(10.0, START_TAI).unwrap();
    let status = thcs.determine_status(START_TAI + 0.1);
    assert_eq!(
        status["driveTemperature"],
        serde_json::json!(vec![10.0; THCS_NUM_MOTOR_DRIVE_TEMPERATURES])
    );
    assert_eq!(
        status["motorCoilTemperature"],
        serde_json::json!(vec![10.0; THCS_NUM_MOTOR_COIL_TEMPERATURES])
    );
    assert_eq!(
        status["cabinetTemperature"],
        serde_json::json!(vec![10.0; THCS_NUM_CABINET_TEMPERATURES])
    );
    assert!(status.get("temperature").is_none());
}

#[test]
fn test_legacy_schema_reports_flat_array() {
    let mut thcs = Thcs::new(true);
    thcs.set_temperature(-5.0, START_TAI).unwrap();
    let status = thcs.determine_status(START_TAI + 0.1);
    assert_eq!(
        status["temperature"],
        serde_json::json!(vec![-5.0; THCS_NUM_SENSORS])
    );
    assert!(status.get("driveTemperature").is_none());
    assert!(status.get("motorCoilTemperature").is_none());
    assert!(status.get("cabinetTemperature").is_none());
}

#[test]
fn test_exit_fault() {
    let mut thcs = Thcs::new(false);
    thcs.exit_fault();
    assert_eq!(thcs.current_state, MotionState::Stationary);
}
