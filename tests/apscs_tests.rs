use domebus::constants::{
    APSCS_CLOSED_POSITION, APSCS_CURRENT_PER_MOTOR, APSCS_NUM_MOTORS, APSCS_NUM_SHUTTERS,
    APSCS_OPEN_POSITION, APSCS_SHUTTER_SPEED, APS_POWER_DRAW,
};
use domebus::plant::{Apscs, MotionState};
use serde_json::Value;

const START_TAI: f64 = 10001.0;

fn prepare_apscs(start_position: f64, start_tai: f64, current_state: MotionState) -> Apscs {
    let mut apscs = Apscs::new(start_tai);
    apscs.position_actual = [start_position; APSCS_NUM_SHUTTERS];
    apscs.current_state = [current_state; APSCS_NUM_SHUTTERS];
    apscs
}

fn verify_apscs(
    apscs: &mut Apscs,
    tai: f64,
    expected_position: f64,
    expected_state: MotionState,
) {
    let status = apscs.determine_status(tai);
    let positions: Vec<f64> = status["positionActual"]
        .as_array()
        .unwrap()
        .iter()
        .map(Value::as_f64)
        .map(Option::unwrap)
        .collect();
    for position in &positions {
        assert!(
            (position - expected_position).abs() < 0.001,
            "position {position} != {expected_position} at tai {tai}"
        );
    }
    let states: Vec<MotionState> =
        serde_json::from_value(status["status"]["status"].clone()).unwrap();
    assert_eq!(states, [expected_state; APSCS_NUM_SHUTTERS]);

    let moving = matches!(expected_state, MotionState::Opening | MotionState::Closing);
    let expected_current = if moving { APSCS_CURRENT_PER_MOTOR } else { 0.0 };
    let expected_power = if moving { APS_POWER_DRAW } else { 0.0 };
    let currents: Vec<f64> = status["driveCurrentActual"]
        .as_array()
        .unwrap()
        .iter()
        .map(Value::as_f64)
        .map(Option::unwrap)
        .collect();
    assert_eq!(currents, vec![expected_current; APSCS_NUM_MOTORS]);
    assert_eq!(status["powerDraw"].as_f64().unwrap(), expected_power);
}

#[test]
fn test_open_shutter() {
    let mut apscs = prepare_apscs(APSCS_CLOSED_POSITION, START_TAI, MotionState::Opening);
    let duration = apscs.open_shutter(START_TAI).unwrap();
    assert_eq!(duration, 10.0);
    for i in 0..10 {
        verify_apscs(
            &mut apscs,
            START_TAI + i as f64,
            APSCS_SHUTTER_SPEED * i as f64,
            MotionState::Opening,
        );
    }
    verify_apscs(
        &mut apscs,
        START_TAI + 10.0,
        APSCS_OPEN_POSITION,
        MotionState::ProximityOpenLsEngaged,
    );
}

#[test]
fn test_close_shutter() {
    let mut apscs = prepare_apscs(APSCS_OPEN_POSITION, START_TAI, MotionState::Closing);
    let duration = apscs.close_shutter(START_TAI).unwrap();
    assert_eq!(duration, 10.0);
    for i in 0..10 {
        verify_apscs(
            &mut apscs,
            START_TAI + i as f64,
            APSCS_OPEN_POSITION - APSCS_SHUTTER_SPEED * i as f64,
            MotionState::Closing,
        );
    }
    verify_apscs(
        &mut apscs,
        START_TAI + 10.0,
        APSCS_CLOSED_POSITION,
        MotionState::ProximityClosedLsEngaged,
    );
}

#[test]
fn test_stop_shutter() {
    // The prepared state keeps reporting CLOSING even though the shutters
    // run open, like the real drive electronics.
    let mut apscs = prepare_apscs(APSCS_CLOSED_POSITION, START_TAI, MotionState::Closing);
    let duration = apscs.open_shutter(START_TAI).unwrap();
    assert_eq!(duration, 10.0);
    for i in 0..6 {
        verify_apscs(
            &mut apscs,
            START_TAI + i as f64,
            APSCS_SHUTTER_SPEED * i as f64,
            MotionState::Closing,
        );
    }
    apscs.stop_shutter(START_TAI + 7.0).unwrap();
    verify_apscs(&mut apscs, START_TAI + 7.1, 70.0, MotionState::Stopped);
}

#[test]
fn test_go_stationary_shutter() {
    let mut apscs = prepare_apscs(APSCS_CLOSED_POSITION, START_TAI, MotionState::Closing);
    apscs.open_shutter(START_TAI).unwrap();
    for i in 0..6 {
        verify_apscs(
            &mut apscs,
            START_TAI + i as f64,
            APSCS_SHUTTER_SPEED * i as f64,
            MotionState::Closing,
        );
    }
    apscs.go_stationary(START_TAI + 7.0).unwrap();
    verify_apscs(&mut apscs, START_TAI + 7.1, 70.0, MotionState::Stopping);
    // The walk continues through the brakes down to stationary.
    for _ in 0..8 {
        apscs.determine_status(START_TAI + 8.0);
    }
    assert_eq!(apscs.current_state, [MotionState::Stationary; APSCS_NUM_SHUTTERS]);
}

#[test]
fn test_home() {
    let mut apscs = prepare_apscs(APSCS_OPEN_POSITION, START_TAI, MotionState::Closed);
    apscs.home(START_TAI).unwrap();
    assert_eq!(apscs.position_actual, [APSCS_CLOSED_POSITION; APSCS_NUM_SHUTTERS]);
    assert_eq!(apscs.target_state, [MotionState::Closed; APSCS_NUM_SHUTTERS]);
}

#[test]
fn test_exit_fault() {
    let mut apscs = prepare_apscs(APSCS_CLOSED_POSITION, START_TAI, MotionState::Closing);
    let duration = apscs.open_shutter(START_TAI).unwrap();
    assert_eq!(duration, 10.0);
    verify_apscs(&mut apscs, START_TAI + 1.0, 10.0, MotionState::Closing);

    apscs.set_fault(START_TAI + 1.1, &[0, 1, 0, 1]);
    for shutter_id in 0..APSCS_NUM_SHUTTERS {
        assert_eq!(apscs.drives_in_error_state[shutter_id], [false, true]);
    }
    verify_apscs(&mut apscs, START_TAI + 1.1, 11.0, MotionState::Error);

    // Exiting fails while drives are still in error.
    assert!(apscs.exit_fault(START_TAI + 2.0).is_err());

    apscs
        .reset_drives_shutter(START_TAI + 2.0, &[0, 1, 0, 1])
        .unwrap();
    for shutter_id in 0..APSCS_NUM_SHUTTERS {
        assert_eq!(apscs.drives_in_error_state[shutter_id], [false, false]);
    }

    apscs.exit_fault(START_TAI + 2.0).unwrap();
    verify_apscs(&mut apscs, START_TAI + 2.0, 11.0, MotionState::Stationary);
}

#[test]
fn test_open_while_in_fault_is_rejected() {
    let mut apscs = prepare_apscs(APSCS_CLOSED_POSITION, START_TAI, MotionState::Closing);
    apscs.set_fault(START_TAI, &[1, 0, 0, 0]);
    assert!(apscs.open_shutter(START_TAI + 1.0).is_err());
}
