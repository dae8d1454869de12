use domebus::constants::{LCS_MOTION_VELOCITY, LCS_NUM_LOUVERS, LOUVERS_POWER_DRAW};
use domebus::plant::{Lcs, MotionState};
use serde_json::Value;

const START_TAI: f64 = 10001.0;

fn positions(status: &Value) -> Vec<f64> {
    status["positionActual"]
        .as_array()
        .unwrap()
        .iter()
        .map(Value::as_f64)
        .map(Option::unwrap)
        .collect()
}

fn states(status: &Value) -> Vec<MotionState> {
    serde_json::from_value(status["status"]["status"].clone()).unwrap()
}

/// Evaluate the machines often enough to walk each louver through its
/// power-up or power-down sequence at `tai`.
fn settle(lcs: &mut Lcs, tai: f64) -> Value {
    let mut status = lcs.determine_status(tai);
    for _ in 0..15 {
        status = lcs.determine_status(tai);
    }
    status
}

#[test]
fn test_set_louvers_moves_selected_louvers() {
    let mut lcs = Lcs::new();
    let mut commanded = vec![-1.0; LCS_NUM_LOUVERS];
    commanded[0] = 50.0;
    commanded[1] = 25.0;
    lcs.set_louvers(&commanded, START_TAI).unwrap();

    // Walk through the power-up sequence into MOVING.
    for _ in 0..7 {
        lcs.determine_status(START_TAI + 0.5);
    }
    let status = lcs.determine_status(START_TAI + 6.0);
    let positions_mid = positions(&status);
    // Louver 0 travels 50% in 15 s, so 20% after 6 s.
    assert!((positions_mid[0] - 6.0 * LCS_MOTION_VELOCITY).abs() < 1e-9);
    assert_eq!(status["powerDraw"].as_f64().unwrap(), LOUVERS_POWER_DRAW);

    // After 30 s everything has arrived and the brakes re-engage.
    let status = settle(&mut lcs, START_TAI + 30.0);
    let positions = positions(&status);
    assert!((positions[0] - 50.0).abs() < 1e-9);
    assert!((positions[1] - 25.0).abs() < 1e-9);
    for position in positions.iter().skip(2) {
        assert_eq!(*position, 0.0);
    }
    assert_eq!(states(&status), vec![MotionState::Stationary; LCS_NUM_LOUVERS]);
    assert_eq!(status["powerDraw"].as_f64().unwrap(), 0.0);
}

#[test]
fn test_set_louvers_rejects_out_of_range() {
    let mut lcs = Lcs::new();
    let mut commanded = vec![-1.0; LCS_NUM_LOUVERS];
    commanded[3] = 101.0;
    assert!(lcs.set_louvers(&commanded, START_TAI).is_err());
    commanded[3] = -2.0;
    assert!(lcs.set_louvers(&commanded, START_TAI).is_err());
    // Nothing moved.
    assert_eq!(lcs.position_commanded, [0.0; LCS_NUM_LOUVERS]);

    let short = vec![50.0; 3];
    assert!(lcs.set_louvers(&short, START_TAI).is_err());
}

#[test]
fn test_close_louvers() {
    let mut lcs = Lcs::new();
    lcs.position_actual[0] = 10.0;
    lcs.position_actual[1] = 12.0;
    lcs.close_louvers(START_TAI).unwrap();
    assert_eq!(lcs.start_state[0], MotionState::Closing);
    assert_eq!(lcs.start_state[1], MotionState::Closing);
    // Untouched louvers stay stationary.
    for louver_id in 2..LCS_NUM_LOUVERS {
        assert_eq!(lcs.start_state[louver_id], MotionState::Stationary);
    }
    let status = settle(&mut lcs, START_TAI + 30.0);
    assert_eq!(positions(&status), vec![0.0; LCS_NUM_LOUVERS]);
    assert_eq!(states(&status), vec![MotionState::Stationary; LCS_NUM_LOUVERS]);
}

#[test]
fn test_stop_louvers_freezes_positions() {
    let mut lcs = Lcs::new();
    let mut commanded = vec![-1.0; LCS_NUM_LOUVERS];
    commanded[0] = 100.0;
    lcs.set_louvers(&commanded, START_TAI).unwrap();
    for _ in 0..7 {
        lcs.determine_status(START_TAI + 0.5);
    }
    lcs.determine_status(START_TAI + 15.0);

    lcs.stop_louvers(START_TAI + 15.0).unwrap();
    assert_eq!(lcs.target_state[0], MotionState::Stopped);
    let status = lcs.determine_status(START_TAI + 60.0);
    let positions = positions(&status);
    // Halfway through a 30 s full travel when stopped.
    assert!((positions[0] - 50.0).abs() < 1e-9);
    assert_eq!(states(&status)[0], MotionState::Stopped);
}

#[test]
fn test_go_stationary_louvers() {
    let mut lcs = Lcs::new();
    let mut commanded = vec![-1.0; LCS_NUM_LOUVERS];
    commanded[0] = 30.0;
    lcs.set_louvers(&commanded, START_TAI).unwrap();
    lcs.go_stationary(START_TAI + 0.1).unwrap();
    for louver_id in 0..LCS_NUM_LOUVERS {
        assert_eq!(lcs.target_state[louver_id], MotionState::Stationary);
    }
    let status = settle(&mut lcs, START_TAI + 30.0);
    assert_eq!(states(&status), vec![MotionState::Stationary; LCS_NUM_LOUVERS]);
}

#[test]
fn test_exit_fault_requires_drive_reset() {
    let mut lcs = Lcs::new();
    let mut drives_in_error = vec![0u8; LCS_NUM_LOUVERS * 2];
    drives_in_error[4] = 1;
    lcs.set_fault(START_TAI, &drives_in_error);
    assert_eq!(lcs.current_state[0], MotionState::Error);

    assert!(lcs.exit_fault(START_TAI + 1.0).is_err());

    let mut reset = vec![0u8; LCS_NUM_LOUVERS * 2];
    reset[4] = 1;
    lcs.reset_drives_louvers(START_TAI + 1.0, &reset).unwrap();
    lcs.exit_fault(START_TAI + 1.0).unwrap();
    assert_eq!(lcs.current_state, [MotionState::Stationary; LCS_NUM_LOUVERS]);
}
