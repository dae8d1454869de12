//! End-to-end tests of the bridge against a spawned mock plant over real
//! TCP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use domebus::bridge::{BridgeConfig, BridgeOptions, DomeBridge, SimulationMode, TelemetryCallback};
use domebus::error::DomeError;
use domebus::plant::{MotionState, OperationalMode, PlantOptions};
use domebus::protocol::{ConfigField, LlcName, OnOff, SubSystemId};
use domebus::scheduler::PowerManagementMode;
use serde_json::{Map, Value};

fn config() -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        simulation_mode: SimulationMode::SimulationWithPlant,
    }
}

/// A connected bridge with the periodic tasks suppressed, so tests control
/// all traffic on the link.
async fn connected_bridge() -> DomeBridge {
    let options = BridgeOptions {
        suppress_periodic_tasks: true,
        ..Default::default()
    };
    let mut bridge = DomeBridge::with_options(config(), HashMap::new(), options);
    bridge.connect().await.expect("connect");
    bridge
}

/// Collects every snapshot published for one subsystem.
fn collecting_callback() -> (TelemetryCallback, Arc<Mutex<Vec<Map<String, Value>>>>) {
    let collected: Arc<Mutex<Vec<Map<String, Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let callback: TelemetryCallback = Arc::new(move |snapshot: &Map<String, Value>| {
        sink.lock().unwrap().push(snapshot.clone());
    });
    (callback, collected)
}

#[tokio::test]
async fn test_connect_twice_is_an_error() {
    let mut bridge = connected_bridge().await;
    assert!(bridge.connected().await);
    assert!(matches!(
        bridge.connect().await,
        Err(DomeError::AlreadyConnected)
    ));
    bridge.disconnect().await;
    assert!(!bridge.connected().await);
}

#[tokio::test]
async fn test_operation_without_connection_fails() {
    let options = BridgeOptions {
        suppress_periodic_tasks: true,
        ..Default::default()
    };
    let bridge = DomeBridge::with_options(config(), HashMap::new(), options);
    assert!(matches!(bridge.park().await, Err(DomeError::NotConnected)));
}

#[tokio::test]
async fn test_move_az_applies_offset_and_radians() {
    let mut bridge = connected_bridge().await;
    bridge.move_az(329.0, 0.5).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        // 329 deg sky + 32 deg dome offset wraps to 1 deg on the wire.
        assert!((state.amcs.position_commanded - 1.0_f64.to_radians()).abs() < 1e-9);
        assert!((state.amcs.crawl_velocity - 0.5_f64.to_radians()).abs() < 1e-9);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_move_el_converts_to_radians() {
    let mut bridge = connected_bridge().await;
    bridge.move_el(29.0).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.lwscs.position_commanded - 29.0_f64.to_radians()).abs() < 1e-9);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_crawl_az_converts_to_radians() {
    let mut bridge = connected_bridge().await;
    bridge.crawl_az(0.5).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.amcs.crawl_velocity - 0.5_f64.to_radians()).abs() < 1e-9);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_stop_az_with_and_without_brakes() {
    let mut bridge = connected_bridge().await;
    bridge.stop_az(false).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_ne!(state.amcs.start_state, MotionState::GoStationary);
        assert_eq!(state.amcs.target_state, MotionState::Stopped);
    }
    bridge.stop_az(true).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.amcs.start_state, MotionState::GoStationary);
        assert_eq!(state.amcs.target_state, MotionState::Stationary);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_stop_sub_systems() {
    let mut bridge = connected_bridge().await;
    bridge
        .stop_sub_systems(SubSystemId::LWSCS | SubSystemId::LCS, false)
        .await
        .unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.lwscs.target_state, MotionState::Stopped);
        for louver_id in 0..state.lcs.target_state.len() {
            assert_eq!(state.lcs.target_state[louver_id], MotionState::Stopped);
        }
        // The azimuth was not masked.
        assert_eq!(state.amcs.target_state, MotionState::Parked);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_set_louvers() {
    let mut bridge = connected_bridge().await;
    let mut positions = vec![-1.0; 34];
    positions[0] = 10.0;
    positions[1] = 12.0;
    bridge.set_louvers(&positions).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.lcs.position_commanded[0] - 10.0).abs() < 1e-9);
        assert!((state.lcs.position_commanded[1] - 12.0).abs() < 1e-9);
        for louver_id in 2..34 {
            assert_eq!(state.lcs.position_commanded[louver_id], 0.0);
        }
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_open_and_close_shutter() {
    let mut bridge = connected_bridge().await;
    bridge.open_shutter().await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.apscs.target_state, [MotionState::Open; 2]);
    }
    bridge.close_shutter().await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.apscs.target_state, [MotionState::Closed; 2]);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_park() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        assert_eq!(state.lock().await.amcs.start_state, MotionState::Parked);
    }
    bridge.park().await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        assert_eq!(state.lock().await.amcs.start_state, MotionState::Parking);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_set_temperature() {
    let mut bridge = connected_bridge().await;
    bridge.set_temperature(10.0).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.thcs.temperature[0] - 10.0).abs() < 1e-9);
        assert!((state.thcs.cabinet_temperature[0] - 10.0).abs() < 1e-9);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_exit_fault_resets_drives_first() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        let mut state = state.lock().await;
        let tai = state.current_tai;
        state.amcs.set_fault(tai, &[1, 0, 0, 0, 0]);
    }
    bridge.exit_fault(SubSystemId::AMCS).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.amcs.drives_in_error_state, [false; 5]);
        assert_eq!(state.amcs.current_state, MotionState::Stationary);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_set_operational_mode() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        assert_eq!(
            state.lock().await.amcs.operational_mode,
            OperationalMode::Normal
        );
    }
    bridge
        .set_operational_mode(OperationalMode::Degraded, SubSystemId::AMCS)
        .await
        .unwrap();
    {
        let state = bridge.plant().unwrap().state();
        assert_eq!(
            state.lock().await.amcs.operational_mode,
            OperationalMode::Degraded
        );
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_reset_drives() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        let mut state = state.lock().await;
        state.amcs.drives_in_error_state[0] = true;
        state.apscs.drives_in_error_state[0][0] = true;
    }
    bridge.reset_drives_az(&[1, 1, 1, 1, 1]).await.unwrap();
    bridge.reset_drives_shutter(&[1, 1, 1, 1]).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!(!state.amcs.drives_in_error_state[0]);
        assert!(!state.apscs.drives_in_error_state[0][0]);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_set_zero_az() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        let mut state = state.lock().await;
        state.amcs.position_actual = 1.0;
        state.amcs.start_position = 1.0;
    }
    bridge.set_zero_az().await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.amcs.position_actual, 0.0);
        assert_eq!(state.amcs.start_position, 0.0);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_home_only_supports_the_shutters() {
    let mut bridge = connected_bridge().await;
    {
        let state = bridge.plant().unwrap().state();
        state.lock().await.apscs.position_actual = [100.0; 2];
    }
    bridge
        .home(SubSystemId::APSCS | SubSystemId::LCS)
        .await
        .unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.apscs.target_state, [MotionState::Closed; 2]);
        assert_eq!(state.apscs.position_actual, [0.0; 2]);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_config_llcs_round_trip() {
    let mut bridge = connected_bridge().await;
    let settings = vec![
        ConfigField {
            target: "jmax".into(),
            setting: vec![1.0],
        },
        ConfigField {
            target: "amax".into(),
            setting: vec![0.5],
        },
        ConfigField {
            target: "vmax".into(),
            setting: vec![1.0],
        },
    ];
    bridge.config_llcs(LlcName::Amcs, &settings).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.amcs.jmax - 1.0_f64.to_radians()).abs() < 1e-12);
        assert!((state.amcs.amax - 0.5_f64.to_radians()).abs() < 1e-12);
        assert!((state.amcs.vmax - 1.0_f64.to_radians()).abs() < 1e-12);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_config_llcs_rejects_out_of_range_locally() {
    let mut bridge = connected_bridge().await;
    let settings = vec![ConfigField {
        target: "vmax".into(),
        setting: vec![99.0],
    }];
    assert!(matches!(
        bridge.config_llcs(LlcName::Amcs, &settings).await,
        Err(DomeError::BadParameters(_, _))
    ));
    // Nothing was transmitted.
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.amcs.vmax - 1.5_f64.to_radians()).abs() < 1e-12);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_fans_and_inflate() {
    let mut bridge = connected_bridge().await;
    bridge.fans(10.0).await.unwrap();
    bridge.inflate(OnOff::On).await.unwrap();
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert!((state.amcs.fans_speed - 10.0).abs() < 1e-9);
        assert_eq!(state.amcs.seal_inflated, OnOff::On);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_restore() {
    let mut bridge = connected_bridge().await;
    bridge.restore_llcs().await.unwrap();
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_set_power_management_mode() {
    let mut bridge = connected_bridge().await;
    assert_eq!(
        bridge.power_management_mode(),
        PowerManagementMode::NoPowerManagement
    );
    bridge.set_power_management_mode(PowerManagementMode::Emergency);
    assert_eq!(
        bridge.power_management_mode(),
        PowerManagementMode::Emergency
    );
    // Switching back to NoPowerManagement is refused.
    bridge.set_power_management_mode(PowerManagementMode::NoPowerManagement);
    assert_eq!(
        bridge.power_management_mode(),
        PowerManagementMode::Emergency
    );
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_power_management_queues_instead_of_sending() {
    let mut bridge = connected_bridge().await;
    bridge.set_power_management_mode(PowerManagementMode::Operations);
    bridge.open_shutter().await.unwrap();
    // With the queue processor suppressed the command stays queued and the
    // plant never sees it.
    {
        let state = bridge.plant().unwrap().state();
        let state = state.lock().await;
        assert_eq!(state.apscs.target_state, [MotionState::Closed; 2]);
    }
    bridge.disconnect().await;
}

#[tokio::test]
async fn test_communication_error_surfaces_and_is_reported() {
    let options = BridgeOptions {
        suppress_periodic_tasks: true,
        plant_options: PlantOptions {
            communication_error: true,
            ..Default::default()
        },
    };
    let mut bridge = DomeBridge::with_options(config(), HashMap::new(), options);
    bridge.connect().await.unwrap();

    let result = bridge.open_shutter().await;
    assert!(matches!(result, Err(DomeError::RotatingNotReceived(_))));
    let report = bridge.communication_error_report();
    assert_eq!(report["command_name"], serde_json::json!("openShutter"));
    assert_eq!(report["response_code"], serde_json::json!(6));

    // Commands for the fixed part still succeed and clear the report.
    bridge.park().await.unwrap();
    assert!(bridge.communication_error_report().is_empty());

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_request_llc_status_publishes_offset_degrees() {
    let (callback, collected) = collecting_callback();
    let callbacks = HashMap::from([(LlcName::Amcs, callback)]);
    let options = BridgeOptions {
        suppress_periodic_tasks: true,
        ..Default::default()
    };
    let mut bridge = DomeBridge::with_options(config(), callbacks, options);
    bridge.connect().await.unwrap();

    bridge.request_llc_status(LlcName::Amcs).await.unwrap();
    let snapshots = collected.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    // The plant parks at dome azimuth 0, which is sky azimuth 328.
    let position = snapshots[0]["positionActual"].as_f64().unwrap();
    assert!((position - 328.0).abs() < 1e-9);
    assert!(snapshots[0].contains_key("timestamp"));
    assert!(!snapshots[0].contains_key("timestampUTC"));
    drop(snapshots);

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_periodic_polling_publishes_telemetry() {
    let (amcs_callback, amcs_collected) = collecting_callback();
    let (lwscs_callback, lwscs_collected) = collecting_callback();
    let callbacks = HashMap::from([
        (LlcName::Amcs, amcs_callback),
        (LlcName::Lwscs, lwscs_callback),
    ]);
    let mut bridge = DomeBridge::new(config(), callbacks);
    bridge.connect().await.unwrap();

    // The azimuth polls every 0.2 s, the screen every 0.5 s.
    tokio::time::sleep(std::time::Duration::from_millis(900)).await;
    bridge.disconnect().await;

    let amcs_count = amcs_collected.lock().unwrap().len();
    let lwscs_count = lwscs_collected.lock().unwrap().len();
    assert!(amcs_count >= 2, "AMCS only polled {amcs_count} times");
    assert!(lwscs_count >= 1, "LWSCS only polled {lwscs_count} times");
    assert!(amcs_count > lwscs_count);

    let latest = bridge.latest_status();
    assert!(latest.contains_key(&LlcName::Amcs));
    assert!(latest.contains_key(&LlcName::Lwscs));
    // Unregistered subsystems are never polled.
    assert!(!latest.contains_key(&LlcName::Lcs));
}
