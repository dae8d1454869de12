//! Shaping of inbound status snapshots before they reach telemetry
//! consumers.
//!
//! On the wire every angle is radians and the azimuth carries the dome
//! offset. Consumers get degrees in sky coordinates, a `timestamp` key and
//! rounded shutter positions.

use serde_json::{Map, Value};

use crate::constants::DOME_AZIMUTH_OFFSET;
use crate::protocol::LlcName;

/// Keys holding angular values that are converted from radians to degrees
/// for the AMCS and LWSCS.
const KEYS_IN_RADIANS: [&str; 4] = [
    "positionActual",
    "positionCommanded",
    "velocityActual",
    "velocityCommanded",
];

/// The AMCS position keys additionally compensated for the dome azimuth
/// offset.
const AMCS_KEYS_OFFSET: [&str; 2] = ["positionActual", "positionCommanded"];

/// Wrap an angle in degrees into `[0, 360)`.
fn wrap_degrees(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Round to two decimals, suppressing a `-0.0` result.
fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

/// Apply `f` to a scalar value or to every element of an array.
fn map_numbers(value: &Value, f: impl Fn(f64) -> f64 + Copy) -> Value {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|v| Value::from(f(v)))
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_numbers(v, f)).collect()),
        _ => value.clone(),
    }
}

/// Convert one raw snapshot into its published form.
pub fn preprocess_status(llc_name: LlcName, raw: &Map<String, Value>) -> Map<String, Value> {
    let angular = matches!(llc_name, LlcName::Amcs | LlcName::Lwscs);
    let mut processed = Map::with_capacity(raw.len());
    for (key, value) in raw {
        if angular && KEYS_IN_RADIANS.contains(&key.as_str()) {
            let mut converted = map_numbers(value, f64::to_degrees);
            if llc_name == LlcName::Amcs && AMCS_KEYS_OFFSET.contains(&key.as_str()) {
                converted =
                    map_numbers(&converted, |deg| wrap_degrees(deg - DOME_AZIMUTH_OFFSET));
            }
            processed.insert(key.clone(), converted);
        } else if key == "timestampUTC" {
            processed.insert("timestamp".to_string(), value.clone());
        } else {
            processed.insert(key.clone(), value.clone());
        }
    }
    round_values(llc_name, &mut processed);
    processed
}

/// Round the keys listed for this subsystem. The shutter positions settle
/// with sub-percent jitter and are published to two decimals.
fn round_values(llc_name: LlcName, telemetry: &mut Map<String, Value>) {
    if llc_name != LlcName::Apscs {
        return;
    }
    if let Some(value) = telemetry.get("positionActual") {
        let rounded = map_numbers(value, round_two_decimals);
        telemetry.insert("positionActual".to_string(), rounded);
    }
}
