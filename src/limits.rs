//! Validation of motion-limit configuration for the AMCS and LWSCS.
//!
//! Operators provide `jmax`/`amax`/`vmax` in deg/s^n. Values are checked
//! against the hardware limits and converted to rad/s^n before they are put
//! on the wire; anything unknown or out of range is rejected locally.

use crate::constants::{AMCS_AMAX, AMCS_JMAX, AMCS_VMAX, LWSCS_AMAX, LWSCS_JMAX, LWSCS_VMAX};
use crate::error::DomeError;
use crate::protocol::{CommandName, ConfigField};

/// Hardware limits of one configurable subsystem, in rad/s^n.
#[derive(Debug, Clone, Copy)]
pub struct MotionLimits {
    pub jmax: f64,
    pub amax: f64,
    pub vmax: f64,
}

impl MotionLimits {
    pub const AMCS: MotionLimits = MotionLimits {
        jmax: AMCS_JMAX,
        amax: AMCS_AMAX,
        vmax: AMCS_VMAX,
    };

    pub const LWSCS: MotionLimits = MotionLimits {
        jmax: LWSCS_JMAX,
        amax: LWSCS_AMAX,
        vmax: LWSCS_VMAX,
    };

    fn limit_for(&self, target: &str) -> Option<f64> {
        match target {
            "jmax" => Some(self.jmax),
            "amax" => Some(self.amax),
            "vmax" => Some(self.vmax),
            _ => None,
        }
    }

    /// Validate operator settings given in deg/s^n and convert them to
    /// rad/s^n, preserving the `{target, setting}` wire shape.
    pub fn validate(&self, settings: &[ConfigField]) -> Result<Vec<ConfigField>, DomeError> {
        let mut converted = Vec::with_capacity(settings.len());
        for field in settings {
            let limit = self.limit_for(&field.target).ok_or_else(|| {
                DomeError::BadParameters(
                    CommandName::Config,
                    format!("unknown configuration target {:?}", field.target),
                )
            })?;
            if field.setting.len() != 1 {
                return Err(DomeError::BadParameters(
                    CommandName::Config,
                    format!(
                        "target {:?} takes exactly one value, got {}",
                        field.target,
                        field.setting.len()
                    ),
                ));
            }
            let value_rad = field.setting[0].to_radians();
            if value_rad <= 0.0 || value_rad > limit {
                return Err(DomeError::BadParameters(
                    CommandName::Config,
                    format!(
                        "target {:?} value {} deg/s^n is outside (0, {}]",
                        field.target,
                        field.setting[0],
                        limit.to_degrees()
                    ),
                ));
            }
            converted.push(ConfigField {
                target: field.target.clone(),
                setting: vec![value_rad],
            });
        }
        Ok(converted)
    }
}
