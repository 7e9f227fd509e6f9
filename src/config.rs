use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mounting geometry of a single motor.
///
/// Offsets are measured in millimetres from the geometric center of the hull, `x` to starboard
/// and `y` towards the bow. `angle_degrees` is the direction of thrust, 0 pointing forward and 90
/// pointing to starboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Name of the motor component resolved by the host.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x_offset_mm: f64,
    #[serde(default)]
    pub y_offset_mm: f64,
    #[serde(default)]
    pub angle_degrees: f64,
    /// Relative strength of this motor.
    pub weight: f64,
}

impl MotorConfig {
    pub fn new(name: impl Into<String>, x_offset_mm: f64, y_offset_mm: f64) -> Self {
        Self {
            name: name.into(),
            x_offset_mm,
            y_offset_mm,
            angle_degrees: 0.,
            weight: 1.,
        }
    }

    pub fn with_angle(mut self, angle_degrees: f64) -> Self {
        self.angle_degrees = angle_degrees;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Static description of the boat.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub motors: Vec<MotorConfig>,
    pub length_mm: f64,
    pub width_mm: f64,
    /// Name of the movement sensor component, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_sensor: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.width_mm > 0.) {
            return Err(Error::FieldRequired("width_mm"));
        }
        if !(self.length_mm > 0.) {
            return Err(Error::FieldRequired("length_mm"));
        }
        Ok(())
    }

    /// Names of the components the host must resolve before building the boat,
    /// the movement sensor first followed by the motors in configuration order.
    pub fn dependencies(&self) -> Vec<&str> {
        self.movement_sensor
            .as_deref()
            .filter(|name| !name.is_empty())
            .into_iter()
            .chain(self.motors.iter().map(|motor| motor.name.as_str()))
            .collect()
    }

    /// Length of the hull diagonal, used to normalise yaw authority.
    pub fn diagonal_mm(&self) -> f64 {
        self.width_mm.hypot(self.length_mm)
    }
}
