use core::future::Future;
use nalgebra::Vector3;

use crate::{config::MotorConfig, DriverError};

mod pwm;
pub use pwm::PwmMotor;

/// A motor driver, addressed by its index in configuration order.
pub trait Motor: Send + Sync {
    /// Command a signed fraction of full power in [-1, 1].
    fn set_power(&self, power: f64) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn is_powered(&self) -> impl Future<Output = Result<bool, DriverError>> + Send;
}

/// Contribution of one motor at full forward power to the boat's motion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotorWeights {
    pub lateral: f64,
    pub forward: f64,
    pub yaw: f64,
}

impl MotorWeights {
    pub fn new(lateral: f64, forward: f64, yaw: f64) -> Self {
        Self {
            lateral,
            forward,
            yaw,
        }
    }

    /// Calculate the weights of a motor on a hull with a diagonal of `diagonal_mm`.
    ///
    /// The thrust direction is split into its lateral (sine) and forward (cosine) parts. The yaw
    /// weight is the moment `r × F` of that force around the hull center, counter-clockwise
    /// positive, normalised by the diagonal so boats of different sizes have comparable yaw
    /// authority. A motor at the center has no yaw.
    pub fn from_motor(motor: &MotorConfig, diagonal_mm: f64) -> Self {
        let (sin, cos) = motor.angle_degrees.to_radians().sin_cos();

        Self {
            lateral: sin * motor.weight,
            forward: cos * motor.weight,
            yaw: (motor.x_offset_mm * cos - motor.y_offset_mm * sin) * motor.weight / diagonal_mm,
        }
    }

    pub fn abs(&self) -> Self {
        Self::new(self.lateral.abs(), self.forward.abs(), self.yaw.abs())
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.lateral, self.forward, self.yaw)
    }
}

impl From<Vector3<f64>> for MotorWeights {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl core::ops::Add for MotorWeights {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.lateral + rhs.lateral,
            self.forward + rhs.forward,
            self.yaw + rhs.yaw,
        )
    }
}

impl core::iter::Sum for MotorWeights {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, w| acc + w)
    }
}
