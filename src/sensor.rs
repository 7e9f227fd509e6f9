use core::future::Future;
use nalgebra::Vector3;

use crate::DriverError;

/// Measurements of the boat's motion.
pub trait MovementSensor: Send + Sync {
    /// Angular velocity in degrees/second; `z` is yaw, counter-clockwise positive.
    fn angular_velocity(&self) -> impl Future<Output = Result<Vector3<f64>, DriverError>> + Send;

    /// Linear velocity in millimetres/second; `x` is lateral and `y` forward.
    fn linear_velocity(&self) -> impl Future<Output = Result<Vector3<f64>, DriverError>> + Send;

    /// Compass heading in degrees.
    fn compass_heading(&self) -> impl Future<Output = Result<f64, DriverError>> + Send;
}

/// The sensor type of a boat built without a movement sensor.
#[derive(Debug)]
pub enum NoMovementSensor {}

impl MovementSensor for NoMovementSensor {
    async fn angular_velocity(&self) -> Result<Vector3<f64>, DriverError> {
        match *self {}
    }

    async fn linear_velocity(&self) -> Result<Vector3<f64>, DriverError> {
        match *self {}
    }

    async fn compass_heading(&self) -> Result<f64, DriverError> {
        match *self {}
    }
}
