use thiserror::Error;

use crate::allocator::AllocationError;

/// An error reported by a motor driver or movement sensor.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = core::result::Result<T, Error>;

/// A motor driver failure, tagged with the motor's index in configuration order.
#[derive(Debug, Error)]
#[error("motor {index}: {source}")]
pub struct MotorError {
    pub index: usize,
    #[source]
    pub source: DriverError,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("config field `{0}` is required")]
    FieldRequired(&'static str),

    #[error("config lists {expected} motors but {actual} were provided")]
    MotorCount { expected: usize, actual: usize },

    #[error("movement sensor `{0}` is configured but was not provided")]
    MissingMovementSensor(String),

    #[error("no movement sensor")]
    NoMovementSensor,

    #[error("move speed must be finite and non-zero, got {0}")]
    InvalidSpeed(f64),

    #[error("control period must be non-zero")]
    ZeroControlPeriod,

    #[error("expected {expected} power values, got {actual}")]
    PowerCount { expected: usize, actual: usize },

    #[error(transparent)]
    Motor(#[from] MotorError),

    #[error("failed to stop {} motor(s): {}", .0.len(), join(.0))]
    Stop(Vec<MotorError>),

    #[error("{source}; stopping afterwards also failed: {stop}")]
    StopAfterFailure { source: Box<Error>, stop: Box<Error> },

    #[error("movement sensor: {0}")]
    Sensor(#[source] DriverError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("allocation task failed: {0}")]
    AllocationTask(#[from] tokio::task::JoinError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("boat is closed")]
    Closed,
}

impl Error {
    /// Combine the error that aborted a command with the outcome of the stop that followed it.
    pub(crate) fn with_stop(self, stop: Result<()>) -> Self {
        match stop {
            Ok(()) => self,
            Err(stop) => Error::StopAfterFailure {
                source: Box::new(self),
                stop: Box::new(stop),
            },
        }
    }
}

fn join(errors: &[MotorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor_error(index: usize) -> MotorError {
        MotorError {
            index,
            source: "stalled".into(),
        }
    }

    #[test]
    fn stop_lists_every_motor() {
        let err = Error::Stop(vec![motor_error(0), motor_error(2)]);
        assert_eq!(
            err.to_string(),
            "failed to stop 2 motor(s): motor 0: stalled, motor 2: stalled"
        );
    }

    #[test]
    fn with_stop_keeps_original_when_stop_succeeds() {
        let err = Error::from(motor_error(1)).with_stop(Ok(()));
        assert!(matches!(err, Error::Motor(MotorError { index: 1, .. })));
    }

    #[test]
    fn with_stop_combines_both_failures() {
        let err = Error::from(motor_error(1)).with_stop(Err(Error::Stop(vec![motor_error(3)])));
        assert_eq!(
            err.to_string(),
            "motor 1: stalled; stopping afterwards also failed: failed to stop 1 motor(s): motor 3: stalled"
        );
    }
}
