use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use super::{Boat, Control, Shared};
use crate::{
    operation::OperationManager, Allocator, Config, Error, Motor, MotorMatrix, MovementSensor,
    NoMovementSensor, Result,
};

/// How often the control loop samples the movement sensor by default.
pub const DEFAULT_CONTROL_PERIOD: Duration = Duration::from_millis(500);

/// Builder for a [`Boat`] from its configuration and resolved components.
pub struct Builder<M, S = NoMovementSensor> {
    config: Config,
    motors: Vec<M>,
    movement_sensor: Option<S>,
    control_period: Duration,
    allocator: Allocator,
}

impl<M> Builder<M> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            motors: Vec::new(),
            movement_sensor: None,
            control_period: DEFAULT_CONTROL_PERIOD,
            allocator: Allocator::default(),
        }
    }
}

impl<M, S> Builder<M, S> {
    /// Motors in the same order as `Config::motors`.
    pub fn motors(mut self, motors: impl IntoIterator<Item = M>) -> Self {
        self.motors = motors.into_iter().collect();
        self
    }

    pub fn movement_sensor<T>(self, sensor: T) -> Builder<M, T> {
        Builder {
            config: self.config,
            motors: self.motors,
            movement_sensor: Some(sensor),
            control_period: self.control_period,
            allocator: self.allocator,
        }
    }

    /// Interval between control loop ticks, also used as the controllers' time step.
    pub fn control_period(mut self, period: Duration) -> Self {
        self.control_period = period;
        self
    }

    pub fn allocator(mut self, allocator: Allocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn build(self) -> Result<Boat<M, S>>
    where
        M: Motor,
        S: MovementSensor,
    {
        self.config.validate()?;

        if self.motors.len() != self.config.motors.len() {
            return Err(Error::MotorCount {
                expected: self.config.motors.len(),
                actual: self.motors.len(),
            });
        }

        if let Some(name) = self.config.movement_sensor.as_ref() {
            if !name.is_empty() && self.movement_sensor.is_none() {
                return Err(Error::MissingMovementSensor(name.clone()));
            }
        }

        if self.control_period.is_zero() {
            return Err(Error::ZeroControlPeriod);
        }

        let matrix = MotorMatrix::from_config(&self.config).with_allocator(self.allocator);

        Ok(Boat {
            shared: Arc::new(Shared {
                config: self.config,
                matrix: Arc::new(matrix),
                motors: self.motors,
                sensor: self.movement_sensor,
                control: Mutex::new(Control::default()),
                output: tokio::sync::Mutex::new(()),
                operations: OperationManager::new(),
                control_period: self.control_period,
            }),
        })
    }
}
