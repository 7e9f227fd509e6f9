//! The boat: commands, shared control state and the background control loop.

use log::{debug, info};
use nalgebra::Vector3;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    heading, operation::OperationManager, Config, Error, Motor, MotorError, MotorMatrix,
    MovementSensor, NoMovementSensor, Result,
};

mod builder;
pub use builder::{Builder, DEFAULT_CONTROL_PERIOD};

mod control_loop;
use control_loop::ControlLoop;

mod state;
pub use state::{ControlMode, ControlState};

/// How often a spin checks whether the compass has reached its goal.
const SPIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A spin is done once the compass is within this many degrees of the goal.
const SPIN_TOLERANCE_DEGREES: f64 = 1.;

/// A boat driven by any number of motors, with an optional movement sensor for closed-loop
/// velocity and heading control.
///
/// Commands may be issued concurrently from any task. The most recent command wins: it cancels
/// any blocking command still waiting and replaces the goals of the control loop.
///
/// The control loop is started by the first command that needs it and runs until [`Boat::close`]
/// is called or the boat is dropped.
pub struct Boat<M, S = NoMovementSensor> {
    shared: Arc<Shared<M, S>>,
}

pub(crate) struct Shared<M, S> {
    config: Config,
    matrix: Arc<MotorMatrix>,
    motors: Vec<M>,
    sensor: Option<S>,
    control: Mutex<Control>,
    /// Held while powers are being written to the motors.
    output: tokio::sync::Mutex<()>,
    operations: OperationManager,
    control_period: Duration,
}

#[derive(Default)]
struct Control {
    state: ControlState,
    control_loop: Option<ControlLoop>,
    /// Set by `close`; no control loop is started afterwards.
    closed: bool,
}

impl<M> Boat<M> {
    pub fn builder(config: Config) -> Builder<M> {
        Builder::new(config)
    }
}

impl<M, S> Boat<M, S>
where
    M: Motor + 'static,
    S: MovementSensor + 'static,
{
    /// Drive `distance_mm` straight ahead at `mm_per_sec`, then stop.
    ///
    /// A negative distance reverses the direction of travel. A zero distance only stops the boat.
    /// Requires a movement sensor.
    ///
    /// If another command is issued before the distance is covered this returns
    /// [`Error::Cancelled`] and leaves the boat under that command's control.
    pub async fn move_straight(&self, distance_mm: i64, mm_per_sec: f64) -> Result<()> {
        let mm_per_sec = if distance_mm < 0 {
            -mm_per_sec
        } else {
            mm_per_sec
        };
        let distance_mm = distance_mm.unsigned_abs();

        if distance_mm == 0 {
            return self.stop().await;
        }
        if !mm_per_sec.is_finite() || mm_per_sec == 0. {
            return Err(Error::InvalidSpeed(mm_per_sec));
        }

        let duration = Duration::try_from_secs_f64(distance_mm as f64 / mm_per_sec.abs())
            .map_err(|_| Error::InvalidSpeed(mm_per_sec))?;
        info!(
            "moving {} mm at {} mm/s for {:?}",
            distance_mm, mm_per_sec, duration
        );

        self.set_velocity(Vector3::new(0., mm_per_sec, 0.), Vector3::zeros())
            .await?;

        let mut operation = self.shared.operations.begin();
        operation.sleep(duration).await?;
        drop(operation);

        self.stop().await
    }

    /// Turn in place by `angle_deg` at up to `degs_per_sec`, returning once the compass is within
    /// a degree of the goal.
    ///
    /// Requires a movement sensor. Returns [`Error::Cancelled`] if another command is issued first.
    pub async fn spin(&self, angle_deg: f64, degs_per_sec: f64) -> Result<()> {
        let sensor = self.shared.sensor()?;
        let start = sensor.compass_heading().await.map_err(Error::Sensor)?;
        let goal = start + angle_deg;
        info!(
            "spinning {} degrees at {} deg/s, compass {:.1} goal {:.1}",
            angle_deg, degs_per_sec, start, goal
        );

        let mut operation = self.shared.operations.begin();
        {
            let mut control = self.shared.control();
            self.start_control_loop(&mut control)?;
            control.state.hold_heading(goal, degs_per_sec);
        }

        operation
            .wait_for_success(SPIN_POLL_INTERVAL, move || async move {
                let compass = sensor.compass_heading().await.map_err(Error::Sensor)?;
                Ok(heading::angle_diff_deg(goal, compass) < SPIN_TOLERANCE_DEGREES)
            })
            .await
    }

    /// Hold a linear velocity in millimetres/second and an angular velocity in degrees/second.
    ///
    /// Only the forward (`linear.y`) and yaw (`angular.z`) components are controlled. Returns
    /// immediately; the control loop keeps the goals until the next command.
    /// Requires a movement sensor.
    pub async fn set_velocity(&self, linear: Vector3<f64>, angular: Vector3<f64>) -> Result<()> {
        debug!("set velocity linear {:?} angular {:?}", linear, angular);
        self.shared.operations.cancel_running();

        let mut control = self.shared.control();
        self.start_control_loop(&mut control)?;
        control.state.hold_velocity(linear, angular);
        Ok(())
    }

    /// Command raw power, each component a fraction in [-1, 1] of the boat's authority.
    ///
    /// Only lateral (`linear.x`), forward (`linear.y`) and yaw (`angular.z`) are used. This
    /// takes over from the control loop until the next velocity command.
    pub async fn set_power(&self, linear: Vector3<f64>, angular: Vector3<f64>) -> Result<()> {
        debug!("set power linear {:?} angular {:?}", linear, angular);
        self.shared.operations.cancel_running();
        self.shared.control().state.release();

        let _output = self.shared.output.lock().await;
        self.shared.dispatch(linear, angular).await
    }

    /// Zero all goals, cancel any blocking command and stop every motor.
    ///
    /// Every motor is asked to stop even if some fail; the failures are returned together.
    pub async fn stop(&self) -> Result<()> {
        self.shared.control().state.stop();
        self.shared.operations.cancel_running();

        let _output = self.shared.output.lock().await;
        self.shared.stop_motors().await
    }

    /// Returns `true` if any motor is powered.
    pub async fn is_moving(&self) -> Result<bool> {
        for (index, motor) in self.shared.motors.iter().enumerate() {
            let powered = motor
                .is_powered()
                .await
                .map_err(|source| MotorError { index, source })?;
            if powered {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Stop the control loop, wait for it to exit and stop every motor.
    ///
    /// Commands that need the control loop fail with [`Error::Closed`] afterwards.
    pub async fn close(&self) -> Result<()> {
        let control_loop = {
            let mut control = self.shared.control();
            control.closed = true;
            control.control_loop.take()
        };
        if let Some(control_loop) = control_loop {
            control_loop.shutdown().await;
        }

        self.stop().await
    }

    fn start_control_loop(&self, control: &mut Control) -> Result<()> {
        if control.closed {
            return Err(Error::Closed);
        }
        if control.control_loop.is_some() {
            return Ok(());
        }
        self.shared.sensor()?;

        control.control_loop = Some(ControlLoop::spawn(
            self.shared.clone(),
            self.shared.control_period,
        ));
        Ok(())
    }
}

impl<M, S> Boat<M, S> {
    /// Hull width in millimetres, rounded down.
    pub fn width(&self) -> u32 {
        self.shared.config.width_mm as u32
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn matrix(&self) -> &MotorMatrix {
        &self.shared.matrix
    }

    pub fn motors(&self) -> &[M] {
        &self.shared.motors
    }

    pub fn control_mode(&self) -> ControlMode {
        self.shared.control().state.mode
    }

    /// A snapshot of the goals and controllers.
    pub fn control_state(&self) -> ControlState {
        self.shared.control().state.clone()
    }

    pub fn is_control_loop_running(&self) -> bool {
        self.shared.control().control_loop.is_some()
    }
}

impl<M, S> Drop for Boat<M, S> {
    fn drop(&mut self) {
        if let Some(control_loop) = self.shared.control().control_loop.take() {
            control_loop.cancel();
        }
    }
}

impl<M, S> Shared<M, S> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sensor(&self) -> Result<&S> {
        self.sensor.as_ref().ok_or(Error::NoMovementSensor)
    }
}

impl<M, S> Shared<M, S>
where
    M: Motor,
    S: MovementSensor,
{
    /// Read the sensor and issue the next command of the current mode.
    async fn tick(&self, dt: Duration) -> Result<()> {
        let sensor = self.sensor()?;
        let angular_velocity = sensor.angular_velocity().await.map_err(Error::Sensor)?;
        let linear_velocity = sensor.linear_velocity().await.map_err(Error::Sensor)?;
        let heading = sensor.compass_heading().await.map_err(Error::Sensor)?;

        // Computed under the output lock so a concurrent stop is never overwritten
        let _output = self.output.lock().await;
        let command =
            self.control()
                .state
                .next_command(heading, linear_velocity, angular_velocity, dt);

        match command {
            Some((linear, angular)) => self.dispatch(linear, angular).await,
            None => Ok(()),
        }
    }

    /// Solve for the motor powers of a command and apply them. The output lock must be held.
    ///
    /// If a motor rejects its power every motor is stopped, but the goals, mode and any waiting
    /// operation are left alone: the control loop retries on its next tick, and a caller that
    /// wants the boat to stay stopped calls [`Boat::stop`].
    async fn dispatch(&self, linear: Vector3<f64>, angular: Vector3<f64>) -> Result<()> {
        let matrix = self.matrix.clone();
        let powers =
            tokio::task::spawn_blocking(move || matrix.compute_power(linear, angular)).await??;
        debug!("powers {:?}", powers);

        for (index, (motor, power)) in self.motors.iter().zip(powers).enumerate() {
            if let Err(source) = motor.set_power(power).await {
                let error = Error::from(MotorError { index, source });
                return Err(error.with_stop(self.stop_motors().await));
            }
        }
        Ok(())
    }

    async fn stop_motors(&self) -> Result<()> {
        let mut failures = Vec::new();
        for (index, motor) in self.motors.iter().enumerate() {
            if let Err(source) = motor.stop().await {
                failures.push(MotorError { index, source });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Stop(failures))
        }
    }
}
