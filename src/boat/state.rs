use log::debug;
use nalgebra::Vector3;
use std::time::Duration;

use crate::{heading, Pid};

/// What the control loop is currently holding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlMode {
    /// The loop issues no commands.
    #[default]
    None,
    /// Hold the linear and angular velocity goals.
    Velocity,
    /// Turn towards the heading goal.
    Heading,
}

/// Goals and controllers shared between the command methods and the control loop.
#[derive(Clone, Debug, Default)]
pub struct ControlState {
    pub mode: ControlMode,
    /// Velocity goal in millimetres/second; `y` is forward.
    pub linear_goal: Vector3<f64>,
    /// Velocity goal in degrees/second; `z` is yaw.
    pub angular_goal: Vector3<f64>,
    /// Compass heading to turn to in degrees.
    pub heading_goal: f64,
    /// Turn rate while far from the heading goal in degrees/second.
    pub spin_rate: f64,
    pub linear_pid: Pid,
    pub angular_pid: Pid,
}

impl ControlState {
    pub fn hold_velocity(&mut self, linear: Vector3<f64>, angular: Vector3<f64>) {
        self.mode = ControlMode::Velocity;
        self.linear_goal = linear;
        self.angular_goal = angular;
    }

    /// Turn to `heading_goal` at up to `spin_rate` degrees/second without moving forward.
    pub fn hold_heading(&mut self, heading_goal: f64, spin_rate: f64) {
        self.mode = ControlMode::Heading;
        self.heading_goal = heading_goal;
        self.spin_rate = spin_rate;
        self.linear_goal = Vector3::zeros();
        self.angular_goal = Vector3::zeros();
    }

    /// Stop issuing commands, keeping the goals.
    pub fn release(&mut self) {
        self.mode = ControlMode::None;
    }

    /// Zero every goal and stop issuing commands.
    pub fn stop(&mut self) {
        self.linear_goal = Vector3::zeros();
        self.angular_goal = Vector3::zeros();
        self.release();
    }

    /// Calculate the next power command from the latest measurements, if the current mode
    /// issues one.
    ///
    /// In heading mode the angular goal is first reshaped from the compass error.
    pub fn next_command(
        &mut self,
        heading: f64,
        linear_velocity: Vector3<f64>,
        angular_velocity: Vector3<f64>,
        dt: Duration,
    ) -> Option<(Vector3<f64>, Vector3<f64>)> {
        match self.mode {
            ControlMode::None => None,
            ControlMode::Velocity => {
                Some(self.compute_next_power(linear_velocity, angular_velocity, dt))
            }
            ControlMode::Heading => {
                self.angular_goal.z =
                    heading::angular_goal(heading, self.heading_goal, self.spin_rate);
                debug!(
                    "heading {:.1} goal {:.1} angular goal {:.2} measured {:.2}",
                    heading, self.heading_goal, self.angular_goal.z, angular_velocity.z
                );
                Some(self.compute_next_power(linear_velocity, angular_velocity, dt))
            }
        }
    }

    /// Run both controllers once and return the `(linear, angular)` power command.
    ///
    /// Only forward speed and yaw rate are closed-loop; the lateral power is always zero.
    pub fn compute_next_power(
        &mut self,
        linear_velocity: Vector3<f64>,
        angular_velocity: Vector3<f64>,
        dt: Duration,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let forward = self
            .linear_pid
            .control(self.linear_goal.y, linear_velocity.y, dt);
        let yaw = self
            .angular_pid
            .control(self.angular_goal.z, angular_velocity.z, dt);

        (Vector3::new(0., forward, 0.), Vector3::new(0., 0., yaw))
    }
}
