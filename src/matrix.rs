use nalgebra::{Matrix3xX, Vector3};

use crate::{
    allocator::{AllocationError, Allocator},
    motor::MotorWeights,
    Config, Error, Result,
};

/// Requested components below this magnitude skip the cross-axis correction.
const GOAL_DEADBAND: f64 = 0.05;

/// The weights of every motor on a boat, and the solver that turns motion commands into powers.
///
/// Each column of the weight matrix is one motor's `[lateral, forward, yaw]` contribution at full
/// power, so the boat's motion for a power vector `p` is `W * p`.
#[derive(Clone, Debug)]
pub struct MotorMatrix {
    weights: Matrix3xX<f64>,
    envelope: MotorWeights,
    allocator: Allocator,
}

impl MotorMatrix {
    pub fn from_config(config: &Config) -> Self {
        let diagonal = config.diagonal_mm();
        let weights: Vec<_> = config
            .motors
            .iter()
            .map(|motor| MotorWeights::from_motor(motor, diagonal))
            .collect();
        Self::from_weights(&weights)
    }

    pub fn from_weights(weights: &[MotorWeights]) -> Self {
        Self {
            weights: Matrix3xX::from_fn(weights.len(), |row, col| weights[col].to_vector()[row]),
            envelope: weights.iter().map(MotorWeights::abs).sum(),
            allocator: Allocator::default(),
        }
    }

    pub fn with_allocator(mut self, allocator: Allocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn len(&self) -> usize {
        self.weights.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weights(&self) -> &Matrix3xX<f64> {
        &self.weights
    }

    /// Maximum authority on each axis with every motor at full power.
    pub fn envelope(&self) -> MotorWeights {
        self.envelope
    }

    /// Scale a command, each component a fraction in [-1, 1] of the boat's authority, into
    /// the goal the allocator should reproduce.
    ///
    /// Only `x` (lateral) and `y` (forward) of `linear` and `z` (yaw) of `angular` are used.
    /// The linear goal keeps the requested direction when one axis has more authority than the
    /// other; the angular goal is scaled on its own.
    pub fn goal(&self, linear: Vector3<f64>, angular: Vector3<f64>) -> MotorWeights {
        let mut goal = MotorWeights::new(
            self.envelope.lateral * linear.x,
            self.envelope.forward * linear.y,
            self.envelope.yaw * angular.z,
        );

        goal.lateral = goal_scale(goal.lateral, goal.forward, linear.x, linear.y);
        goal.forward = goal_scale(goal.forward, goal.lateral, linear.y, linear.x);

        goal
    }

    /// The motion produced by `powers`, one per motor.
    pub fn output(&self, powers: &[f64]) -> Result<MotorWeights> {
        if powers.len() != self.len() {
            return Err(Error::PowerCount {
                expected: self.len(),
                actual: powers.len(),
            });
        }
        Ok(self.product(powers).into())
    }

    fn product(&self, powers: &[f64]) -> Vector3<f64> {
        self.weights
            .column_iter()
            .zip(powers)
            .fold(Vector3::zeros(), |acc, (column, power)| acc + column * *power)
    }

    /// Solve for the motor powers, each in [-1, 1], that best reproduce a command.
    pub fn compute_power(
        &self,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
    ) -> core::result::Result<Vec<f64>, AllocationError> {
        let goal = self.goal(linear, angular).to_vector();

        let solution = self.allocator.minimize(self.len(), |powers| {
            (self.product(powers) - goal).norm_squared()
        })?;

        Ok(solution.x.into_iter().map(|p| p.clamp(-1., 1.)).collect())
    }
}

/// Shrink `current` so the ratio between the two achieved components does not exceed the ratio
/// between the two requested components.
///
/// For example with `current = 2`, `other = 1` and both goals 1, the result is 1.
pub fn goal_scale(current: f64, other: f64, current_goal: f64, other_goal: f64) -> f64 {
    if current_goal.abs() < GOAL_DEADBAND || other_goal.abs() < GOAL_DEADBAND {
        return current;
    }

    let ratio_goal = (current_goal / other_goal).abs();
    let ratio_current = (current / other).abs();

    if ratio_current > ratio_goal {
        other * ratio_goal
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MotorConfig;
    use approx::assert_abs_diff_eq;

    /// Two stern drives, a bow thruster and a stern thruster.
    fn four_motor_config() -> Config {
        Config {
            motors: vec![
                MotorConfig::new("port", -200., -500.),
                MotorConfig::new("starboard", 200., -500.),
                MotorConfig::new("bow", 0., 500.).with_angle(90.),
                MotorConfig::new("stern", 0., -500.).with_angle(90.),
            ],
            length_mm: 1000.,
            width_mm: 500.,
            movement_sensor: None,
        }
    }

    fn assert_close(actual: MotorWeights, expected: MotorWeights) {
        // sqrt of the default stop value
        let tolerance = 0.045;
        assert_abs_diff_eq!(actual.lateral, expected.lateral, epsilon = tolerance);
        assert_abs_diff_eq!(actual.forward, expected.forward, epsilon = tolerance);
        assert_abs_diff_eq!(actual.yaw, expected.yaw, epsilon = tolerance);
    }

    #[test]
    fn goal_scale_examples() {
        assert_eq!(goal_scale(2., 1., 1., 1.), 1.);
        assert_eq!(goal_scale(-2., 1., 1., 1.), 1.);
        assert_eq!(goal_scale(0.5, 1., 1., 1.), 0.5);
        // Inside the deadband nothing changes
        assert_eq!(goal_scale(2., 1., 1., 0.01), 2.);
        assert_eq!(goal_scale(2., 1., 0.01, 1.), 2.);
    }

    #[test]
    fn envelope_is_sum_of_absolute_weights() {
        let matrix = MotorMatrix::from_config(&four_motor_config());
        let envelope = matrix.envelope();
        let diagonal = 500f64.hypot(1000.);

        assert_abs_diff_eq!(envelope.lateral, 2., epsilon = 1e-9);
        assert_abs_diff_eq!(envelope.forward, 2., epsilon = 1e-9);
        assert_abs_diff_eq!(envelope.yaw, (200. + 200. + 500. + 500.) / diagonal, epsilon = 1e-9);
        assert!(envelope.lateral >= 0. && envelope.forward >= 0. && envelope.yaw >= 0.);
    }

    #[test]
    fn goal_keeps_requested_direction() {
        let matrix = MotorMatrix::from_weights(&[
            MotorWeights::new(0., 2., 0.),
            MotorWeights::new(1., 0., 0.),
        ]);

        // Forward has twice the authority of lateral, but equal amounts were asked for
        let goal = matrix.goal(Vector3::new(1., 1., 0.), Vector3::zeros());
        assert_eq!(goal, MotorWeights::new(1., 1., 0.));

        let goal = matrix.goal(Vector3::new(0., 0.5, 0.), Vector3::new(0., 0., 1.));
        assert_eq!(goal, MotorWeights::new(0., 1., 0.));
    }

    #[test]
    fn output_is_weighted_sum() {
        let matrix = MotorMatrix::from_config(&four_motor_config());
        let output = matrix.output(&[1., 1., 0., 0.]).unwrap();
        assert_close(output, MotorWeights::new(0., 2., 0.));

        assert!(matches!(
            matrix.output(&[1.]),
            Err(Error::PowerCount {
                expected: 4,
                actual: 1
            })
        ));
    }

    #[test]
    fn forward_command_round_trip() {
        let matrix = MotorMatrix::from_config(&four_motor_config());
        let linear = Vector3::new(0., 0.5, 0.);

        let powers = matrix.compute_power(linear, Vector3::zeros()).unwrap();
        assert_eq!(powers.len(), 4);
        assert!(powers.iter().all(|p| (-1. ..=1.).contains(p)));

        let output = matrix.output(&powers).unwrap();
        assert_close(output, matrix.goal(linear, Vector3::zeros()));
    }

    #[test]
    fn turn_in_place_round_trip() {
        let matrix = MotorMatrix::from_config(&four_motor_config());
        let angular = Vector3::new(0., 0., 0.3);

        let powers = matrix.compute_power(Vector3::zeros(), angular).unwrap();
        let output = matrix.output(&powers).unwrap();
        assert_close(output, matrix.goal(Vector3::zeros(), angular));
    }

    #[test]
    fn two_motor_round_trip() {
        let config = Config {
            motors: vec![
                MotorConfig::new("port", -300., -400.),
                MotorConfig::new("starboard", 300., -400.),
            ],
            length_mm: 1000.,
            width_mm: 800.,
            movement_sensor: None,
        };
        let matrix = MotorMatrix::from_config(&config);
        let linear = Vector3::new(0., 0.4, 0.);
        let angular = Vector3::new(0., 0., 0.2);

        let powers = matrix.compute_power(linear, angular).unwrap();
        let output = matrix.output(&powers).unwrap();
        assert_close(output, matrix.goal(linear, angular));
    }

    #[test]
    fn six_motor_round_trip() {
        let config = Config {
            motors: vec![
                MotorConfig::new("port", -250., -600.),
                MotorConfig::new("starboard", 250., -600.),
                MotorConfig::new("bow port", -150., 600.).with_angle(-45.),
                MotorConfig::new("bow starboard", 150., 600.).with_angle(45.),
                MotorConfig::new("stern", 0., -600.).with_angle(90.),
                MotorConfig::new("center", 0., 0.).with_weight(0.5),
            ],
            length_mm: 1500.,
            width_mm: 600.,
            movement_sensor: None,
        };
        let matrix = MotorMatrix::from_config(&config);
        let linear = Vector3::new(0.2, 0.3, 0.);
        let angular = Vector3::new(0., 0., -0.1);

        let powers = matrix.compute_power(linear, angular).unwrap();
        let output = matrix.output(&powers).unwrap();
        assert_close(output, matrix.goal(linear, angular));
    }

    #[test]
    fn allocation_errors_propagate() {
        let matrix = MotorMatrix::from_weights(&[]);
        assert_eq!(
            matrix.compute_power(Vector3::zeros(), Vector3::zeros()),
            Err(AllocationError::NoMotors)
        );
    }
}
