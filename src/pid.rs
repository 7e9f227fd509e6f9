use std::time::Duration;

/// A proportional-integral-derivative controller with a clamped output.
///
/// Only the output is clamped. The integral keeps accumulating while the output is saturated.
///
/// A bound of exactly zero disables clamping on that side, so `min_output = 0` does not hold the
/// output at or above zero. Use a small non-zero bound instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Pid {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub min_output: f64,
    pub max_output: f64,
    integral: f64,
    previous_error: f64,
}

impl Default for Pid {
    fn default() -> Self {
        Self::new(0.08, 0.075, 0.0001)
    }
}

impl Pid {
    /// Create a controller clamped to [-1, 1].
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            min_output: -1.,
            max_output: 1.,
            integral: 0.,
            previous_error: 0.,
        }
    }

    pub fn with_limits(mut self, min_output: f64, max_output: f64) -> Self {
        self.min_output = min_output;
        self.max_output = max_output;
        self
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Advance the controller by `dt` and return its output.
    ///
    /// `dt` must be non-zero.
    pub fn control(&mut self, target: f64, current: f64, dt: Duration) -> f64 {
        let dt = dt.as_secs_f64();
        let error = target - current;

        let p = self.kp * error;

        self.integral += error * dt;
        let i = self.ki * self.integral;

        let d = self.kd * (error - self.previous_error) / dt;
        self.previous_error = error;

        let mut output = p + i + d;
        if self.min_output != 0. && output < self.min_output {
            output = self.min_output;
        }
        if self.max_output != 0. && output > self.max_output {
            output = self.max_output;
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn converges_on_first_order_plant() {
        let target = 5.;
        let mut current = 0.;
        let mut pid = Pid::default();
        let dt = Duration::from_millis(100);

        for i in 0..1000 {
            let power = pid.control(target, current, dt);
            current = power * 10.;

            if i > 200 {
                assert_abs_diff_eq!(current, target, epsilon = 0.01);
            }
        }
    }

    #[test]
    fn first_step() {
        let mut pid = Pid::default();
        let output = pid.control(5., 0., Duration::from_millis(500));
        // 0.4 proportional, 0.1875 integral, 0.001 derivative
        assert_abs_diff_eq!(output, 0.5885, epsilon = 1e-9);
        assert_abs_diff_eq!(pid.integral(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn output_is_clamped_but_integral_is_not() {
        let mut pid = Pid::default();
        for _ in 0..10 {
            assert_eq!(pid.control(100., 0., Duration::from_secs(1)), 1.);
        }
        assert_abs_diff_eq!(pid.integral(), 1000., epsilon = 1e-9);

        assert_eq!(pid.control(-100., 0., Duration::from_secs(1)), 1.);
    }

    #[test]
    fn zero_bound_disables_clamping() {
        let mut pid = Pid::new(1., 0., 0.).with_limits(0., 1.);
        assert_eq!(pid.control(0., 3., Duration::from_secs(1)), -3.);

        let mut pid = Pid::new(1., 0., 0.).with_limits(-1., 0.);
        assert_eq!(pid.control(3., 0., Duration::from_secs(1)), 3.);
    }
}
