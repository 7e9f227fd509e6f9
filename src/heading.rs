//! Heading hold: turning a compass error into an angular velocity goal.

/// Beyond this error the boat turns at the full spin rate.
const RAMP_DEGREES: f64 = 5.;

/// Within this error the heading is considered reached.
const HOLD_DEGREES: f64 = 1.;

/// Calculate the angular velocity goal in degrees/second to bring `heading` to `goal`.
///
/// The profile is trapezoidal: full `spin_rate` when more than 5° away, a linear ramp down to
/// zero between 5° and 1°, and zero within 1°. Positive output turns the heading down.
///
/// Neither heading is wrapped, so a goal of 359° with a heading of 1° turns the long way round.
pub fn angular_goal(heading: f64, goal: f64, spin_rate: f64) -> f64 {
    let diff = heading - goal;

    if diff.abs() > RAMP_DEGREES {
        diff.signum() * spin_rate
    } else if diff.abs() > HOLD_DEGREES {
        diff / RAMP_DEGREES * spin_rate
    } else {
        0.
    }
}

/// The absolute difference between two angles in degrees, in [0, 180].
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.);
    if diff > 180. {
        360. - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn full_rate_far_from_goal() {
        assert_eq!(angular_goal(10., 0., 30.), 30.);
        assert_eq!(angular_goal(0., 10., 30.), -30.);
        assert_eq!(angular_goal(190., 10., 30.), 30.);
    }

    #[test]
    fn ramps_down_near_goal() {
        assert_abs_diff_eq!(angular_goal(3., 0., 30.), 18., epsilon = 1e-12);
        assert_abs_diff_eq!(angular_goal(0., 3., 30.), -18., epsilon = 1e-12);
        assert_abs_diff_eq!(angular_goal(105., 100., 30.), 30., epsilon = 1e-12);
    }

    #[test]
    fn holds_at_goal() {
        assert_eq!(angular_goal(0.5, 0., 30.), 0.);
        assert_eq!(angular_goal(-1., 0., 30.), 0.);
        assert_eq!(angular_goal(42., 42., 30.), 0.);
    }

    #[test]
    fn goal_past_north_is_not_wrapped() {
        // A spin of +20° from 350° puts the goal at 370°. A compass reading of 10° is on target,
        // but the shaper sees 360° of error and keeps turning.
        assert_eq!(angular_goal(10., 370., 30.), -30.);
        assert_abs_diff_eq!(angle_diff_deg(370., 10.), 0., epsilon = 1e-12);
    }

    #[test]
    fn angle_diff_wraps() {
        assert_abs_diff_eq!(angle_diff_deg(10., 350.), 20., epsilon = 1e-12);
        assert_abs_diff_eq!(angle_diff_deg(350., 10.), 20., epsilon = 1e-12);
        assert_abs_diff_eq!(angle_diff_deg(-90., 90.), 180., epsilon = 1e-12);
        assert_abs_diff_eq!(angle_diff_deg(45., 45.), 0., epsilon = 1e-12);
    }
}
