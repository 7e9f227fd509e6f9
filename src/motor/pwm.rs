use embedded_hal::PwmPin;
use num_traits::{NumCast, ToPrimitive};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Motor;
use crate::DriverError;

/// A bidirectional motor driven by a PWM pin, such as a reversible ESC.
///
/// Power in [-1, 1] maps linearly onto the duty range `[min, max]`, with zero power at the
/// midpoint.
pub struct PwmMotor<P: PwmPin> {
    min: P::Duty,
    max: P::Duty,
    inner: Mutex<Inner<P>>,
}

struct Inner<P> {
    pin: P,
    power: f64,
}

impl<P> PwmMotor<P>
where
    P: PwmPin,
    P::Duty: NumCast + ToPrimitive + Copy,
{
    /// Create a new motor and enable its pin at neutral duty.
    pub fn new(min: P::Duty, max: P::Duty, mut pin: P) -> Result<Self, DriverError> {
        pin.enable();
        let motor = Self {
            min,
            max,
            inner: Mutex::new(Inner { pin, power: 0. }),
        };
        motor.output(0.)?;
        Ok(motor)
    }

    /// The duty cycle that produces `power`.
    pub fn duty(&self, power: f64) -> Result<P::Duty, DriverError> {
        let min = self.min.to_f64().ok_or("min duty is not representable")?;
        let max = self.max.to_f64().ok_or("max duty is not representable")?;

        let power = power.clamp(-1., 1.);
        let duty = (power + 1.) * (max - min) / 2. + min;
        <P::Duty as NumCast>::from(duty.round())
            .ok_or_else(|| format!("duty {duty} is out of range").into())
    }

    /// The last commanded power.
    pub fn power(&self) -> f64 {
        self.inner().power
    }

    fn output(&self, power: f64) -> Result<(), DriverError> {
        let duty = self.duty(power)?;
        let mut inner = self.inner();
        inner.pin.set_duty(duty);
        inner.power = power.clamp(-1., 1.);
        Ok(())
    }

    fn inner(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> Motor for PwmMotor<P>
where
    P: PwmPin + Send,
    P::Duty: NumCast + ToPrimitive + Copy + Send + Sync,
{
    async fn set_power(&self, power: f64) -> Result<(), DriverError> {
        self.output(power)
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.output(0.)
    }

    async fn is_powered(&self) -> Result<bool, DriverError> {
        Ok(self.power() != 0.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestPin {
        duty: u16,
        enabled: bool,
    }

    impl PwmPin for TestPin {
        type Duty = u16;

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            2000
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    fn duty(motor: &PwmMotor<TestPin>) -> u16 {
        motor.inner().pin.get_duty()
    }

    #[test]
    fn starts_enabled_at_neutral() {
        let motor = PwmMotor::new(1000, 2000, TestPin::default()).unwrap();
        assert!(motor.inner().pin.enabled);
        assert_eq!(duty(&motor), 1500);
    }

    #[test]
    fn maps_power_onto_duty_range() {
        let motor = PwmMotor::new(1100, 1900, TestPin::default()).unwrap();
        assert_eq!(motor.duty(-1.).unwrap(), 1100);
        assert_eq!(motor.duty(0.).unwrap(), 1500);
        assert_eq!(motor.duty(0.5).unwrap(), 1700);
        assert_eq!(motor.duty(1.).unwrap(), 1900);
        assert_eq!(motor.duty(3.).unwrap(), 1900);
    }

    #[tokio::test]
    async fn stop_returns_to_neutral() {
        let motor = PwmMotor::new(1000, 2000, TestPin::default()).unwrap();

        motor.set_power(-0.5).await.unwrap();
        assert_eq!(duty(&motor), 1250);
        assert!(motor.is_powered().await.unwrap());

        motor.stop().await.unwrap();
        assert_eq!(duty(&motor), 1500);
        assert!(!motor.is_powered().await.unwrap());
    }
}
