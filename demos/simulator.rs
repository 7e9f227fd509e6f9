//! Drive a simulated four-motor boat through a short mission.
//!
//! Run with `RUST_LOG=info cargo run --example simulator`.

use boat_base::{Boat, Config, DriverError, Motor, MotorConfig, MovementSensor};
use log::info;
use nalgebra::Vector3;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Steady forward speed in mm/s per unit of forward thrust.
const SPEED_PER_THRUST: f64 = 250.;

/// Steady yaw rate in deg/s per unit of normalised torque.
const YAW_RATE_PER_TORQUE: f64 = 40.;

/// Time constant of the hull's response to thrust.
const RESPONSE_SECS: f64 = 0.8;

const STEP: Duration = Duration::from_millis(20);

struct Hull {
    config: Config,
    powers: Vec<f64>,
    forward_mm_s: f64,
    yaw_deg_s: f64,
    heading: f64,
    travelled_mm: f64,
}

impl Hull {
    /// Forward thrust and torque `r × F` about the hull center, counter-clockwise positive.
    fn thrust(&self) -> (f64, f64) {
        let diagonal = self.config.diagonal_mm();
        self.config
            .motors
            .iter()
            .zip(&self.powers)
            .fold((0., 0.), |(forward, torque), (motor, power)| {
                let (sin, cos) = motor.angle_degrees.to_radians().sin_cos();
                let force_x = power * motor.weight * sin;
                let force_y = power * motor.weight * cos;
                (
                    forward + force_y,
                    torque + (motor.x_offset_mm * force_y - motor.y_offset_mm * force_x) / diagonal,
                )
            })
    }

    fn step(&mut self, dt: f64) {
        let (forward, torque) = self.thrust();

        let alpha = dt / RESPONSE_SECS;
        self.forward_mm_s += (forward * SPEED_PER_THRUST - self.forward_mm_s) * alpha;
        self.yaw_deg_s += (torque * YAW_RATE_PER_TORQUE - self.yaw_deg_s) * alpha;

        // Positive yaw is counter-clockwise, the compass turns clockwise
        self.heading = (self.heading - self.yaw_deg_s * dt).rem_euclid(360.);
        self.travelled_mm += self.forward_mm_s * dt;
    }
}

struct SimMotor {
    index: usize,
    hull: Arc<Mutex<Hull>>,
}

impl SimMotor {
    fn write(&self, power: f64) {
        self.hull.lock().unwrap().powers[self.index] = power;
    }
}

impl Motor for SimMotor {
    async fn set_power(&self, power: f64) -> Result<(), DriverError> {
        self.write(power);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.write(0.);
        Ok(())
    }

    async fn is_powered(&self) -> Result<bool, DriverError> {
        Ok(self.hull.lock().unwrap().powers[self.index] != 0.)
    }
}

struct SimSensor {
    hull: Arc<Mutex<Hull>>,
}

impl MovementSensor for SimSensor {
    async fn angular_velocity(&self) -> Result<Vector3<f64>, DriverError> {
        Ok(Vector3::new(0., 0., self.hull.lock().unwrap().yaw_deg_s))
    }

    async fn linear_velocity(&self) -> Result<Vector3<f64>, DriverError> {
        Ok(Vector3::new(0., self.hull.lock().unwrap().forward_mm_s, 0.))
    }

    async fn compass_heading(&self) -> Result<f64, DriverError> {
        Ok(self.hull.lock().unwrap().heading)
    }
}

fn config() -> Config {
    Config {
        motors: vec![
            MotorConfig::new("port", -200., -500.),
            MotorConfig::new("starboard", 200., -500.),
            MotorConfig::new("bow", 0., 500.).with_angle(90.),
            MotorConfig::new("stern", 0., -500.).with_angle(90.),
        ],
        length_mm: 1000.,
        width_mm: 500.,
        movement_sensor: Some("imu".into()),
    }
}

#[tokio::main]
async fn main() -> boat_base::Result<()> {
    env_logger::init();

    let config = config();
    let hull = Arc::new(Mutex::new(Hull {
        config: config.clone(),
        powers: vec![0.; config.motors.len()],
        forward_mm_s: 0.,
        yaw_deg_s: 0.,
        heading: 0.,
        travelled_mm: 0.,
    }));

    let motors: Vec<_> = (0..config.motors.len())
        .map(|index| SimMotor {
            index,
            hull: hull.clone(),
        })
        .collect();

    let boat = Boat::builder(config.clone())
        .motors(motors)
        .movement_sensor(SimSensor { hull: hull.clone() })
        .control_period(Duration::from_millis(100))
        .build()?;

    let physics = {
        let hull = hull.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STEP);
            loop {
                interval.tick().await;
                hull.lock().unwrap().step(STEP.as_secs_f64());
            }
        })
    };

    info!("cruising at 300 mm/s");
    boat.set_velocity(Vector3::new(0., 300., 0.), Vector3::zeros())
        .await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    info!("speed {:.0} mm/s", hull.lock().unwrap().forward_mm_s);

    boat.stop().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    boat.spin(90., 30.).await?;
    info!("heading {:.1}", hull.lock().unwrap().heading);

    let start = hull.lock().unwrap().travelled_mm;
    boat.move_straight(1000, 200.).await?;
    info!(
        "travelled {:.0} mm",
        hull.lock().unwrap().travelled_mm - start
    );

    boat.close().await?;
    physics.abort();
    Ok(())
}
