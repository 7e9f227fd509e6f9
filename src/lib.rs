//! # boat-base
//! Thrust allocation and closed-loop motion control for boats with any arrangement of motors.
//!
//! # Geometry
//! [`Config`] describes the hull and where each motor is mounted.
//! [`MotorWeights`] turns one motor's mounting into its lateral, forward and yaw authority,
//! and [`MotorMatrix`] collects them for the whole boat.
//!
//! # Allocation
//! [`Allocator`] searches for the motor powers that best reproduce a motion command
//! (see [`MotorMatrix::compute_power`]).
//!
//! # Control
//! [`Boat`] accepts motion commands and runs the background control loop, closing forward
//! speed and yaw rate with a [`Pid`] per axis and turning to a compass heading with [`heading`].
//!
//! # Hardware
//! [`Motor`] and [`MovementSensor`] are implemented by the host's drivers
//! (see [`PwmMotor`] for motors behind an ESC).

pub mod allocator;
pub use allocator::Allocator;

pub mod boat;
pub use boat::{Boat, Builder, ControlMode, ControlState};

pub mod config;
pub use config::{Config, MotorConfig};

mod error;
pub use error::{DriverError, Error, MotorError, Result};

pub mod heading;

pub mod matrix;
pub use matrix::MotorMatrix;

pub mod motor;
pub use motor::{Motor, MotorWeights, PwmMotor};

pub mod operation;

pub mod pid;
pub use pid::Pid;

pub mod sensor;
pub use sensor::{MovementSensor, NoMovementSensor};
