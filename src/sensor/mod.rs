//! Height sensor contract
//!
//! `ImuSensor` is the capability surface a height-sensing IMU driver
//! provides. Concrete drivers talk to hardware over a communication
//! channel handed to them at construction.
//!
//! Only the unimplemented variant ships today; it refuses every
//! operation with [`SensorError::NotImplemented`].

mod stub;

use thiserror::Error;

pub use stub::UnimplementedImu;

/// Errors reported by height sensor drivers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("{operation} is not implemented by this driver")]
    NotImplemented { operation: &'static str },

    #[error("Channel error: {0}")]
    Channel(String),
}

/// A height-sensing IMU driver
pub trait ImuSensor {
    /// Calibrate the sensor in place
    fn calibrate(&mut self) -> Result<(), SensorError>;

    /// Current height reading in metres
    fn height(&mut self) -> Result<f32, SensorError>;
}

impl<S: ImuSensor + ?Sized> ImuSensor for Box<S> {
    fn calibrate(&mut self) -> Result<(), SensorError> {
        (**self).calibrate()
    }

    fn height(&mut self) -> Result<f32, SensorError> {
        (**self).height()
    }
}
