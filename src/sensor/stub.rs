//! Driver placeholder used until real hardware support lands.

use super::{ImuSensor, SensorError};

/// IMU with no backing driver
///
/// Holds the communication channel it was built with so a real driver can
/// replace it without changing how callers construct it.
#[derive(Debug)]
pub struct UnimplementedImu<N> {
    network: N,
}

impl<N> UnimplementedImu<N> {
    pub fn new(network: N) -> Self {
        Self { network }
    }

    /// The channel this sensor was constructed with
    pub fn network(&self) -> &N {
        &self.network
    }

    fn refuse(operation: &'static str) -> SensorError {
        log::debug!("IMU {} requested but no driver is attached", operation);
        SensorError::NotImplemented { operation }
    }
}

impl<N> ImuSensor for UnimplementedImu<N> {
    fn calibrate(&mut self) -> Result<(), SensorError> {
        Err(Self::refuse("calibrate"))
    }

    fn height(&mut self) -> Result<f32, SensorError> {
        Err(Self::refuse("height"))
    }
}
