//! Register-level drivers for the I2C parts without a usable async crate
//!
//! Each driver speaks `embedded_hal_async::i2c::I2c` directly and exposes the
//! core's capability traits, so the same policies run on the bench mocks and
//! on the board.

pub mod apds9960;
pub mod ccs811;

use embedded_hal_async::i2c::Error as _;
use log::warn;
use mote_core::sensors::SensorError;

/// Errors that can occur while talking to one of the drivers' devices.
#[derive(Debug)]
pub enum Error<E> {
    /// I2C communication error
    I2c(E),
    /// The identification register held an unexpected value.
    UnknownDevice(u8),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::I2c(e)
    }
}

impl<E> Error<E>
where
    E: embedded_hal_async::i2c::Error,
{
    /// Fold a driver error into the core's sensor error for `sensor`.
    pub(crate) fn into_sensor(self, sensor: &'static str, operation: &'static str) -> SensorError {
        match self {
            Self::I2c(e) => {
                warn!("{}: I2C error during {}: {:?}", sensor, operation, e.kind());
                SensorError::ReadFailed {
                    sensor,
                    operation,
                    details: "I2C transfer failed",
                }
            }
            Self::UnknownDevice(id) => {
                warn!("{}: unexpected device id {:#04x}", sensor, id);
                SensorError::NotFound { sensor }
            }
        }
    }
}
