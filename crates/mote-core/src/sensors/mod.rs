//! Sensor capability traits and typed readings
//!
//! Drivers live in the firmware crate. The core only sees these traits, so
//! every policy built on top of them (warm-up polling, bring-up retries,
//! classification) runs unchanged against mocks on the host.

mod bringup;
mod gas;
mod pulse;

pub use bringup::*;
pub use gas::*;
pub use pulse::*;

use thiserror_no_std::Error;

use crate::record::{RecordBuilder, Unit};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not found")]
    NotFound { sensor: &'static str },
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    /// The device reported an error through its own status register.
    #[error("{sensor}: device error code {code}")]
    Device { sensor: &'static str, code: u8 },
    #[error("{sensor}: data not ready")]
    DataPending { sensor: &'static str },
    #[error("{sensor}: timed out while trying to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

impl SensorError {
    pub const fn sensor(&self) -> &'static str {
        match self {
            Self::NotFound { sensor }
            | Self::ReadFailed { sensor, .. }
            | Self::Device { sensor, .. }
            | Self::DataPending { sensor }
            | Self::Timeout { sensor, .. } => *sensor,
        }
    }
}

/// Typed readings that know their own column names and order.
pub trait SensorReadings {
    /// Append the readings to a record in their fixed order.
    fn append_to(&self, record: &mut RecordBuilder);
}

/// Temperature, humidity and pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReadings {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
    pub pressure_hpa: f32,
}

impl SensorReadings for EnvironmentReadings {
    fn append_to(&self, record: &mut RecordBuilder) {
        record
            .float("temp", self.temperature_celsius, Unit::Celsius)
            .float("hum", self.humidity_percent, Unit::Percent)
            .float("pres", self.pressure_hpa, Unit::Hectopascal);
    }
}

/// Raw result registers of a metal-oxide gas sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasData {
    pub eco2_ppm: u16,
    pub tvoc_ppb: u16,
}

impl GasData {
    /// Both channels at zero is what the sensor reports before its first valid
    /// conversion after a reset.
    pub const fn is_sentinel(&self) -> bool {
        self.eco2_ppm == 0 && self.tvoc_ppb == 0
    }
}

/// Gas readings plus the sensor's own temperature estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasReadings {
    pub sensor_temperature_celsius: f32,
    pub data: GasData,
}

impl SensorReadings for GasReadings {
    fn append_to(&self, record: &mut RecordBuilder) {
        record
            .float("ccsTemp", self.sensor_temperature_celsius, Unit::Celsius)
            .float("eCO2", self.data.eco2_ppm as f32, Unit::PartsPerMillion)
            .float("tVOC", self.data.tvoc_ppb as f32, Unit::PartsPerBillion);
    }
}

/// Red, green, blue and clear channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorReadings {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub clear: u16,
}

impl SensorReadings for ColorReadings {
    fn append_to(&self, record: &mut RecordBuilder) {
        record
            .int("r", self.red as i64, Unit::Count)
            .int("g", self.green as i64, Unit::Count)
            .int("b", self.blue as i64, Unit::Count)
            .int("c", self.clear as i64, Unit::Count);
    }
}

/// One sample of a high-side current/voltage monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReadings {
    /// Positive while the battery supplies the load.
    pub current_ma: f32,
    pub bus_voltage_v: f32,
    pub shunt_voltage_mv: f32,
}

impl PowerReadings {
    /// Voltage at the battery side of the shunt.
    pub fn load_voltage_v(&self) -> f32 {
        self.bus_voltage_v + self.shunt_voltage_mv / 1000.0
    }
}

/// One sample of an optical pulse sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseSample {
    pub ir: u32,
    /// Set on the sample where the driver's beat detector saw a peak.
    pub beat: bool,
}

pub trait EnvironmentSensor {
    fn read(&mut self) -> impl Future<Output = Result<EnvironmentReadings, SensorError>>;
}

pub trait GasSensor {
    /// Whether a new conversion is waiting in the result registers.
    fn available(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Read the result registers; device errors surface as [`SensorError::Device`].
    fn read_data(&mut self) -> impl Future<Output = Result<GasData, SensorError>>;

    /// Temperature derived from the sensor's own thermistor.
    fn calculate_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    /// Feed ambient conditions used for compensation of the next conversion.
    fn set_environmental_data(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> impl Future<Output = Result<(), SensorError>>;
}

pub trait ColorSensor {
    fn read_color(&mut self) -> impl Future<Output = Result<ColorReadings, SensorError>>;
}

pub trait AnalogInput {
    fn read_raw(&mut self) -> impl Future<Output = Result<u16, SensorError>>;
}

pub trait PowerMonitor {
    fn read(&mut self) -> impl Future<Output = Result<PowerReadings, SensorError>>;
}

/// Battery fuel gauge whose internal counters can be restarted.
pub trait FuelGauge {
    fn reset(&mut self) -> impl Future<Output = Result<(), SensorError>>;
}

pub trait PulseSensor {
    fn read(&mut self) -> impl Future<Output = Result<PulseSample, SensorError>>;
}
