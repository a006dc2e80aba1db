//! Adapters from registry driver crates and on-chip peripherals to the core traits

use core::fmt::Debug;

use embassy_time::{Delay, Timer};
use embedded_hal_async::i2c::I2c;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::peripherals::{ADC1, GPIO1};
use ina219::AsyncIna219;
use ina219::address::Address;
use ina219::calibration::UnCalibrated;
use ina219::configuration::{Configuration, Reset};
use ina219::measurements::{BusVoltage, ShuntVoltage};
use log::{info, warn};
use mote_core::sensors::{
    AnalogInput, EnvironmentReadings, EnvironmentSensor, FuelGauge, Initialize, PowerMonitor,
    PowerReadings, SensorError,
};

const BME280: &str = "BME280";
const INA219: &str = "INA219";

/// Shunt resistor on the INA219 breakout.
pub const SHUNT_OHM: f32 = 0.1;

/// BME280 at the primary address (SDO low, 0x76) in forced mode.
pub struct Bme280<I2C> {
    inner: bme280::i2c::AsyncBME280<I2C>,
    delay: Delay,
}

impl<I2C> Bme280<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self {
            inner: bme280::i2c::AsyncBME280::new_primary(i2c),
            delay: Delay,
        }
    }
}

impl<I2C> Initialize for Bme280<I2C>
where
    I2C: I2c,
    I2C::Error: Debug,
{
    fn name(&self) -> &'static str {
        BME280
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        match self.inner.init(&mut self.delay).await {
            Ok(()) => {
                info!("{} calibrated", BME280);
                Ok(())
            }
            Err(e) => {
                warn!("{} init failed: {:?}", BME280, e);
                Err(SensorError::NotFound { sensor: BME280 })
            }
        }
    }
}

impl<I2C> EnvironmentSensor for Bme280<I2C>
where
    I2C: I2c,
    I2C::Error: Debug,
{
    async fn read(&mut self) -> Result<EnvironmentReadings, SensorError> {
        let measurements = self.inner.measure(&mut self.delay).await.map_err(|e| {
            warn!("{} measurement failed: {:?}", BME280, e);
            SensorError::ReadFailed {
                sensor: BME280,
                operation: "measure",
                details: "I2C transfer or compensation failed",
            }
        })?;

        Ok(EnvironmentReadings {
            temperature_celsius: measurements.temperature,
            humidity_percent: measurements.humidity,
            // the driver reports pascal
            pressure_hpa: measurements.pressure / 100.0,
        })
    }
}

enum Ina219State<I2C> {
    /// Not brought up yet, or the last bring-up failed.
    Detached(I2C),
    Attached(AsyncIna219<I2C, UnCalibrated>),
    /// A bring-up was dropped while it held the bus handle.
    Lost,
}

/// INA219 at the default address (A0 and A1 grounded).
///
/// The driver resets the chip to its power-on configuration: 32 V bus range,
/// ±320 mV shunt range, 12-bit continuous shunt and bus conversions. Current
/// is derived from the shunt voltage, so no calibration is programmed.
pub struct Ina219<I2C> {
    state: Ina219State<I2C>,
}

impl<I2C> Ina219<I2C>
where
    I2C: I2c,
{
    /// A monitor that [`Initialize::begin`] resets and checks before use.
    pub fn new(i2c: I2C) -> Self {
        Self {
            state: Ina219State::Detached(i2c),
        }
    }

    /// A second handle on a chip another handle brings up.
    pub fn attached(i2c: I2C) -> Self {
        Self {
            state: Ina219State::Attached(AsyncIna219::new_unchecked(
                i2c,
                Address::default(),
                UnCalibrated,
            )),
        }
    }

    fn driver(&mut self) -> Result<&mut AsyncIna219<I2C, UnCalibrated>, SensorError> {
        match &mut self.state {
            Ina219State::Attached(driver) => Ok(driver),
            _ => Err(SensorError::NotFound { sensor: INA219 }),
        }
    }
}

fn ina219_failed(operation: &'static str, error: impl Debug) -> SensorError {
    warn!("{} {} failed: {:?}", INA219, operation, error);
    SensorError::ReadFailed {
        sensor: INA219,
        operation,
        details: "I2C transfer failed or value out of range",
    }
}

impl<I2C> Initialize for Ina219<I2C>
where
    I2C: I2c,
{
    fn name(&self) -> &'static str {
        INA219
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        let i2c = match core::mem::replace(&mut self.state, Ina219State::Lost) {
            Ina219State::Detached(i2c) => i2c,
            Ina219State::Attached(driver) => driver.destroy(),
            Ina219State::Lost => return Err(SensorError::NotFound { sensor: INA219 }),
        };

        // resets the chip and checks every register against its reset value
        match AsyncIna219::new(i2c, Address::default()).await {
            Ok(driver) => {
                info!("{} at {:#04x}", INA219, Address::default().as_byte());
                self.state = Ina219State::Attached(driver);
                Ok(())
            }
            Err(e) => {
                warn!("{} init failed: {:?}", INA219, e.reason);
                self.state = Ina219State::Detached(e.device);
                Err(SensorError::NotFound { sensor: INA219 })
            }
        }
    }
}

impl<I2C> PowerMonitor for Ina219<I2C>
where
    I2C: I2c,
{
    async fn read(&mut self) -> Result<PowerReadings, SensorError> {
        let driver = self.driver()?;
        let shunt = driver
            .shunt_voltage()
            .await
            .map_err(|e| ina219_failed("read shunt voltage", e))?;
        let bus = driver
            .bus_voltage()
            .await
            .map_err(|e| ina219_failed("read bus voltage", e))?;

        Ok(power_readings(shunt, bus))
    }
}

impl<I2C> FuelGauge for Ina219<I2C>
where
    I2C: I2c,
{
    async fn reset(&mut self) -> Result<(), SensorError> {
        let driver = self.driver()?;
        driver
            .set_configuration(Configuration {
                reset: Reset::Reset,
                ..Configuration::default()
            })
            .await
            .map_err(|e| ina219_failed("reset", e))?;
        Timer::after_millis(1).await;
        // the reset bit never reads back; restate the power-on configuration
        driver
            .set_configuration(Configuration::default())
            .await
            .map_err(|e| ina219_failed("configure", e))
    }
}

fn power_readings(shunt: ShuntVoltage, bus: BusVoltage) -> PowerReadings {
    let shunt_voltage_mv = shunt.shunt_voltage_uv() as f32 / 1000.0;
    PowerReadings {
        current_ma: shunt_voltage_mv / SHUNT_OHM,
        bus_voltage_v: bus.voltage_mv() as f32 / 1000.0,
        shunt_voltage_mv,
    }
}

/// ADC1 channel 0 (GPIO1), the analog input of the environment station.
pub type LightAdc = Adc<'static, ADC1<'static>, Blocking>;
pub type LightAdcPin = AdcPin<GPIO1<'static>, ADC1<'static>>;

/// One ADC input read in one-shot mode.
pub struct AnalogPin {
    adc: LightAdc,
    pin: LightAdcPin,
}

impl AnalogPin {
    pub fn new(adc: LightAdc, pin: LightAdcPin) -> Self {
        Self { adc, pin }
    }
}

impl AnalogInput for AnalogPin {
    async fn read_raw(&mut self) -> Result<u16, SensorError> {
        nb::block!(self.adc.read_oneshot(&mut self.pin)).map_err(|_| SensorError::ReadFailed {
            sensor: "ADC1",
            operation: "one-shot conversion",
            details: "conversion failed",
        })
    }
}
