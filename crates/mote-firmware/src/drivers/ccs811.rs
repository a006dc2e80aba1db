//! CCS811 metal-oxide eCO2/TVOC sensor
//!
//! The sensor boots into its bootloader; `begin` starts the application
//! firmware and selects constant-power mode with one conversion per second.
//! After a deep-sleep wake the sensor is still running and its baseline is
//! preserved, so a warm `begin` skips the software reset.

use embassy_time::Timer;
use embedded_hal_async::i2c::I2c;
use log::{debug, info};
use mote_core::sensors::{GasData, GasSensor, Initialize, SensorError};

use super::Error;

// =============================================================================
// Device Constants
// =============================================================================

pub const I2C_ADDR: u8 = 0x5A;
const NAME: &str = "CCS811";

/// Value of the hardware id register.
pub const HW_ID: u8 = 0x81;

// =============================================================================
// Register Addresses
// =============================================================================

const ADDR_STATUS: u8 = 0x00;
const ADDR_MEAS_MODE: u8 = 0x01;
const ADDR_ALG_RESULT_DATA: u8 = 0x02;
const ADDR_ENV_DATA: u8 = 0x05;
const ADDR_NTC: u8 = 0x06;
const ADDR_HW_ID: u8 = 0x20;
const ADDR_ERROR_ID: u8 = 0xE0;
const ADDR_APP_START: u8 = 0xF4;
const ADDR_SW_RESET: u8 = 0xFF;

/// Magic sequence that triggers a software reset.
const SW_RESET_SEQUENCE: [u8; 4] = [0x11, 0xE5, 0x72, 0x8A];

// =============================================================================
// Status Register Bits
// =============================================================================

const STATUS_ERROR: u8 = 0x01;
const STATUS_DATA_READY: u8 = 0x08;
const STATUS_APP_VALID: u8 = 0x10;
const STATUS_FW_MODE: u8 = 0x80;

/// Drive mode 1: one conversion per second, interrupts off.
const MEAS_MODE_1SEC: u8 = 0x01 << 4;

const RESET_SETTLE_MS: u64 = 100;

// Thermistor network on the breakout
const REF_RESISTOR_OHM: f32 = 100_000.0;
const NTC_NOMINAL_OHM: f32 = 10_000.0;
const NTC_BETA: f32 = 3380.0;
const NTC_NOMINAL_KELVIN: f32 = 25.0 + 273.15;

// =============================================================================
// Driver Implementation
// =============================================================================

pub struct Ccs811<I2C> {
    i2c: I2C,
}

impl<I2C> Ccs811<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    async fn read_byte(&mut self, addr: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(I2C_ADDR, &[addr], &mut buf).await?;
        Ok(buf[0])
    }

    async fn write_byte(&mut self, addr: u8, data: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(I2C_ADDR, &[addr, data]).await?;
        Ok(())
    }

    async fn read_status(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_byte(ADDR_STATUS).await
    }

    async fn software_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        let mut frame = [0u8; 5];
        frame[0] = ADDR_SW_RESET;
        frame[1..].copy_from_slice(&SW_RESET_SEQUENCE);
        self.i2c.write(I2C_ADDR, &frame).await?;
        Timer::after_millis(RESET_SETTLE_MS).await;
        Ok(())
    }

    async fn error_id(&mut self) -> Result<u8, SensorError> {
        self.read_byte(ADDR_ERROR_ID)
            .await
            .map_err(|e| e.into_sensor(NAME, "read error id"))
    }

    async fn start(&mut self, cold_start: bool) -> Result<(), Error<I2C::Error>> {
        if cold_start {
            self.software_reset().await?;
        }

        let id = self.read_byte(ADDR_HW_ID).await?;
        if id != HW_ID {
            return Err(Error::UnknownDevice(id));
        }

        let status = self.read_status().await?;
        if status & STATUS_FW_MODE == 0 {
            if status & STATUS_APP_VALID == 0 {
                return Err(Error::UnknownDevice(id));
            }
            // application start is a bare register address write
            self.i2c.write(I2C_ADDR, &[ADDR_APP_START]).await?;
            Timer::after_millis(RESET_SETTLE_MS).await;
        }

        self.write_byte(ADDR_MEAS_MODE, MEAS_MODE_1SEC).await
    }
}

impl<I2C> Initialize for Ccs811<I2C>
where
    I2C: I2c,
{
    fn name(&self) -> &'static str {
        NAME
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.start(cold_start)
            .await
            .map_err(|e| e.into_sensor(NAME, "begin"))?;

        let status = self
            .read_status()
            .await
            .map_err(|e| e.into_sensor(NAME, "read status"))?;
        if status & STATUS_ERROR != 0 {
            return Err(SensorError::Device {
                sensor: NAME,
                code: self.error_id().await?,
            });
        }
        if status & STATUS_FW_MODE == 0 {
            return Err(SensorError::NotFound { sensor: NAME });
        }

        info!("{} running ({} start)", NAME, if cold_start { "cold" } else { "warm" });
        Ok(())
    }
}

impl<I2C> GasSensor for Ccs811<I2C>
where
    I2C: I2c,
{
    async fn available(&mut self) -> Result<bool, SensorError> {
        let status = self
            .read_status()
            .await
            .map_err(|e| e.into_sensor(NAME, "read status"))?;
        Ok(status & STATUS_DATA_READY != 0)
    }

    async fn read_data(&mut self) -> Result<GasData, SensorError> {
        let mut buf = [0u8; 8];
        self.i2c
            .write_read(I2C_ADDR, &[ADDR_ALG_RESULT_DATA], &mut buf)
            .await
            .map_err(|e| Error::I2c(e).into_sensor(NAME, "read data"))?;

        if buf[4] & STATUS_ERROR != 0 {
            return Err(SensorError::Device {
                sensor: NAME,
                code: self.error_id().await?,
            });
        }

        Ok(decode_result(&buf))
    }

    async fn calculate_temperature(&mut self) -> Result<f32, SensorError> {
        let mut buf = [0u8; 4];
        self.i2c
            .write_read(I2C_ADDR, &[ADDR_NTC], &mut buf)
            .await
            .map_err(|e| Error::I2c(e).into_sensor(NAME, "read thermistor"))?;

        let v_ref = u16::from_be_bytes([buf[0], buf[1]]);
        let v_ntc = u16::from_be_bytes([buf[2], buf[3]]);
        if v_ref == 0 {
            return Err(SensorError::DataPending { sensor: NAME });
        }
        Ok(ntc_temperature(v_ref, v_ntc))
    }

    async fn set_environmental_data(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> Result<(), SensorError> {
        let frame = encode_environment(humidity_percent, temperature_celsius);
        debug!("{} compensation {:?}", NAME, frame);
        self.i2c
            .write(I2C_ADDR, &frame)
            .await
            .map_err(|e| Error::I2c(e).into_sensor(NAME, "write environment"))
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn decode_result(buf: &[u8; 8]) -> GasData {
    GasData {
        eco2_ppm: u16::from_be_bytes([buf[0], buf[1]]),
        tvoc_ppb: u16::from_be_bytes([buf[2], buf[3]]),
    }
}

/// Beta-model temperature of the breakout's thermistor in °C.
fn ntc_temperature(v_ref: u16, v_ntc: u16) -> f32 {
    let r_ntc = v_ntc as f32 * REF_RESISTOR_OHM / v_ref as f32;
    let inverse = libm::logf(r_ntc / NTC_NOMINAL_OHM) / NTC_BETA + 1.0 / NTC_NOMINAL_KELVIN;
    1.0 / inverse - 273.15
}

/// ENV_DATA frame: humidity and temperature + 25 °C, both in 1/512 steps.
fn encode_environment(humidity_percent: f32, temperature_celsius: f32) -> [u8; 5] {
    let humidity = (humidity_percent * 512.0 + 0.5) as u16;
    let temperature = ((temperature_celsius + 25.0) * 512.0 + 0.5) as u16;
    let [h_hi, h_lo] = humidity.to_be_bytes();
    let [t_hi, t_lo] = temperature.to_be_bytes();
    [ADDR_ENV_DATA, h_hi, h_lo, t_hi, t_lo]
}
