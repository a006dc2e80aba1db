//! APDS9960 ambient light and RGB color sensor
//!
//! Only the color engine is used. Proximity and gesture stay off.

use embassy_time::Timer;
use embedded_hal_async::i2c::I2c;
use log::info;
use mote_core::sensors::{ColorReadings, ColorSensor, Initialize, SensorError};

use super::Error;

// =============================================================================
// Device Constants
// =============================================================================

pub const I2C_ADDR: u8 = 0x39;
const NAME: &str = "APDS9960";

/// Known values of the id register (APDS9960 and its 0xA8 revision).
const DEVICE_IDS: [u8; 2] = [0xAB, 0xA8];

// =============================================================================
// Register Addresses
// =============================================================================

const ADDR_ENABLE: u8 = 0x80;
const ADDR_ATIME: u8 = 0x81;
const ADDR_CONTROL: u8 = 0x8F;
const ADDR_ID: u8 = 0x92;
const ADDR_STATUS: u8 = 0x93;
const ADDR_CDATAL: u8 = 0x94;

const ENABLE_PON: u8 = 0x01;
const ENABLE_AEN: u8 = 0x02;
const STATUS_AVALID: u8 = 0x01;

/// Gain 4x in the ALS/color gain field of CONTROL.
const CONTROL_AGAIN_4X: u8 = 0x01;

/// Each ATIME step is 2.78 ms of integration.
const ATIME_STEP_US: u32 = 2780;
const INTEGRATION_MS: u32 = 10;

const POWER_ON_SETTLE_MS: u64 = 10;
const POLL_INTERVAL_MS: u64 = 5;
const MAX_POLLS: u32 = 100;

// =============================================================================
// Driver Implementation
// =============================================================================

pub struct Apds9960<I2C> {
    i2c: I2C,
}

impl<I2C> Apds9960<I2C>
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

    async fn start(&mut self) -> Result<(), Error<I2C::Error>> {
        let id = self.read_byte(ADDR_ID).await?;
        if !DEVICE_IDS.contains(&id) {
            return Err(Error::UnknownDevice(id));
        }

        // all engines off while configuring
        self.write_byte(ADDR_ENABLE, 0).await?;
        self.write_byte(ADDR_ATIME, atime_register(INTEGRATION_MS))
            .await?;
        self.write_byte(ADDR_CONTROL, CONTROL_AGAIN_4X).await?;

        self.write_byte(ADDR_ENABLE, ENABLE_PON).await?;
        Timer::after_millis(POWER_ON_SETTLE_MS).await;
        self.write_byte(ADDR_ENABLE, ENABLE_PON | ENABLE_AEN).await
    }
}

impl<I2C> Initialize for Apds9960<I2C>
where
    I2C: I2c,
{
    fn name(&self) -> &'static str {
        NAME
    }

    /// The color engine has no state worth keeping over deep sleep, so every
    /// start is a full configuration.
    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        self.start()
            .await
            .map_err(|e| e.into_sensor(NAME, "begin"))?;
        info!("{} color engine enabled", NAME);
        Ok(())
    }
}

impl<I2C> ColorSensor for Apds9960<I2C>
where
    I2C: I2c,
{
    async fn read_color(&mut self) -> Result<ColorReadings, SensorError> {
        let mut polls = 0;
        loop {
            let status = self
                .read_byte(ADDR_STATUS)
                .await
                .map_err(|e| e.into_sensor(NAME, "read status"))?;
            if status & STATUS_AVALID != 0 {
                break;
            }
            polls += 1;
            if polls >= MAX_POLLS {
                return Err(SensorError::Timeout {
                    sensor: NAME,
                    operation: "wait for color data",
                });
            }
            Timer::after_millis(POLL_INTERVAL_MS).await;
        }

        let mut buf = [0u8; 8];
        self.i2c
            .write_read(I2C_ADDR, &[ADDR_CDATAL], &mut buf)
            .await
            .map_err(|e| Error::I2c(e).into_sensor(NAME, "read color"))?;
        Ok(decode_channels(&buf))
    }
}

/// ATIME counts down from 256 in 2.78 ms steps.
fn atime_register(integration_ms: u32) -> u8 {
    let steps = (integration_ms * 1000 / ATIME_STEP_US).clamp(1, 256);
    (256 - steps) as u8
}

/// Clear, red, green, blue; each little-endian.
fn decode_channels(buf: &[u8; 8]) -> ColorReadings {
    ColorReadings {
        clear: u16::from_le_bytes([buf[0], buf[1]]),
        red: u16::from_le_bytes([buf[2], buf[3]]),
        green: u16::from_le_bytes([buf[4], buf[5]]),
        blue: u16::from_le_bytes([buf[6], buf[7]]),
    }
}
