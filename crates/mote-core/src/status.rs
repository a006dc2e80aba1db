//! Status indication through blink codes
//!
//! A node without a screen reports what it is waiting on by blinking the
//! on-board LED a number of times. The numbers are fixed so a code read off
//! a unit in the field maps straight to a cause.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::warn;

/// Blink codes, by number of flashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Played once at start-up.
    Boot,
    WifiWaiting,
    GasWaiting,
    GasSkipping,
    GasReadError,
    ColorNotFound,
    GasNotFound,
    EnvironmentNotFound,
    /// Pulse oximeter missing on the heart-rate node.
    PulseNotFound,
    /// Current monitor missing on the battery rig.
    PowerMonitorNotFound,
}

impl StatusCode {
    /// Number of flashes per repetition.
    pub const fn flashes(self) -> u8 {
        match self {
            Self::WifiWaiting => 1,
            Self::GasWaiting => 2,
            Self::Boot | Self::GasSkipping => 3,
            Self::GasReadError => 4,
            Self::ColorNotFound => 5,
            Self::GasNotFound => 6,
            Self::EnvironmentNotFound => 7,
            Self::PulseNotFound => 8,
            Self::PowerMonitorNotFound => 9,
        }
    }
}

/// Anything that can show a [`StatusCode`] to a person standing next to the device.
pub trait StatusIndicator {
    fn signal(&mut self, code: StatusCode) -> impl Future<Output = ()>;
}

/// LED lead-in before the first group, LED dark.
pub const LEAD_IN_MS: u32 = 250;
/// Pause before each group of flashes.
pub const GROUP_PAUSE_MS: u32 = 500;
/// On and off time of a single flash.
pub const FLASH_MS: u32 = 100;
/// Each code is played this many times.
pub const REPETITIONS: u8 = 3;

/// Plays blink codes on an active-low LED.
pub struct LedBlinker<P, D> {
    led: P,
    delay: D,
}

impl<P, D> LedBlinker<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(led: P, delay: D) -> Self {
        Self { led, delay }
    }

    pub fn release(self) -> (P, D) {
        (self.led, self.delay)
    }

    async fn play(&mut self, flashes: u8) -> Result<(), P::Error> {
        // active low: high is dark
        self.led.set_high()?;
        self.delay.delay_ms(LEAD_IN_MS).await;

        for _ in 0..REPETITIONS {
            self.delay.delay_ms(GROUP_PAUSE_MS).await;
            for _ in 0..flashes {
                self.led.set_low()?;
                self.delay.delay_ms(FLASH_MS).await;
                self.led.set_high()?;
                self.delay.delay_ms(FLASH_MS).await;
            }
        }
        Ok(())
    }
}

impl<P, D> StatusIndicator for LedBlinker<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    async fn signal(&mut self, code: StatusCode) {
        if let Err(e) = self.play(code.flashes()).await {
            warn!("Status LED pin error while signalling {:?}: {:?}", code, e);
        }
    }
}
