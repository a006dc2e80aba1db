//! Board plumbing: shared buses, clock, sleep, status LED and the OLED

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Instant};
use embedded_graphics::draw_target::DrawTarget;
use esp_hal::gpio::Output;
use esp_hal::i2c::master::I2c;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason};
use esp_hal::system::Cpu;
use esp_hal::{Async, Blocking};
use log::info;
use mote_core::battery::BatterySample;
use mote_core::display::{BatteryDisplay, DisplayRenderer};
use mote_core::network::PowerControl;
use mote_core::sampling::Clock;
use mote_core::sensors::WakeReason;
use mote_core::shared_i2c::SharedI2c;
use mote_core::status::LedBlinker;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use static_cell::StaticCell;

/// The async sensor bus, owned for the whole program.
pub type SensorBus = Mutex<CriticalSectionRawMutex, I2c<'static, Async>>;
/// One driver's handle on [`SensorBus`].
pub type SensorI2c = SharedI2c<'static, CriticalSectionRawMutex, I2c<'static, Async>>;

static SENSOR_BUS: StaticCell<SensorBus> = StaticCell::new();

/// Move the sensor bus into static storage. Call once.
pub fn share_sensor_bus(i2c: I2c<'static, Async>) -> &'static SensorBus {
    SENSOR_BUS.init(Mutex::new(i2c))
}

/// Why this start-up happened, from the reset reason of the main core.
pub fn wake_reason() -> WakeReason {
    let reason = reset_reason(Cpu::ProCpu);
    info!("Reset reason: {:?}", reason);
    if reason == Some(SocResetReason::CoreDeepSleep) {
        WakeReason::DeepSleepWake
    } else {
        WakeReason::ColdBoot
    }
}

/// Milliseconds since the embassy time driver started.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// Deep sleep through the RTC controller with a timer wake-up.
pub struct EspPower {
    rtc: Rtc<'static>,
}

impl EspPower {
    pub fn new(rtc: Rtc<'static>) -> Self {
        Self { rtc }
    }
}

impl PowerControl for EspPower {
    async fn deep_sleep(&mut self, duration_ms: u64) {
        info!("Deep sleep for {} ms", duration_ms);
        let timer = TimerWakeupSource::new(core::time::Duration::from_millis(duration_ms));
        self.rtc.sleep_deep(&[&timer]);
    }
}

/// The on-board LED, wired active low.
pub type StatusLed = LedBlinker<Output<'static>, Delay>;

pub fn status_led(pin: Output<'static>) -> StatusLed {
    LedBlinker::new(pin, Delay)
}

pub type OledTarget = Ssd1306<
    I2CInterface<I2c<'static, Blocking>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

/// SSD1306 on its own blocking bus, redrawn in RAM and flushed whole.
pub struct OledRenderer {
    page: BatteryDisplay<OledTarget>,
}

impl OledRenderer {
    pub fn new(i2c: I2c<'static, Blocking>) -> Result<Self, <OledTarget as DrawTarget>::Error> {
        let mut target = Ssd1306::new(
            I2CDisplayInterface::new(i2c),
            DisplaySize128x64,
            DisplayRotation::Rotate0,
        )
        .into_buffered_graphics_mode();
        target.init()?;

        let mut page = BatteryDisplay::new(target);
        page.draw_splash()?;
        page.target_mut().flush()?;
        Ok(Self { page })
    }
}

impl DisplayRenderer for OledRenderer {
    type Error = <OledTarget as DrawTarget>::Error;

    fn render(&mut self, sample: &BatterySample) -> Result<(), Self::Error> {
        self.page.draw_sample(sample)?;
        self.page.target_mut().flush()
    }
}
