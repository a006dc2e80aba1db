//! Synthetic sensors and host stand-ins for the board's peripherals

use std::cell::Cell;
use std::f32::consts::TAU;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use mote_core::http::PostRequest;
use mote_core::network::{NetworkError, PowerControl, WifiLink};
use mote_core::sampling::Clock;
use mote_core::sensors::{
    AnalogInput, ColorReadings, ColorSensor, EnvironmentReadings, EnvironmentSensor, FuelGauge,
    GasData, GasSensor, Initialize, PowerMonitor, PowerReadings, PulseSample, PulseSensor,
    SensorError,
};
use mote_core::status::{StatusCode, StatusIndicator};
use mote_core::upload::{HttpTransport, UploadError};

// ---------------------------------------------------------------------------
// Host plumbing
// ---------------------------------------------------------------------------

/// Wall-clock milliseconds since the simulator started.
pub struct StdClock {
    started: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Blocks the thread; the loop is the only thing running.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Logs blink codes instead of blinking.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusIndicator for LogStatus {
    async fn signal(&mut self, code: StatusCode) {
        info!("LED: {:?} ({} flashes)", code, code.flashes());
    }
}

/// The host is always online.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostLink;

impl WifiLink for HostLink {
    fn is_connected(&self) -> bool {
        true
    }

    async fn configure(
        &mut self,
        _ssid: &str,
        _password: &str,
        _hostname: &str,
    ) -> Result<(), NetworkError> {
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), NetworkError> {
        Ok(())
    }

    async fn wait_connected(&mut self, _timeout_ms: u32) -> bool {
        true
    }
}

/// Deep sleep compressed by `time_scale`, so a five minute sleep is a short pause.
pub struct CompressedSleep {
    pub time_scale: u64,
}

impl PowerControl for CompressedSleep {
    async fn deep_sleep(&mut self, duration_ms: u64) {
        info!("zzz {} ms (simulated)", duration_ms);
        std::thread::sleep(Duration::from_millis(duration_ms / self.time_scale.max(1)));
    }
}

/// Prints the request that would go to the collector and answers 200.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    pub posts: u32,
}

impl HttpTransport for DryRunTransport {
    async fn post(&mut self, request: &PostRequest<'_>) -> Result<u16, UploadError> {
        self.posts += 1;
        debug!("{}", request.head().trim_end());
        info!(
            "POST {}:{}{} <- {}",
            request.authority.host,
            request.authority.port,
            request.target,
            String::from_utf8_lossy(request.body)
        );
        Ok(200)
    }
}

// ---------------------------------------------------------------------------
// Battery rig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supply {
    Discharging,
    Charging,
    Resting,
    Unplugged,
}

impl Supply {
    /// Battery current, positive while the battery supplies the load.
    fn current_ma(self) -> f32 {
        match self {
            Self::Discharging => 85.0,
            Self::Charging => -240.0,
            Self::Resting | Self::Unplugged => 0.0,
        }
    }
}

/// A 1000 mAh cell behind an INA219. The supply mode is shared with the UI.
pub struct SimBattery {
    supply: Rc<Cell<Supply>>,
    charge_mah: f32,
    last_read: Option<Instant>,
}

const CAPACITY_MAH: f32 = 1000.0;
const SHUNT_OHM: f32 = 0.1;

impl SimBattery {
    pub fn new(supply: Rc<Cell<Supply>>) -> Self {
        Self {
            supply,
            charge_mah: CAPACITY_MAH * 0.6,
            last_read: None,
        }
    }

    fn open_circuit_v(&self) -> f32 {
        3.0 + 1.2 * (self.charge_mah / CAPACITY_MAH).clamp(0.0, 1.0)
    }
}

impl Initialize for SimBattery {
    fn name(&self) -> &'static str {
        "INA219 (sim)"
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        Ok(())
    }
}

impl PowerMonitor for SimBattery {
    async fn read(&mut self) -> Result<PowerReadings, SensorError> {
        let now = Instant::now();
        let hours = self
            .last_read
            .map(|last| now.duration_since(last).as_secs_f32() / 3600.0)
            .unwrap_or(0.0);
        self.last_read = Some(now);

        let supply = self.supply.get();
        let current_ma = supply.current_ma();
        self.charge_mah = (self.charge_mah - current_ma * hours).clamp(0.0, CAPACITY_MAH);

        if supply == Supply::Unplugged {
            return Ok(PowerReadings {
                current_ma: 0.0,
                bus_voltage_v: 0.4,
                shunt_voltage_mv: 0.0,
            });
        }

        let shunt_voltage_mv = current_ma * SHUNT_OHM;
        Ok(PowerReadings {
            current_ma,
            bus_voltage_v: self.open_circuit_v() - shunt_voltage_mv / 1000.0,
            shunt_voltage_mv,
        })
    }
}

/// Stands in for the gauge half of the INA219.
#[derive(Debug, Default)]
pub struct SimGauge {
    pub resets: u32,
}

impl FuelGauge for SimGauge {
    async fn reset(&mut self) -> Result<(), SensorError> {
        self.resets += 1;
        info!("Gauge reset #{}", self.resets);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Climate node
// ---------------------------------------------------------------------------

/// Slow sinusoids so consecutive records differ.
fn wave(t: f32, period_s: f32) -> f32 {
    (t / period_s * TAU).sin()
}

pub struct SimClimate {
    started: Instant,
}

impl SimClimate {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn t(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }
}

impl Initialize for SimClimate {
    fn name(&self) -> &'static str {
        "BME280 (sim)"
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        Ok(())
    }
}

impl EnvironmentSensor for SimClimate {
    async fn read(&mut self) -> Result<EnvironmentReadings, SensorError> {
        let t = self.t();
        Ok(EnvironmentReadings {
            temperature_celsius: 22.0 + 2.5 * wave(t, 240.0),
            humidity_percent: 45.0 + 8.0 * wave(t, 400.0),
            pressure_hpa: 1008.0 + 3.0 * wave(t, 900.0),
        })
    }
}

/// A gas sensor that needs a few polls before its first conversion and then
/// reports one all-zero sentinel, like a freshly reset CCS811.
pub struct SimGas {
    polls_until_ready: u32,
    sentinel_pending: bool,
    started: Instant,
}

impl SimGas {
    pub fn new() -> Self {
        Self {
            polls_until_ready: 3,
            sentinel_pending: true,
            started: Instant::now(),
        }
    }
}

impl Initialize for SimGas {
    fn name(&self) -> &'static str {
        "CCS811 (sim)"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        if cold_start {
            self.polls_until_ready = 3;
            self.sentinel_pending = true;
        }
        Ok(())
    }
}

impl GasSensor for SimGas {
    async fn available(&mut self) -> Result<bool, SensorError> {
        if self.polls_until_ready > 0 {
            self.polls_until_ready -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn read_data(&mut self) -> Result<GasData, SensorError> {
        if self.sentinel_pending {
            self.sentinel_pending = false;
            return Ok(GasData::default());
        }
        let t = self.started.elapsed().as_secs_f32();
        Ok(GasData {
            eco2_ppm: (650.0 + 200.0 * wave(t, 600.0)) as u16,
            tvoc_ppb: (40.0 + 30.0 * wave(t, 330.0)) as u16,
        })
    }

    async fn calculate_temperature(&mut self) -> Result<f32, SensorError> {
        Ok(25.0 + wave(self.started.elapsed().as_secs_f32(), 120.0))
    }

    async fn set_environmental_data(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> Result<(), SensorError> {
        debug!(
            "CCS811 (sim) compensation {:.1} %, {:.1} °C",
            humidity_percent, temperature_celsius
        );
        Ok(())
    }
}

pub struct SimLight {
    started: Instant,
}

impl SimLight {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn level(&self) -> f32 {
        0.5 + 0.5 * wave(self.started.elapsed().as_secs_f32(), 180.0)
    }
}

impl Initialize for SimLight {
    fn name(&self) -> &'static str {
        "APDS9960 (sim)"
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        Ok(())
    }
}

impl ColorSensor for SimLight {
    async fn read_color(&mut self) -> Result<ColorReadings, SensorError> {
        let level = self.level();
        Ok(ColorReadings {
            red: (120.0 * level) as u16,
            green: (140.0 * level) as u16,
            blue: (90.0 * level) as u16,
            clear: (380.0 * level) as u16,
        })
    }
}

impl AnalogInput for SimLight {
    async fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok((4095.0 * self.level()) as u16)
    }
}

// ---------------------------------------------------------------------------
// Heart-rate node
// ---------------------------------------------------------------------------

/// A finger resting on the sensor with a steady pulse.
pub struct SimPulse {
    started: Instant,
    beat_interval: Duration,
    next_beat: Duration,
}

impl SimPulse {
    pub fn new(bpm: u32) -> Self {
        let beat_interval = Duration::from_millis(60_000 / bpm.max(1) as u64);
        Self {
            started: Instant::now(),
            beat_interval,
            next_beat: beat_interval,
        }
    }
}

impl Initialize for SimPulse {
    fn name(&self) -> &'static str {
        "MAX30105 (sim)"
    }

    async fn begin(&mut self, _cold_start: bool) -> Result<(), SensorError> {
        Ok(())
    }
}

impl PulseSensor for SimPulse {
    async fn read(&mut self) -> Result<PulseSample, SensorError> {
        let elapsed = self.started.elapsed();
        let beat = elapsed >= self.next_beat;
        if beat {
            self.next_beat += self.beat_interval;
        }
        let phase = elapsed.as_secs_f32() / self.beat_interval.as_secs_f32();
        Ok(PulseSample {
            ir: (95_000.0 + 1_500.0 * (phase * TAU).sin()) as u32,
            beat,
        })
    }
}
