//! Test doubles for every hardware seam of the core.

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_graphics::Pixel;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Size};
use embedded_hal::digital::{self, ErrorKind, ErrorType as PinErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType as I2cErrorType, I2c, Operation};

use crate::display::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};
use crate::http::PostRequest;
use crate::network::{NetworkError, PowerControl, WifiLink};
use crate::record::{TelemetryRecord, Unit};
use crate::sampling::{Clock, Station};
use crate::sensors::{
    AnalogInput, ColorReadings, ColorSensor, EnvironmentReadings, EnvironmentSensor, FuelGauge,
    GasData, GasSensor, Initialize, PowerMonitor, PowerReadings, PulseSample, PulseSensor,
    SensorError, WakeReason,
};
use crate::status::{StatusCode, StatusIndicator};
use crate::upload::{HttpTransport, UploadError};

/// Records every requested pause instead of waiting.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub calls: Vec<u32>,
}

impl MockDelay {
    pub fn total_ms(&self) -> u64 {
        self.calls.iter().map(|ms| *ms as u64).sum()
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.calls.push(us / 1000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    High,
    Low,
}

#[derive(Debug)]
pub struct MockPinError;

impl digital::Error for MockPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Default)]
pub struct MockPin {
    pub history: Vec<PinLevel>,
    pub fail: bool,
}

impl PinErrorType for MockPin {
    type Error = MockPinError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MockPinError);
        }
        self.history.push(PinLevel::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MockPinError);
        }
        self.history.push(PinLevel::High);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingStatus {
    pub codes: Vec<StatusCode>,
}

impl StatusIndicator for RecordingStatus {
    async fn signal(&mut self, code: StatusCode) {
        self.codes.push(code);
    }
}

/// Fails the first `n` calls to `begin`, hard resets included.
#[derive(Debug, Default)]
pub struct MockInit {
    remaining_failures: u32,
    pub begins: Vec<bool>,
}

impl MockInit {
    pub fn failing_for(failures: u32) -> Self {
        Self {
            remaining_failures: failures,
            begins: Vec::new(),
        }
    }
}

impl Initialize for MockInit {
    fn name(&self) -> &'static str {
        "mock sensor"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.begins.push(cold_start);
        if self.remaining_failures > 0 {
            self.remaining_failures -= 1;
            return Err(SensorError::NotFound {
                sensor: "mock sensor",
            });
        }
        Ok(())
    }
}

/// Scripted gas sensor. An empty script means "not available yet".
#[derive(Debug, Default)]
pub struct MockGas {
    pub available: VecDeque<Result<bool, SensorError>>,
    pub data: VecDeque<Result<GasData, SensorError>>,
    pub temperature: f32,
    pub environment_calls: Vec<(f32, f32)>,
    pub init: MockInit,
}

impl GasSensor for MockGas {
    async fn available(&mut self) -> Result<bool, SensorError> {
        self.available.pop_front().unwrap_or(Ok(false))
    }

    async fn read_data(&mut self) -> Result<GasData, SensorError> {
        self.data
            .pop_front()
            .unwrap_or(Err(SensorError::DataPending { sensor: "mock gas" }))
    }

    async fn calculate_temperature(&mut self) -> Result<f32, SensorError> {
        Ok(self.temperature)
    }

    async fn set_environmental_data(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> Result<(), SensorError> {
        self.environment_calls
            .push((humidity_percent, temperature_celsius));
        Ok(())
    }
}

impl Initialize for MockGas {
    fn name(&self) -> &'static str {
        "mock gas"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.init.begin(cold_start).await
    }
}

pub struct MockEnvironment {
    pub readings: EnvironmentReadings,
    pub fail: bool,
    pub init: MockInit,
}

impl MockEnvironment {
    pub fn reading(readings: EnvironmentReadings) -> Self {
        Self {
            readings,
            fail: false,
            init: MockInit::default(),
        }
    }
}

impl EnvironmentSensor for MockEnvironment {
    async fn read(&mut self) -> Result<EnvironmentReadings, SensorError> {
        if self.fail {
            return Err(SensorError::ReadFailed {
                sensor: "mock environment",
                operation: "measure",
                details: "bus error",
            });
        }
        Ok(self.readings)
    }
}

impl Initialize for MockEnvironment {
    fn name(&self) -> &'static str {
        "mock environment"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.init.begin(cold_start).await
    }
}

pub struct MockColor {
    pub readings: ColorReadings,
    pub init: MockInit,
}

impl MockColor {
    pub fn reading(readings: ColorReadings) -> Self {
        Self {
            readings,
            init: MockInit::default(),
        }
    }
}

impl ColorSensor for MockColor {
    async fn read_color(&mut self) -> Result<ColorReadings, SensorError> {
        Ok(self.readings)
    }
}

impl Initialize for MockColor {
    fn name(&self) -> &'static str {
        "mock color"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.init.begin(cold_start).await
    }
}

pub struct MockAnalog(pub u16);

impl AnalogInput for MockAnalog {
    async fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok(self.0)
    }
}

/// Plays back a fixed list of samples, then fails.
pub struct MockPowerMonitor {
    samples: VecDeque<PowerReadings>,
    pub init: MockInit,
}

impl MockPowerMonitor {
    pub fn new(samples: &[PowerReadings]) -> Self {
        Self {
            samples: samples.iter().copied().collect(),
            init: MockInit::default(),
        }
    }
}

impl Initialize for MockPowerMonitor {
    fn name(&self) -> &'static str {
        "mock power monitor"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.init.begin(cold_start).await
    }
}

impl PowerMonitor for MockPowerMonitor {
    async fn read(&mut self) -> Result<PowerReadings, SensorError> {
        self.samples.pop_front().ok_or(SensorError::ReadFailed {
            sensor: "mock power monitor",
            operation: "read",
            details: "script exhausted",
        })
    }
}

#[derive(Debug, Default)]
pub struct MockGauge {
    pub resets: u32,
    pub fail: bool,
}

impl FuelGauge for MockGauge {
    async fn reset(&mut self) -> Result<(), SensorError> {
        self.resets += 1;
        if self.fail {
            return Err(SensorError::NotFound {
                sensor: "mock gauge",
            });
        }
        Ok(())
    }
}

pub struct MockPulse {
    samples: VecDeque<PulseSample>,
    pub init: MockInit,
}

impl MockPulse {
    pub fn new(samples: &[PulseSample]) -> Self {
        Self {
            samples: samples.iter().copied().collect(),
            init: MockInit::default(),
        }
    }
}

impl PulseSensor for MockPulse {
    async fn read(&mut self) -> Result<PulseSample, SensorError> {
        self.samples
            .pop_front()
            .ok_or(SensorError::DataPending { sensor: "mock pulse" })
    }
}

impl Initialize for MockPulse {
    fn name(&self) -> &'static str {
        "mock pulse"
    }

    async fn begin(&mut self, cold_start: bool) -> Result<(), SensorError> {
        self.init.begin(cold_start).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub host: String,
    pub port: u16,
    pub target: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Answers every request the same way and keeps a copy of it.
pub struct MockTransport {
    response: Result<u16, UploadError>,
    pub requests: Vec<SentRequest>,
}

impl MockTransport {
    pub fn answering(response: Result<u16, UploadError>) -> Self {
        Self {
            response,
            requests: Vec::new(),
        }
    }
}

impl HttpTransport for MockTransport {
    async fn post(&mut self, request: &PostRequest<'_>) -> Result<u16, UploadError> {
        self.requests.push(SentRequest {
            host: request.authority.host.to_string(),
            port: request.authority.port,
            target: request.target.to_string(),
            content_type: request.content_type.to_string(),
            body: request.body.to_vec(),
        });
        self.response
    }
}

/// Associates on the `n`-th connect request, or never.
#[derive(Debug, Default)]
pub struct MockLink {
    connected: bool,
    up_after: Option<u32>,
    pub begin_calls: u32,
    pub configure_calls: u32,
    pub waits: Vec<u32>,
    pub hostname: Option<String>,
    pub fail_configure: bool,
}

impl MockLink {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn up_after(attempts: u32) -> Self {
        Self {
            up_after: Some(attempts),
            ..Self::default()
        }
    }

    pub fn never() -> Self {
        Self::default()
    }
}

impl WifiLink for MockLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn configure(
        &mut self,
        _ssid: &str,
        _password: &str,
        hostname: &str,
    ) -> Result<(), NetworkError> {
        if self.fail_configure {
            return Err(NetworkError::Driver {
                details: "mock configure",
            });
        }
        self.configure_calls += 1;
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), NetworkError> {
        self.begin_calls += 1;
        Ok(())
    }

    async fn wait_connected(&mut self, timeout_ms: u32) -> bool {
        self.waits.push(timeout_ms);
        if self.up_after == Some(self.begin_calls) {
            self.connected = true;
        }
        self.connected
    }
}

#[derive(Debug, Default)]
pub struct MockPower {
    pub sleeps: Vec<u64>,
}

impl PowerControl for MockPower {
    async fn deep_sleep(&mut self, duration_ms: u64) {
        self.sleeps.push(duration_ms);
    }
}

/// Manually driven clock; optionally moves forward on every read.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<u64>,
    per_read: Cell<u64>,
}

impl MockClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
            per_read: Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn advance_per_read(&self, ms: u64) {
        self.per_read.set(ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.per_read.get());
        now
    }
}

/// Produces a one-field record counting its own samples.
#[derive(Debug, Default)]
pub struct MockStation {
    pub samples: u32,
    pub fail_next: bool,
    pub started: Option<WakeReason>,
}

impl Station for MockStation {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start<S, D>(
        &mut self,
        wake: WakeReason,
        _status: &mut S,
        _delay: &mut D,
    ) -> Result<(), SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        self.started = Some(wake);
        Ok(())
    }

    async fn sample<S, D>(
        &mut self,
        _now_ms: u64,
        _status: &mut S,
        _delay: &mut D,
    ) -> Result<TelemetryRecord, SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        if self.fail_next {
            self.fail_next = false;
            return Err(SensorError::NotFound {
                sensor: "mock station",
            });
        }
        self.samples += 1;
        let mut record = TelemetryRecord::builder();
        record.int("n", self.samples as i64, Unit::Count);
        Ok(record.build())
    }
}

const FRAME_W: usize = DISPLAY_WIDTH_PX as usize;
const FRAME_H: usize = DISPLAY_HEIGHT_PX as usize;

/// 128×64 monochrome frame buffer that counts off-screen pixels.
pub struct MockFrame {
    pixels: Vec<bool>,
    pub out_of_bounds: usize,
}

impl Default for MockFrame {
    fn default() -> Self {
        Self {
            pixels: vec![false; FRAME_W * FRAME_H],
            out_of_bounds: 0,
        }
    }
}

impl MockFrame {
    pub fn lit(&self) -> usize {
        self.pixels.iter().filter(|p| **p).count()
    }

    pub fn is_lit(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as usize >= FRAME_W || y as usize >= FRAME_H {
            return false;
        }
        self.pixels[y as usize * FRAME_W + x as usize]
    }
}

impl OriginDimensions for MockFrame {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
    }
}

impl DrawTarget for MockFrame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0
                || point.y < 0
                || point.x as usize >= FRAME_W
                || point.y as usize >= FRAME_H
            {
                self.out_of_bounds += 1;
                continue;
            }
            self.pixels[point.y as usize * FRAME_W + point.x as usize] = color.is_on();
        }
        Ok(())
    }
}

/// Records writes; reads are served from a fixed answer.
#[derive(Debug, Default)]
pub struct MockI2c {
    answer: Vec<u8>,
    pub writes: Vec<(u8, Vec<u8>)>,
}

impl MockI2c {
    pub fn answering(answer: &[u8]) -> Self {
        Self {
            answer: answer.to_vec(),
            writes: Vec::new(),
        }
    }

    fn fill(&self, buffer: &mut [u8]) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.answer.get(i).copied().unwrap_or(0);
        }
    }
}

impl I2cErrorType for MockI2c {
    type Error = Infallible;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                Operation::Read(buffer) => self.fill(buffer),
            }
        }
        Ok(())
    }
}
