//! The three node variants
//!
//! Each station knows its sensors, how to start them and the column order of
//! its record. Upload file, schedule and sleep behaviour per station are the
//! `*_FILE`, `*_SCHEDULE` and `*_SLEEP` constants.

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::battery::{BatteryMonitor, BatterySample};
use crate::display::DisplayRenderer;
use crate::record::{TelemetryRecord, Unit};
use crate::sampling::{SleepPolicy, Station, UploadSchedule};
use crate::sensors::{
    AnalogInput, BringUp, ColorSensor, EnvironmentSensor, FuelGauge, GasReadPolicy, GasSensor,
    Initialize, PowerMonitor, PulseSensor, PulseTracker, SensorError,
    SensorReadings, WakeReason, bring_up, read_gas,
};
use crate::status::{StatusCode, StatusIndicator};

pub const ENVIRONMENT_FILE: &str = "sensors.csv";
pub const ENVIRONMENT_SCHEDULE: UploadSchedule = UploadSchedule::every_cycle();
pub const ENVIRONMENT_SLEEP: SleepPolicy = SleepPolicy::DeepSleep {
    duration_ms: 5 * 60 * 1000,
};

pub const BATTERY_FILE: &str = "battery.csv";
pub const BATTERY_SCHEDULE: UploadSchedule = UploadSchedule::every(60 * 1000);
pub const BATTERY_SLEEP: SleepPolicy = SleepPolicy::Frame { period_ms: 1000 };

pub const PULSE_FILE: &str = "pulse.csv";
pub const PULSE_SCHEDULE: UploadSchedule = UploadSchedule::every(10 * 1000);
pub const PULSE_SLEEP: SleepPolicy = SleepPolicy::Frame { period_ms: 20 };

/// Failed attempts after which the gas sensor is forced through a full reset.
/// The deployed nodes count 60 retries past the first attempt.
pub const GAS_HARD_RESET_AFTER: u32 = 61;

/// Indoor air node: climate, air quality, light and one analog channel.
pub struct EnvironmentStation<E, G, C, A> {
    environment: E,
    gas: G,
    color: C,
    analog: A,
    gas_policy: GasReadPolicy,
}

impl<E, G, C, A> EnvironmentStation<E, G, C, A>
where
    E: EnvironmentSensor + Initialize,
    G: GasSensor + Initialize,
    C: ColorSensor + Initialize,
    A: AnalogInput,
{
    pub fn new(environment: E, gas: G, color: C, analog: A) -> Self {
        Self {
            environment,
            gas,
            color,
            analog,
            gas_policy: GasReadPolicy::default(),
        }
    }

    pub fn with_gas_policy(mut self, policy: GasReadPolicy) -> Self {
        self.gas_policy = policy;
        self
    }
}

impl<E, G, C, A> Station for EnvironmentStation<E, G, C, A>
where
    E: EnvironmentSensor + Initialize,
    G: GasSensor + Initialize,
    C: ColorSensor + Initialize,
    A: AnalogInput,
{
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn start<S, D>(
        &mut self,
        wake: WakeReason,
        status: &mut S,
        delay: &mut D,
    ) -> Result<(), SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        bring_up(
            &mut self.environment,
            wake,
            BringUp::new(StatusCode::EnvironmentNotFound),
            status,
            delay,
        )
        .await?;
        bring_up(
            &mut self.gas,
            wake,
            BringUp::new(StatusCode::GasNotFound).with_hard_reset_after(GAS_HARD_RESET_AFTER),
            status,
            delay,
        )
        .await?;
        bring_up(
            &mut self.color,
            wake,
            BringUp::new(StatusCode::ColorNotFound),
            status,
            delay,
        )
        .await?;
        Ok(())
    }

    async fn sample<S, D>(
        &mut self,
        _now_ms: u64,
        status: &mut S,
        delay: &mut D,
    ) -> Result<TelemetryRecord, SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        let ambient = self.environment.read().await?;
        let gas = read_gas(&mut self.gas, &ambient, self.gas_policy, status, delay).await?;
        let analog = self.analog.read_raw().await?;
        let color = self.color.read_color().await?;

        let mut record = TelemetryRecord::builder();
        ambient.append_to(&mut record);
        gas.append_to(&mut record);
        record.int("analog", analog as i64, Unit::Count);
        color.append_to(&mut record);
        Ok(record.build())
    }
}

/// Battery test rig: charge accounting with a local status page.
pub struct BatteryStation<M, G, R> {
    monitor: BatteryMonitor<M, G>,
    display: R,
    last: Option<BatterySample>,
}

impl<M, G, R> BatteryStation<M, G, R>
where
    M: PowerMonitor + Initialize,
    G: FuelGauge,
    R: DisplayRenderer,
{
    pub fn new(monitor: M, gauge: G, display: R) -> Self {
        Self {
            monitor: BatteryMonitor::new(monitor, gauge),
            display,
            last: None,
        }
    }

    pub fn monitor(&self) -> &BatteryMonitor<M, G> {
        &self.monitor
    }

    pub fn display(&self) -> &R {
        &self.display
    }

    /// Sample of the most recent successful cycle.
    pub fn last(&self) -> Option<&BatterySample> {
        self.last.as_ref()
    }
}

impl<M, G, R> Station for BatteryStation<M, G, R>
where
    M: PowerMonitor + Initialize,
    G: FuelGauge,
    R: DisplayRenderer,
    R::Error: core::fmt::Debug,
{
    fn name(&self) -> &'static str {
        "battery"
    }

    async fn start<S, D>(
        &mut self,
        wake: WakeReason,
        status: &mut S,
        delay: &mut D,
    ) -> Result<(), SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        bring_up(
            self.monitor.sensor_mut(),
            wake,
            BringUp::new(StatusCode::PowerMonitorNotFound),
            status,
            delay,
        )
        .await?;
        Ok(())
    }

    async fn sample<S, D>(
        &mut self,
        now_ms: u64,
        _status: &mut S,
        _delay: &mut D,
    ) -> Result<TelemetryRecord, SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        let sample = self.monitor.step(now_ms).await?;
        if let Err(e) = self.display.render(&sample) {
            warn!("Display update failed: {:?}", e);
        }
        self.last = Some(sample);

        let mut record = TelemetryRecord::builder();
        sample.append_to(&mut record);
        Ok(record.build())
    }
}

/// Finger clip heart-rate monitor.
pub struct PulseStation<P> {
    sensor: P,
    tracker: PulseTracker,
    finger_present: bool,
}

impl<P> PulseStation<P>
where
    P: PulseSensor + Initialize,
{
    pub fn new(sensor: P) -> Self {
        Self {
            sensor,
            tracker: PulseTracker::new(),
            finger_present: false,
        }
    }
}

impl<P> Station for PulseStation<P>
where
    P: PulseSensor + Initialize,
{
    fn name(&self) -> &'static str {
        "pulse"
    }

    async fn start<S, D>(
        &mut self,
        wake: WakeReason,
        status: &mut S,
        delay: &mut D,
    ) -> Result<(), SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        bring_up(
            &mut self.sensor,
            wake,
            BringUp::new(StatusCode::PulseNotFound),
            status,
            delay,
        )
        .await?;
        info!("Place your index finger on the sensor with steady pressure");
        Ok(())
    }

    async fn sample<S, D>(
        &mut self,
        now_ms: u64,
        _status: &mut S,
        _delay: &mut D,
    ) -> Result<TelemetryRecord, SensorError>
    where
        S: StatusIndicator,
        D: DelayNs,
    {
        let sample = self.sensor.read().await?;
        let report = self.tracker.update(sample, now_ms);
        if report.finger_present != self.finger_present {
            self.finger_present = report.finger_present;
            if !report.finger_present {
                info!("No finger?");
            }
        }

        let mut record = TelemetryRecord::builder();
        report.append_to(&mut record);
        Ok(record.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::NoDisplay;
    use crate::mock::{
        MockAnalog, MockColor, MockDelay, MockEnvironment, MockGas, MockGauge, MockInit,
        MockPowerMonitor, MockPulse, RecordingStatus,
    };
    use crate::record::{BATTERY_LAYOUT, ENVIRONMENT_LAYOUT, PULSE_LAYOUT};
    use crate::sensors::{ColorReadings, EnvironmentReadings, GasData, PowerReadings, PulseSample};
    use embassy_futures::block_on;

    fn environment_station() -> EnvironmentStation<MockEnvironment, MockGas, MockColor, MockAnalog>
    {
        let mut gas = MockGas::default();
        gas.temperature = 24.0;
        gas.available.push_back(Ok(true));
        gas.data.push_back(Ok(GasData {
            eco2_ppm: 612,
            tvoc_ppb: 31,
        }));
        EnvironmentStation::new(
            MockEnvironment::reading(EnvironmentReadings {
                temperature_celsius: 21.5,
                humidity_percent: 40.25,
                pressure_hpa: 1001.5,
            }),
            gas,
            MockColor::reading(ColorReadings {
                red: 10,
                green: 20,
                blue: 30,
                clear: 70,
            }),
            MockAnalog(512),
        )
    }

    #[test]
    fn test_environment_record() {
        let mut station = environment_station();
        let record = block_on(station.sample(
            0,
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ))
        .unwrap();

        assert!(record.matches_layout(ENVIRONMENT_LAYOUT));
        assert_eq!(
            record.serialize(),
            "21.50,40.25,1001.50,24.00,612.00,31.00,512,10,20,30,70"
        );
    }

    #[test]
    fn test_environment_start_order_and_codes() {
        let mut station = environment_station();
        station.environment.init = MockInit::failing_for(2);
        station.color.init = MockInit::failing_for(1);
        let mut status = RecordingStatus::default();

        block_on(station.start(
            WakeReason::ColdBoot,
            &mut status,
            &mut MockDelay::default(),
        ))
        .unwrap();

        assert_eq!(
            status.codes,
            vec![
                StatusCode::EnvironmentNotFound,
                StatusCode::EnvironmentNotFound,
                StatusCode::ColorNotFound,
            ]
        );
    }

    #[test]
    fn test_environment_failure_skips_the_record() {
        let mut station = environment_station();
        station.environment.fail = true;
        let result = block_on(station.sample(
            0,
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_battery_record_and_display() {
        let power = PowerReadings {
            current_ma: 12.5,
            bus_voltage_v: 3.8,
            shunt_voltage_mv: 0.0,
        };
        let mut station = BatteryStation::new(
            MockPowerMonitor::new(&[power, power]),
            MockGauge::default(),
            NoDisplay,
        );
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        block_on(station.sample(0, &mut status, &mut delay)).unwrap();
        let record = block_on(station.sample(1000, &mut status, &mut delay)).unwrap();

        assert!(record.matches_layout(BATTERY_LAYOUT));
        assert_eq!(station.last().map(|s| s.elapsed_ms), Some(1000));
        assert_eq!(station.monitor().accumulator().discharged_ms, 1000);
    }

    #[test]
    fn test_environment_gas_hard_reset_after_sixty_retries() {
        let mut station = environment_station();
        station.gas.init = MockInit::failing_for(70);

        block_on(station.start(
            WakeReason::DeepSleepWake,
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ))
        .unwrap();

        let begins = &station.gas.init.begins;
        // 61 warm attempts, then the forced cold one
        assert!(begins[..61].iter().all(|cold| !*cold));
        assert!(begins[61]);
        assert_eq!(begins.iter().filter(|cold| **cold).count(), 1);
    }

    #[test]
    fn test_battery_start_waits_for_monitor() {
        let mut monitor = MockPowerMonitor::new(&[]);
        monitor.init = MockInit::failing_for(3);
        let mut station = BatteryStation::new(monitor, MockGauge::default(), NoDisplay);
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        block_on(station.start(WakeReason::ColdBoot, &mut status, &mut delay)).unwrap();

        assert_eq!(status.codes, vec![StatusCode::PowerMonitorNotFound; 3]);
        assert_eq!(station.monitor.sensor_mut().init.begins, vec![true; 4]);
        assert_eq!(delay.calls, vec![1000; 3]);
    }

    #[test]
    fn test_pulse_record() {
        let mut station = PulseStation::new(MockPulse::new(&[
            PulseSample {
                ir: 90_000,
                beat: true,
            },
            PulseSample {
                ir: 91_000,
                beat: true,
            },
        ]));
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        block_on(station.sample(0, &mut status, &mut delay)).unwrap();
        let record = block_on(station.sample(750, &mut status, &mut delay)).unwrap();

        assert!(record.matches_layout(PULSE_LAYOUT));
        assert_eq!(record.serialize(), "91000,80.00,20");
    }

    #[test]
    fn test_station_defaults() {
        assert_eq!(
            ENVIRONMENT_SLEEP,
            SleepPolicy::DeepSleep {
                duration_ms: 300_000
            }
        );
        assert!(ENVIRONMENT_SCHEDULE.due(0));
        assert!(!BATTERY_SCHEDULE.due(59_000));
        assert!(PULSE_SCHEDULE.due(10_000));
    }
}
