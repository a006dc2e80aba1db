//! The per-cycle loop: sample, maybe upload, sleep
//!
//! Everything in a cycle is awaited in order on one task. The loop owns all
//! state that has to survive from one cycle to the next (upload schedule,
//! cycle count, and through the station its accumulators), so no locking is
//! involved.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::network::{Connector, PowerControl, WifiLink};
use crate::record::TelemetryRecord;
use crate::sensors::{SensorError, WakeReason};
use crate::status::{StatusCode, StatusIndicator};
use crate::upload::{HttpTransport, UploadTarget, upload};

/// Monotonic milliseconds since start-up.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// One kind of node: which sensors it has and what its record looks like.
pub trait Station {
    fn name(&self) -> &'static str;

    /// Bring the station's sensors up. Blocks until every mandatory sensor answers.
    fn start<S, D>(
        &mut self,
        wake: WakeReason,
        status: &mut S,
        delay: &mut D,
    ) -> impl Future<Output = Result<(), SensorError>>
    where
        S: StatusIndicator,
        D: DelayNs;

    /// Read the sensors and build this cycle's record.
    fn sample<S, D>(
        &mut self,
        now_ms: u64,
        status: &mut S,
        delay: &mut D,
    ) -> impl Future<Output = Result<TelemetryRecord, SensorError>>
    where
        S: StatusIndicator,
        D: DelayNs;
}

/// When records are uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSchedule {
    /// `None` uploads every cycle.
    interval_ms: Option<u64>,
    /// Counted from start-up, so the first interval has to elapse as well.
    last_attempt_ms: u64,
}

impl UploadSchedule {
    pub const fn every_cycle() -> Self {
        Self {
            interval_ms: None,
            last_attempt_ms: 0,
        }
    }

    pub const fn every(interval_ms: u64) -> Self {
        Self {
            interval_ms: Some(interval_ms),
            last_attempt_ms: 0,
        }
    }

    pub fn due(&self, now_ms: u64) -> bool {
        match self.interval_ms {
            None => true,
            Some(interval) => now_ms.saturating_sub(self.last_attempt_ms) >= interval,
        }
    }

    /// Record an attempt, successful or not.
    pub fn mark_attempted(&mut self, now_ms: u64) {
        self.last_attempt_ms = now_ms;
    }
}

/// What the node does between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPolicy {
    /// Stay awake and start a cycle every `period_ms`.
    Frame { period_ms: u32 },
    /// Power down; the next cycle starts from reset.
    DeepSleep { duration_ms: u64 },
}

/// Result of one cycle, mostly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No upload was due.
    Sampled,
    Uploaded { status: u16 },
    UploadFailed,
    NetworkUnavailable,
    /// The station could not produce a record; nothing was uploaded.
    SampleFailed,
}

/// Hardware the loop drives besides the station.
pub struct LoopDevices<T, P, S, C, D> {
    pub transport: T,
    pub power: P,
    pub status: S,
    pub clock: C,
    pub delay: D,
}

pub struct SamplingLoop<'a, St, L, T, P, S, C, D> {
    station: St,
    connector: Connector<'a, L>,
    devices: LoopDevices<T, P, S, C, D>,
    target: UploadTarget<'a>,
    schedule: UploadSchedule,
    sleep: SleepPolicy,
    cycles: u32,
}

impl<'a, St, L, T, P, S, C, D> SamplingLoop<'a, St, L, T, P, S, C, D>
where
    St: Station,
    L: WifiLink,
    T: HttpTransport,
    P: PowerControl,
    S: StatusIndicator,
    C: Clock,
    D: DelayNs,
{
    pub fn new(
        station: St,
        connector: Connector<'a, L>,
        devices: LoopDevices<T, P, S, C, D>,
        target: UploadTarget<'a>,
        schedule: UploadSchedule,
        sleep: SleepPolicy,
    ) -> Self {
        Self {
            station,
            connector,
            devices,
            target,
            schedule,
            sleep,
            cycles: 0,
        }
    }

    pub fn station(&self) -> &St {
        &self.station
    }

    pub fn devices(&self) -> &LoopDevices<T, P, S, C, D> {
        &self.devices
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Play the boot code and bring the station up.
    pub async fn start(&mut self, wake: WakeReason) -> Result<(), SensorError> {
        info!("Starting {} station ({:?})", self.station.name(), wake);
        self.devices.status.signal(StatusCode::Boot).await;
        self.station
            .start(wake, &mut self.devices.status, &mut self.devices.delay)
            .await
    }

    /// One full cycle including the sleep that follows it.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let started_ms = self.devices.clock.now_ms();
        self.cycles = self.cycles.wrapping_add(1);

        let outcome = match self
            .station
            .sample(started_ms, &mut self.devices.status, &mut self.devices.delay)
            .await
        {
            Err(e) => {
                error!("{}: sampling failed: {}", self.station.name(), e);
                CycleOutcome::SampleFailed
            }
            Ok(record) => {
                debug!("{}: {}", self.station.name(), record.serialize());
                if self.schedule.due(started_ms) {
                    self.schedule.mark_attempted(started_ms);
                    self.send(&record).await
                } else {
                    CycleOutcome::Sampled
                }
            }
        };

        self.sleep(started_ms).await;
        outcome
    }

    /// Cycle forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_cycle().await;
        }
    }

    async fn send(&mut self, record: &TelemetryRecord) -> CycleOutcome {
        if let Err(e) = self
            .connector
            .ensure_connected(&mut self.devices.power, &mut self.devices.status)
            .await
        {
            warn!("Upload skipped: {}", e);
            return CycleOutcome::NetworkUnavailable;
        }

        match upload(&mut self.devices.transport, record, &self.target).await {
            Ok(status) => {
                info!("Uploaded {} ({})", self.target.filename, status);
                CycleOutcome::Uploaded { status }
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", self.target.filename, e);
                CycleOutcome::UploadFailed
            }
        }
    }

    async fn sleep(&mut self, started_ms: u64) {
        match self.sleep {
            SleepPolicy::Frame { period_ms } => {
                let spent = self.devices.clock.now_ms().saturating_sub(started_ms);
                if let Some(rest) = u64::from(period_ms).checked_sub(spent)
                    && rest > 0
                {
                    self.devices.delay.delay_ms(rest as u32).await;
                }
            }
            SleepPolicy::DeepSleep { duration_ms } => {
                info!("Deep sleep for {} ms", duration_ms);
                self.devices.power.deep_sleep(duration_ms).await;
            }
        }
    }
}
