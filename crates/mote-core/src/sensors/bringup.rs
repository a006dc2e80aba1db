use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use super::SensorError;
use crate::retry::{RetryPolicy, retry};
use crate::status::{StatusCode, StatusIndicator};

/// Why the processor is running this start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Power-on, reset button or watchdog.
    ColdBoot,
    /// Timer wake-up from deep sleep; peripherals kept their power.
    DeepSleepWake,
}

impl WakeReason {
    /// Sensors that kept running through deep sleep are resumed rather than restarted.
    pub const fn is_cold(self) -> bool {
        matches!(self, Self::ColdBoot)
    }
}

/// A sensor that needs an explicit start before it can be read.
pub trait Initialize {
    fn name(&self) -> &'static str;

    /// Probe and configure the device. `cold_start` requests a full device
    /// reset instead of resuming the configuration it is already running.
    fn begin(&mut self, cold_start: bool) -> impl Future<Output = Result<(), SensorError>>;
}

/// Bring-up parameters for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUp {
    /// Blink code shown after each failed probe.
    pub code: StatusCode,
    pub retry_interval_ms: u32,
    /// Force a full device reset once after this many failed probes.
    pub hard_reset_after: Option<u32>,
}

impl BringUp {
    pub const fn new(code: StatusCode) -> Self {
        Self {
            code,
            retry_interval_ms: 1000,
            hard_reset_after: None,
        }
    }

    pub const fn with_hard_reset_after(mut self, failures: u32) -> Self {
        self.hard_reset_after = Some(failures);
        self
    }
}

/// Block until `sensor` starts.
///
/// A node never reports a cycle with a mandatory sensor missing, so this
/// keeps probing for as long as it takes. The pause after a forced hard
/// reset doubles as the device's settle time. Returns the number of probes.
pub async fn bring_up<T, S, D>(
    sensor: &mut T,
    wake: WakeReason,
    plan: BringUp,
    status: &mut S,
    delay: &mut D,
) -> Result<u32, SensorError>
where
    T: Initialize,
    S: StatusIndicator,
    D: DelayNs,
{
    let name = sensor.name();
    let cold_start = wake.is_cold();

    let result = retry(
        RetryPolicy::unbounded(plan.retry_interval_ms),
        delay,
        async |attempt| match sensor.begin(cold_start).await {
            Ok(()) => Ok(attempt),
            Err(e) => {
                warn!("{} not found ({}), attempt {}", name, e, attempt);
                status.signal(plan.code).await;
                if plan.hard_reset_after == Some(attempt) {
                    warn!("{}: forcing a hard reset", name);
                    if let Err(e) = sensor.begin(true).await {
                        warn!("{}: hard reset failed: {}", name, e);
                    }
                }
                Err(e)
            }
        },
    )
    .await;

    match result {
        Ok(attempts) => {
            info!("{} ready after {} attempt(s)", name, attempts);
            Ok(attempts)
        }
        Err(exhausted) => Err(exhausted.last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockInit, RecordingStatus};
    use embassy_futures::block_on;

    #[test]
    fn test_blocks_until_sensor_answers() {
        let mut sensor = MockInit::failing_for(3);
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        let attempts = block_on(bring_up(
            &mut sensor,
            WakeReason::ColdBoot,
            BringUp::new(StatusCode::EnvironmentNotFound),
            &mut status,
            &mut delay,
        ))
        .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(status.codes, vec![StatusCode::EnvironmentNotFound; 3]);
        assert_eq!(delay.calls, vec![1000; 3]);
        assert!(sensor.begins.iter().all(|cold| *cold));
    }

    #[test]
    fn test_deep_sleep_wake_resumes_without_cold_start() {
        let mut sensor = MockInit::failing_for(0);

        block_on(bring_up(
            &mut sensor,
            WakeReason::DeepSleepWake,
            BringUp::new(StatusCode::GasNotFound),
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ))
        .unwrap();

        assert_eq!(sensor.begins, vec![false]);
    }

    #[test]
    fn test_hard_reset_escalation_fires_once() {
        let mut sensor = MockInit::failing_for(70);
        let plan = BringUp::new(StatusCode::GasNotFound).with_hard_reset_after(60);

        let attempts = block_on(bring_up(
            &mut sensor,
            WakeReason::DeepSleepWake,
            plan,
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ))
        .unwrap();

        // the forced reset consumes one of the 70 failing calls
        assert_eq!(attempts, 70);
        assert_eq!(sensor.begins.len(), 71);
        assert_eq!(sensor.begins.iter().filter(|cold| **cold).count(), 1);
        assert!(sensor.begins[60]);
    }
}
