use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use super::{EnvironmentReadings, GasReadings, GasSensor, SensorError};
use crate::retry::{RetryPolicy, retry};
use crate::status::{StatusCode, StatusIndicator};

const GAS_SENSOR: &str = "gas sensor";

/// Time between availability polls of the gas sensor.
pub const GAS_POLL_INTERVAL_MS: u32 = 500;

/// How long [`read_gas`] keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasReadPolicy {
    pub poll_interval_ms: u32,
    /// `None` waits for as long as the sensor needs, which after a cold start
    /// can be minutes. A bound turns a sensor that never delivers into a
    /// [`SensorError::Timeout`] instead of a stalled node.
    pub max_polls: Option<u32>,
}

impl Default for GasReadPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: GAS_POLL_INTERVAL_MS,
            max_polls: None,
        }
    }
}

/// Wait for a valid, compensated conversion from the gas sensor.
///
/// Every poll first refreshes the sensor's temperature estimate and feeds it
/// the latest ambient humidity and temperature. Polls where no data is
/// available, where the device flags an error, or where both channels read
/// zero are retried after `poll_interval_ms`.
pub async fn read_gas<G, S, D>(
    gas: &mut G,
    ambient: &EnvironmentReadings,
    policy: GasReadPolicy,
    status: &mut S,
    delay: &mut D,
) -> Result<GasReadings, SensorError>
where
    G: GasSensor,
    S: StatusIndicator,
    D: DelayNs,
{
    let retry_policy = RetryPolicy {
        interval_ms: policy.poll_interval_ms,
        max_attempts: policy.max_polls,
    };

    retry(retry_policy, delay, async |_| {
        poll_once(&mut *gas, ambient, &mut *status).await
    })
    .await
    .map_err(|exhausted| {
        warn!(
            "Gas sensor gave no valid data after {} polls, last error: {}",
            exhausted.attempts, exhausted.last
        );
        SensorError::Timeout {
            sensor: exhausted.last.sensor(),
            operation: "wait for valid gas data",
        }
    })
}

async fn poll_once<G, S>(
    gas: &mut G,
    ambient: &EnvironmentReadings,
    status: &mut S,
) -> Result<GasReadings, SensorError>
where
    G: GasSensor,
    S: StatusIndicator,
{
    let sensor_temperature_celsius = match gas.calculate_temperature().await {
        Ok(t) => t,
        Err(e) => {
            warn!("Gas sensor temperature unavailable: {}", e);
            f32::NAN
        }
    };

    if ambient.humidity_percent.is_finite() && ambient.temperature_celsius.is_finite() {
        if let Err(e) = gas
            .set_environmental_data(ambient.humidity_percent, ambient.temperature_celsius)
            .await
        {
            warn!("Gas sensor compensation not applied: {}", e);
        }
    }

    match gas.available().await {
        Ok(false) => {
            info!("Gas sensor: waiting");
            status.signal(StatusCode::GasWaiting).await;
            Err(SensorError::DataPending { sensor: GAS_SENSOR })
        }
        Err(e) => {
            warn!("Gas sensor: status check failed: {}", e);
            status.signal(StatusCode::GasReadError).await;
            Err(e)
        }
        Ok(true) => match gas.read_data().await {
            Err(e) => {
                warn!("Gas sensor: error reading data: {}", e);
                status.signal(StatusCode::GasReadError).await;
                Err(e)
            }
            Ok(data) if data.is_sentinel() => {
                info!("Gas sensor: skipping zero values");
                status.signal(StatusCode::GasSkipping).await;
                Err(SensorError::DataPending { sensor: GAS_SENSOR })
            }
            Ok(data) => Ok(GasReadings {
                sensor_temperature_celsius,
                data,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockGas, RecordingStatus};
    use crate::sensors::GasData;
    use embassy_futures::block_on;

    const AMBIENT: EnvironmentReadings = EnvironmentReadings {
        temperature_celsius: 22.5,
        humidity_percent: 45.0,
        pressure_hpa: 1000.0,
    };

    const GOOD: GasData = GasData {
        eco2_ppm: 450,
        tvoc_ppb: 12,
    };

    #[test]
    fn test_zero_values_are_discarded_and_retried() {
        let mut gas = MockGas::default();
        gas.available.extend([Ok(true), Ok(true)]);
        gas.data.extend([Ok(GasData::default()), Ok(GOOD)]);
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        let readings = block_on(read_gas(
            &mut gas,
            &AMBIENT,
            GasReadPolicy::default(),
            &mut status,
            &mut delay,
        ))
        .unwrap();

        assert_eq!(readings.data, GOOD);
        assert_eq!(status.codes, vec![StatusCode::GasSkipping]);
        assert_eq!(delay.calls, vec![GAS_POLL_INTERVAL_MS]);
    }

    #[test]
    fn test_waits_until_available_and_compensates_every_poll() {
        let mut gas = MockGas::default();
        gas.available.extend([Ok(false), Ok(false), Ok(false), Ok(true)]);
        gas.data.push_back(Ok(GOOD));
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        let readings = block_on(read_gas(
            &mut gas,
            &AMBIENT,
            GasReadPolicy::default(),
            &mut status,
            &mut delay,
        ))
        .unwrap();

        assert_eq!(readings.sensor_temperature_celsius, gas.temperature);
        assert_eq!(gas.environment_calls, vec![(45.0, 22.5); 4]);
        assert_eq!(status.codes, vec![StatusCode::GasWaiting; 3]);
        assert_eq!(delay.total_ms(), 3 * 500);
    }

    #[test]
    fn test_device_error_is_retried() {
        let mut gas = MockGas::default();
        gas.available.extend([Ok(true), Ok(true)]);
        gas.data.extend([
            Err(SensorError::Device {
                sensor: "CCS811",
                code: 0x10,
            }),
            Ok(GOOD),
        ]);
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();

        let readings = block_on(read_gas(
            &mut gas,
            &AMBIENT,
            GasReadPolicy::default(),
            &mut status,
            &mut delay,
        ))
        .unwrap();

        assert_eq!(readings.data, GOOD);
        assert_eq!(status.codes, vec![StatusCode::GasReadError]);
    }

    #[test]
    fn test_bounded_policy_times_out() {
        let mut gas = MockGas::default();
        let mut status = RecordingStatus::default();
        let mut delay = MockDelay::default();
        let policy = GasReadPolicy {
            poll_interval_ms: 500,
            max_polls: Some(5),
        };

        let err = block_on(read_gas(&mut gas, &AMBIENT, policy, &mut status, &mut delay))
            .unwrap_err();

        assert!(matches!(err, SensorError::Timeout { .. }));
        assert_eq!(status.codes.len(), 5);
        assert_eq!(delay.calls.len(), 4);
    }

    #[test]
    fn test_missing_ambient_skips_compensation() {
        let mut gas = MockGas::default();
        gas.available.push_back(Ok(true));
        gas.data.push_back(Ok(GOOD));
        let ambient = EnvironmentReadings {
            temperature_celsius: f32::NAN,
            ..AMBIENT
        };

        block_on(read_gas(
            &mut gas,
            &ambient,
            GasReadPolicy::default(),
            &mut RecordingStatus::default(),
            &mut MockDelay::default(),
        ))
        .unwrap();

        assert!(gas.environment_calls.is_empty());
    }
}
