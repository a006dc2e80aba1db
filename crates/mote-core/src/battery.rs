//! Battery state classification and charge accounting
//!
//! A high-side monitor in series with the battery reports signed current:
//! negative while a charger pushes current in, positive while the node runs
//! from the cell. Each cycle is classified from that current and the load
//! voltage, and the elapsed time since the previous cycle is integrated into
//! the bucket of the current state.

use log::{info, warn};

use crate::record::{RecordBuilder, Unit};
use crate::sensors::{FuelGauge, PowerMonitor, PowerReadings, SensorError, SensorReadings};

/// Dead band around zero current, in mA.
pub const CURRENT_THRESHOLD_MA: f32 = 3.0;
/// Below this load voltage no cell is connected.
pub const MISSING_BELOW_V: f32 = 3.0;
/// At or above this the rail is still coming up from USB.
pub const BOOTING_FROM_V: f32 = 4.9;
/// Voltage that normalized currents refer to.
pub const REFERENCE_VOLTAGE_V: f32 = 3.7;
/// Load voltage shown as an empty gauge.
pub const EMPTY_V: f32 = 3.0;
/// Load voltage shown as a full gauge.
pub const FULL_V: f32 = 4.2;

const MS_PER_HOUR: f32 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Charging,
    Discharging,
    Idling,
    Missing,
    /// Transient supply state right after power-up. Shown, never accounted.
    Booting,
}

impl DeviceState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Charging => "Charging",
            Self::Discharging => "Discharging",
            Self::Idling => "Idling",
            Self::Missing => "Missing",
            Self::Booting => "Booting",
        }
    }

    /// Whether the state takes part in accounting and transition detection.
    pub const fn is_persisted(self) -> bool {
        !matches!(self, Self::Booting)
    }
}

/// Classify one sample. Voltage checks take precedence over current.
pub fn classify(current_ma: f32, load_voltage_v: f32) -> DeviceState {
    if load_voltage_v >= BOOTING_FROM_V {
        DeviceState::Booting
    } else if load_voltage_v < MISSING_BELOW_V {
        DeviceState::Missing
    } else if current_ma < -CURRENT_THRESHOLD_MA {
        DeviceState::Charging
    } else if current_ma > CURRENT_THRESHOLD_MA {
        DeviceState::Discharging
    } else {
        DeviceState::Idling
    }
}

/// Scale a current measured at `load_voltage_v` to the reference voltage.
pub fn normalize_current(current_ma: f32, load_voltage_v: f32) -> f32 {
    current_ma * load_voltage_v / REFERENCE_VOLTAGE_V
}

/// Charge moved and time spent per direction since the current run began.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Accumulator {
    pub charged_mah: f32,
    pub charged_ms: u64,
    pub discharged_mah: f32,
    pub discharged_ms: u64,
}

impl Accumulator {
    /// Add one cycle. Only charging and discharging cycles contribute.
    pub fn integrate(&mut self, state: DeviceState, elapsed_ms: u64, normalized_ma: f32) {
        let hours = elapsed_ms as f32 / MS_PER_HOUR;
        match state {
            DeviceState::Charging => {
                self.charged_mah += -normalized_ma * hours;
                self.charged_ms += elapsed_ms;
            }
            DeviceState::Discharging => {
                self.discharged_mah += normalized_ma * hours;
                self.discharged_ms += elapsed_ms;
            }
            DeviceState::Idling | DeviceState::Missing | DeviceState::Booting => {}
        }
    }

    /// Zero the bucket that `state` integrates into.
    pub fn restart(&mut self, state: DeviceState) {
        match state {
            DeviceState::Charging => {
                self.charged_mah = 0.0;
                self.charged_ms = 0;
            }
            DeviceState::Discharging => {
                self.discharged_mah = 0.0;
                self.discharged_ms = 0;
            }
            DeviceState::Idling | DeviceState::Missing | DeviceState::Booting => {}
        }
    }
}

/// One classified cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    pub power: PowerReadings,
    pub load_voltage_v: f32,
    pub normalized_ma: f32,
    pub state: DeviceState,
    pub elapsed_ms: u64,
    /// The persisted state changed on this cycle.
    pub transition: bool,
    pub accumulator: Accumulator,
}

impl SensorReadings for BatterySample {
    fn append_to(&self, record: &mut RecordBuilder) {
        record
            .float("charged_mA", self.accumulator.charged_mah, Unit::MilliampHour)
            .int("charged_ms", self.accumulator.charged_ms as i64, Unit::Millisecond)
            .float(
                "discharged_mA",
                self.accumulator.discharged_mah,
                Unit::MilliampHour,
            )
            .int(
                "discharged_ms",
                self.accumulator.discharged_ms as i64,
                Unit::Millisecond,
            )
            .float("current_mA", self.power.current_ma, Unit::Milliamp)
            .float("loadVoltage", self.load_voltage_v, Unit::Volt);
    }
}

/// Owns the accounting state of the battery station.
///
/// The previous state and the last cycle's timestamp live here rather than
/// in globals; nothing else touches them.
pub struct BatteryMonitor<M, G> {
    monitor: M,
    gauge: G,
    accumulator: Accumulator,
    previous: Option<DeviceState>,
    last_step_ms: Option<u64>,
    resets: u32,
}

impl<M, G> BatteryMonitor<M, G>
where
    M: PowerMonitor,
    G: FuelGauge,
{
    pub fn new(monitor: M, gauge: G) -> Self {
        Self {
            monitor,
            gauge,
            accumulator: Accumulator::default(),
            previous: None,
            last_step_ms: None,
            resets: 0,
        }
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Last persisted state, `None` before the first accountable cycle.
    pub fn previous(&self) -> Option<DeviceState> {
        self.previous
    }

    /// Fuel gauge resets requested so far.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn gauge(&self) -> &G {
        &self.gauge
    }

    pub fn sensor_mut(&mut self) -> &mut M {
        &mut self.monitor
    }

    /// Run one cycle: read, classify, account.
    ///
    /// The first cycle integrates nothing. On a change between persisted
    /// states the fuel gauge is reset once and the new state's bucket starts
    /// over, so this cycle is the first of the new run.
    pub async fn step(&mut self, now_ms: u64) -> Result<BatterySample, SensorError> {
        let elapsed_ms = self
            .last_step_ms
            .map_or(0, |last| now_ms.saturating_sub(last));
        self.last_step_ms = Some(now_ms);

        let power = self.monitor.read().await?;
        let load_voltage_v = power.load_voltage_v();
        let state = classify(power.current_ma, load_voltage_v);
        let normalized_ma = normalize_current(power.current_ma, load_voltage_v);

        let mut transition = false;
        if state.is_persisted() {
            if let Some(previous) = self.previous
                && previous != state
            {
                info!("Battery: {} -> {}", previous.label(), state.label());
                transition = true;
                self.resets += 1;
                if let Err(e) = self.gauge.reset().await {
                    warn!("Fuel gauge reset failed: {}", e);
                }
                self.accumulator.restart(state);
            }
            self.previous = Some(state);
        }

        self.accumulator.integrate(state, elapsed_ms, normalized_ma);

        Ok(BatterySample {
            power,
            load_voltage_v,
            normalized_ma,
            state,
            elapsed_ms,
            transition,
            accumulator: self.accumulator,
        })
    }
}

/// How the gauge percentage is bounded before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClampPolicy {
    /// Floor at 10 only. Values above 100 pass through, as the deployed
    /// battery display has always drawn them.
    #[default]
    Observed,
    /// Clamp to [10, 100].
    Bounded,
}

pub const DISPLAY_PERCENT_FLOOR: i32 = 10;
pub const DISPLAY_PERCENT_CAP: i32 = 100;

pub fn clamp_display_percent(percent: i32, policy: ClampPolicy) -> i32 {
    match policy {
        ClampPolicy::Observed => percent.max(DISPLAY_PERCENT_FLOOR),
        ClampPolicy::Bounded => percent.clamp(DISPLAY_PERCENT_FLOOR, DISPLAY_PERCENT_CAP),
    }
}

/// Linear charge estimate from the load voltage, unbounded.
pub fn battery_percent(load_voltage_v: f32) -> i32 {
    let percent = (load_voltage_v - EMPTY_V) / (FULL_V - EMPTY_V) * 100.0;
    // round half away from zero; `f32::round` needs std
    if percent >= 0.0 {
        (percent + 0.5) as i32
    } else {
        (percent - 0.5) as i32
    }
}
