use super::{PulseSample, SensorReadings};
use crate::record::{RecordBuilder, Unit};

/// Number of accepted rates in the running average.
pub const RATE_SIZE: usize = 4;

/// IR level below which nothing is resting on the sensor.
pub const NO_FINGER_IR: u32 = 50_000;

const MIN_BPM: f32 = 20.0;
const MAX_BPM: f32 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseReport {
    pub ir: u32,
    /// Rate from the most recent beat interval, accepted or not.
    pub bpm: f32,
    /// Mean over the last [`RATE_SIZE`] accepted rates.
    pub avg_bpm: u32,
    pub finger_present: bool,
}

impl SensorReadings for PulseReport {
    fn append_to(&self, record: &mut RecordBuilder) {
        record
            .int("ir", self.ir as i64, Unit::Count)
            .float("bpm", self.bpm, Unit::BeatsPerMinute)
            .int("avgBpm", self.avg_bpm as i64, Unit::BeatsPerMinute);
    }
}

/// Turns beat events into an instantaneous and an averaged heart rate.
///
/// Rates outside (20, 255) bpm are shown but not averaged. The average is
/// taken over all slots, so it ramps up over the first few beats.
#[derive(Debug, Clone, Default)]
pub struct PulseTracker {
    rates: [u8; RATE_SIZE],
    next_slot: usize,
    last_beat_ms: Option<u64>,
    bpm: f32,
    avg_bpm: u32,
}

impl PulseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sample: PulseSample, now_ms: u64) -> PulseReport {
        if sample.beat {
            if let Some(last) = self.last_beat_ms {
                let delta_ms = now_ms.saturating_sub(last);
                if delta_ms > 0 {
                    self.bpm = 60.0 / (delta_ms as f32 / 1000.0);
                    if self.bpm > MIN_BPM && self.bpm < MAX_BPM {
                        self.rates[self.next_slot] = self.bpm as u8;
                        self.next_slot = (self.next_slot + 1) % RATE_SIZE;
                        let sum: u32 = self.rates.iter().map(|r| *r as u32).sum();
                        self.avg_bpm = sum / RATE_SIZE as u32;
                    }
                }
            }
            self.last_beat_ms = Some(now_ms);
        }

        PulseReport {
            ir: sample.ir,
            bpm: self.bpm,
            avg_bpm: self.avg_bpm,
            finger_present: sample.ir >= NO_FINGER_IR,
        }
    }
}
