//! Telemetry records
//!
//! A record is one line of comma separated values. Field order is fixed per
//! station and the collector appends lines to a CSV file, so the rendering
//! of every value has to be stable: floats always carry two decimals and
//! integers none, which is what the existing files on the collector contain.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

/// Field order of the environment station.
pub const ENVIRONMENT_LAYOUT: &[&str] = &[
    "temp", "hum", "pres", "ccsTemp", "eCO2", "tVOC", "analog", "r", "g", "b", "c",
];

/// Field order of the battery station.
pub const BATTERY_LAYOUT: &[&str] = &[
    "charged_mA",
    "charged_ms",
    "discharged_mA",
    "discharged_ms",
    "current_mA",
    "loadVoltage",
];

/// Field order of the pulse station.
pub const PULSE_LAYOUT: &[&str] = &["ir", "bpm", "avgBpm"];

/// Unit a reading is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Percent,
    Hectopascal,
    PartsPerMillion,
    PartsPerBillion,
    /// Raw ADC or photodiode counts
    Count,
    Milliamp,
    MilliampHour,
    Millisecond,
    Volt,
    BeatsPerMinute,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i64),
}

/// A named value as produced by a sensor or derived by a station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub value: Value,
    pub unit: Unit,
    /// Invalid readings are still written, as `nan`, so columns stay aligned.
    pub valid: bool,
}

impl Reading {
    pub fn float(name: &'static str, value: f32, unit: Unit) -> Self {
        Self {
            name,
            value: Value::Float(value),
            unit,
            valid: value.is_finite(),
        }
    }

    pub fn int(name: &'static str, value: i64, unit: Unit) -> Self {
        Self {
            name,
            value: Value::Int(value),
            unit,
            valid: true,
        }
    }

    fn write_value(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = match self.value {
            _ if !self.valid => out.write_str("nan"),
            Value::Float(v) => write!(out, "{:.2}", v),
            Value::Int(v) => write!(out, "{}", v),
        };
    }
}

/// One immutable line of telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    fields: Vec<Reading>,
}

impl TelemetryRecord {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    pub fn fields(&self) -> &[Reading] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names joined the same way as the values.
    pub fn header(&self) -> String {
        let mut out = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(field.name);
        }
        out
    }

    /// The comma joined line that is uploaded.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.fields.len() * 8);
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            field.write_value(&mut out);
        }
        out
    }

    /// Whether the field names are exactly `layout`, in order.
    pub fn matches_layout(&self, layout: &[&str]) -> bool {
        self.fields.len() == layout.len()
            && self.fields.iter().zip(layout).all(|(f, name)| f.name == *name)
    }
}

#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<Reading>,
}

impl RecordBuilder {
    pub fn push(&mut self, reading: Reading) -> &mut Self {
        self.fields.push(reading);
        self
    }

    pub fn float(&mut self, name: &'static str, value: f32, unit: Unit) -> &mut Self {
        self.push(Reading::float(name, value, unit))
    }

    pub fn int(&mut self, name: &'static str, value: i64, unit: Unit) -> &mut Self {
        self.push(Reading::int(name, value, unit))
    }

    pub fn build(self) -> TelemetryRecord {
        TelemetryRecord {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryRecord {
        let mut builder = TelemetryRecord::builder();
        builder
            .float("temp", 21.456, Unit::Celsius)
            .float("hum", 40.0, Unit::Percent)
            .int("analog", 512, Unit::Count);
        builder.build()
    }

    #[test]
    fn test_serialize_two_decimals_for_floats_none_for_ints() {
        assert_eq!(sample().serialize(), "21.46,40.00,512");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);
        assert_eq!(a.serialize().as_bytes(), b.serialize().as_bytes());
    }

    #[test]
    fn test_invalid_values_render_as_nan() {
        let mut builder = TelemetryRecord::builder();
        builder
            .float("pres", f32::NAN, Unit::Hectopascal)
            .float("temp", -3.5, Unit::Celsius);
        let record = builder.build();

        assert!(!record.fields()[0].valid);
        assert_eq!(record.serialize(), "nan,-3.50");
    }

    #[test]
    fn test_header_and_layout() {
        let record = sample();
        assert_eq!(record.header(), "temp,hum,analog");
        assert!(record.matches_layout(&["temp", "hum", "analog"]));
        assert!(!record.matches_layout(&["temp", "analog", "hum"]));
        assert!(!record.matches_layout(&["temp", "hum"]));
    }

    #[test]
    fn test_empty_record() {
        let record = TelemetryRecord::builder().build();
        assert!(record.is_empty());
        assert_eq!(record.serialize(), "");
    }
}
