//! Hardware-independent core library for mote
//!
//! This crate contains all platform-agnostic logic for the mote sensor
//! telemetry node: sensor capability traits and reading policies, the battery
//! state classifier and accumulators, record serialization, the HTTP upload
//! path, the Wi-Fi connect policy, status indication and the sampling loop.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod battery;
pub mod config;
pub mod display;
pub mod http;
pub mod network;
pub mod record;
pub mod retry;
pub mod sampling;
pub mod sensors;
pub mod shared_i2c;
pub mod station;
pub mod status;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;
