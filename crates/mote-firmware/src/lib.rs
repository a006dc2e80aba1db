//! ESP32-S3 bindings for mote
//!
//! Concrete implementations of the core's capability traits: sensor drivers,
//! the Wi-Fi link, the TCP transport, deep sleep and the status LED.

#![no_std]

extern crate alloc;

pub mod drivers;
pub mod hardware;
pub mod http;
pub mod secrets;
pub mod sensors;
pub mod wifi;
