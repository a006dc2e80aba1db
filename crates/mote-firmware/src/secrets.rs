//! Node settings baked in at build time by `build.rs`.

use mote_core::config::Config;

macro_rules! setting {
    ($key:literal, $default:literal) => {
        match option_env!($key) {
            Some(value) => value,
            None => $default,
        }
    };
}

pub const WIFI_SSID: &str = setting!("MOTE_WIFI_SSID", "");
pub const WIFI_PASSWORD: &str = setting!("MOTE_WIFI_PASSWORD", "");
pub const HOSTNAME: &str = setting!("MOTE_HOSTNAME", "mote");
pub const COLLECTOR: &str = setting!("MOTE_COLLECTOR", "mini-iot.local");

pub const CONFIG: Config<'static> = Config::new(WIFI_SSID, WIFI_PASSWORD, HOSTNAME, COLLECTOR);
