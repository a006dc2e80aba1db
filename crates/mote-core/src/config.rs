//! Build-time configuration for a node.
//!
//! Values are injected by the firmware at compile time; nothing here is
//! mutated after start-up.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub collector: CollectorConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// Network identity announced over DHCP, also the collector directory.
    pub hostname: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct CollectorConfig<'a> {
    /// `host` or `host:port` of the file collector.
    pub host: &'a str,
}

impl<'a> Config<'a> {
    pub const fn new(ssid: &'a str, password: &'a str, hostname: &'a str, collector: &'a str) -> Self {
        Self {
            internet: InternetConfig {
                ssid,
                password,
                hostname,
            },
            collector: CollectorConfig { host: collector },
        }
    }
}
