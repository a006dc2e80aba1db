//! Station-mode Wi-Fi over esp-radio with an embassy-net stack

use embassy_executor::Spawner;
use embassy_net::{ConfigV4, DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer, with_timeout};
use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};
use log::{info, warn};
use mote_core::network::{NetworkError, WifiLink};
use static_cell::StaticCell;
use thiserror_no_std::Error;

/// Sockets: DHCP, DNS and the upload connection.
const SOCKETS: usize = 3;
const POLL_INTERVAL_MS: u64 = 100;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static RESOURCES: StaticCell<StackResources<SOCKETS>> = StaticCell::new();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("radio controller failed to initialize")]
    Radio,
    #[error("Wi-Fi driver failed to initialize")]
    Wifi,
}

/// Bring up the radio driver and the network stack, and spawn the stack's runner.
///
/// The radio stays idle until [`WifiLink::configure`] is called.
pub fn start_network(spawner: &Spawner, wifi: WIFI<'static>) -> Result<EspWifiLink, StartError> {
    let radio = RADIO.init(esp_radio::init().map_err(|e| {
        warn!("Radio init failed: {:?}", e);
        StartError::Radio
    })?);
    let (controller, interfaces) =
        esp_radio::wifi::new(radio, wifi, Default::default()).map_err(|e| {
            warn!("Wi-Fi init failed: {:?}", e);
            StartError::Wifi
        })?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(DhcpConfig::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    if spawner.spawn(net_task(runner)).is_err() {
        warn!("Network task already running");
    }

    Ok(EspWifiLink { controller, stack })
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// A link counts as connected once associated and holding an IPv4 lease.
pub struct EspWifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl EspWifiLink {
    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }

    fn announce_hostname(&self, hostname: &str) {
        let mut dhcp = DhcpConfig::default();
        match hostname.try_into() {
            Ok(name) => dhcp.hostname = Some(name),
            Err(_) => warn!("Hostname \"{}\" too long for DHCP, not announced", hostname),
        }
        self.stack.set_config_v4(ConfigV4::Dhcp(dhcp));
    }
}

impl WifiLink for EspWifiLink {
    fn is_connected(&self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.is_config_up()
    }

    async fn configure(
        &mut self,
        ssid: &str,
        password: &str,
        hostname: &str,
    ) -> Result<(), NetworkError> {
        self.announce_hostname(hostname);

        let client = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(ssid.into())
                .with_password(password.into()),
        );
        self.controller.set_config(&client).map_err(|e| {
            warn!("Wi-Fi set_config error: {:?}", e);
            NetworkError::Driver {
                details: "set_config rejected the client configuration",
            }
        })?;

        if !matches!(self.controller.is_started(), Ok(true)) {
            info!("Starting Wi-Fi STA");
            self.controller.start_async().await.map_err(|e| {
                warn!("Wi-Fi start_async error: {:?}", e);
                NetworkError::Driver {
                    details: "radio did not start",
                }
            })?;
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), NetworkError> {
        self.controller.connect().map_err(|e| {
            warn!("Wi-Fi connect error: {:?}", e);
            NetworkError::Driver {
                details: "connect request rejected",
            }
        })
    }

    async fn wait_connected(&mut self, timeout_ms: u32) -> bool {
        let waited = with_timeout(Duration::from_millis(timeout_ms as u64), async {
            while !self.is_connected() {
                Timer::after_millis(POLL_INTERVAL_MS).await;
            }
        })
        .await;

        if waited.is_ok()
            && let Some(config) = self.stack.config_v4()
        {
            info!("Wi-Fi link up: ip={}", config.address);
        }
        waited.is_ok()
    }
}
