//! Station-mode association
//!
//! The link is brought up lazily, right before an upload finds it down. A
//! battery powered node must not spin against an access point that is gone,
//! so after a bounded number of attempts the connector puts the device into
//! a long low-power stand-down and leaves the restart to the caller.

use log::{info, warn};
use thiserror_no_std::Error;

use crate::config::InternetConfig;
use crate::status::{StatusCode, StatusIndicator};

/// Time one connect request is given to associate.
pub const ATTEMPT_TIMEOUT_MS: u32 = 4000;
/// Attempts before standing down.
pub const MAX_ATTEMPTS: u32 = 16;
/// Length of the stand-down.
pub const STANDDOWN_MS: u64 = 60 * 1000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    #[error("no association after {attempts} attempts")]
    Unavailable { attempts: u32 },
    #[error("Wi-Fi driver error: {details}")]
    Driver { details: &'static str },
}

/// Radio in station mode.
pub trait WifiLink {
    fn is_connected(&self) -> bool;

    /// Set station mode, credentials and the hostname announced over DHCP.
    fn configure(
        &mut self,
        ssid: &str,
        password: &str,
        hostname: &str,
    ) -> impl Future<Output = Result<(), NetworkError>>;

    /// Issue a connect request without waiting for its outcome.
    fn begin(&mut self) -> impl Future<Output = Result<(), NetworkError>>;

    /// Wait up to `timeout_ms` for the link to come up (association and address).
    fn wait_connected(&mut self, timeout_ms: u32) -> impl Future<Output = bool>;
}

/// Low-power states of the device.
pub trait PowerControl {
    /// Power down for `duration_ms`.
    ///
    /// On hardware this does not return: the chip restarts from reset when the
    /// wake-up timer fires and all volatile state is lost.
    fn deep_sleep(&mut self, duration_ms: u64) -> impl Future<Output = ()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    pub attempt_timeout_ms: u32,
    /// `None` keeps trying forever. One attempt is always made.
    pub max_attempts: Option<u32>,
    pub standdown_ms: u64,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: ATTEMPT_TIMEOUT_MS,
            max_attempts: Some(MAX_ATTEMPTS),
            standdown_ms: STANDDOWN_MS,
        }
    }
}

impl ConnectPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }
}

pub struct Connector<'a, L> {
    link: L,
    internet: InternetConfig<'a>,
    policy: ConnectPolicy,
}

impl<'a, L> Connector<'a, L>
where
    L: WifiLink,
{
    pub fn new(link: L, internet: InternetConfig<'a>, policy: ConnectPolicy) -> Self {
        Self {
            link,
            internet,
            policy,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Make sure the link is up, blocking until it is or the policy gives up.
    ///
    /// Returns immediately when already connected. On exhaustion the device
    /// stands down through `power` before [`NetworkError::Unavailable`] is
    /// returned; the caller starts over from the top.
    pub async fn ensure_connected<P, S>(
        &mut self,
        power: &mut P,
        status: &mut S,
    ) -> Result<(), NetworkError>
    where
        P: PowerControl,
        S: StatusIndicator,
    {
        if self.link.is_connected() {
            return Ok(());
        }

        info!("Waiting for Wi-Fi \"{}\" ...", self.internet.ssid);
        self.link
            .configure(
                self.internet.ssid,
                self.internet.password,
                self.internet.hostname,
            )
            .await?;

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            status.signal(StatusCode::WifiWaiting).await;

            if let Err(e) = self.link.begin().await {
                warn!("Wi-Fi connect request failed: {}", e);
            }

            if self.link.wait_connected(self.policy.attempt_timeout_ms).await {
                info!("Wi-Fi connected after {} attempt(s)", attempt);
                return Ok(());
            }

            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                warn!(
                    "Wi-Fi unavailable after {} attempts, standing down for {} ms",
                    attempt, self.policy.standdown_ms
                );
                power.deep_sleep(self.policy.standdown_ms).await;
                return Err(NetworkError::Unavailable { attempts: attempt });
            }
        }
    }
}
