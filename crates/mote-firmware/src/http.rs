//! HTTP POST over an embassy-net TCP socket

use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::Duration;
use log::{debug, warn};
use mote_core::http::{PostRequest, parse_status_line};
use mote_core::upload::{HttpTransport, UploadError};

const RX_BUFFER: usize = 1024;
const TX_BUFFER: usize = 1024;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// One connection per request; the collector closes after answering.
pub struct TcpTransport {
    stack: Stack<'static>,
    rx: [u8; RX_BUFFER],
    tx: [u8; TX_BUFFER],
}

impl TcpTransport {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            rx: [0; RX_BUFFER],
            tx: [0; TX_BUFFER],
        }
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, UploadError> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(address));
    }

    let addresses = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|e| {
            warn!("DNS lookup of {} failed: {:?}", host, e);
            UploadError::Dns
        })?;
    addresses.first().copied().ok_or(UploadError::Dns)
}

impl HttpTransport for TcpTransport {
    async fn post(&mut self, request: &PostRequest<'_>) -> Result<u16, UploadError> {
        let stack = self.stack;
        let address = resolve(stack, request.authority.host).await?;

        let mut socket = TcpSocket::new(stack, &mut self.rx, &mut self.tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        socket
            .connect((address, request.authority.port))
            .await
            .map_err(|e| {
                warn!("Connect to {}:{} failed: {:?}", address, request.authority.port, e);
                UploadError::Connect
            })?;

        let bytes = request.to_bytes();
        let mut sent = 0;
        while sent < bytes.len() {
            match socket.write(&bytes[sent..]).await {
                Ok(0) | Err(_) => {
                    socket.abort();
                    return Err(UploadError::Io { details: "request write" });
                }
                Ok(n) => sent += n,
            }
        }
        socket
            .flush()
            .await
            .map_err(|_| UploadError::Io { details: "request flush" })?;

        // only the status line matters
        let mut response = [0u8; 64];
        let mut received = 0;
        while received < response.len() && !response[..received].windows(2).any(|w| w == b"\r\n") {
            match socket.read(&mut response[received..]).await {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(_) => {
                    socket.abort();
                    return Err(UploadError::Io { details: "response read" });
                }
            }
        }
        socket.close();

        debug!("Collector answered {} bytes", received);
        parse_status_line(&response[..received])
    }
}
