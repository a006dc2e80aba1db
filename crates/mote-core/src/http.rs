//! Minimal HTTP/1.1 client framing
//!
//! The firmware talks to the collector over a raw TCP socket, so the request
//! head is written here and only the status line of the answer is looked at.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::upload::UploadError;

pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Host and port of a server, split from `host` or `host:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authority<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl<'a> Authority<'a> {
    pub fn parse(authority: &'a str) -> Result<Self, UploadError> {
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| UploadError::InvalidCollector {
                    details: "port is not a number",
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_HTTP_PORT),
        };

        if host.is_empty() {
            return Err(UploadError::InvalidCollector {
                details: "empty host",
            });
        }
        if port == 0 {
            return Err(UploadError::InvalidCollector {
                details: "port 0",
            });
        }

        Ok(Self { host, port })
    }
}

/// A POST request with a complete in-memory body.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub authority: Authority<'a>,
    /// Path including the query string.
    pub target: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

impl PostRequest<'_> {
    /// Request line and headers, terminated by the empty line.
    pub fn head(&self) -> String {
        let mut head = String::with_capacity(128 + self.target.len());
        // Writing into a String cannot fail.
        let _ = write!(head, "POST {} HTTP/1.1\r\n", self.target);
        let _ = if self.authority.port == DEFAULT_HTTP_PORT {
            write!(head, "Host: {}\r\n", self.authority.host)
        } else {
            write!(
                head,
                "Host: {}:{}\r\n",
                self.authority.host, self.authority.port
            )
        };
        let _ = write!(head, "Content-Type: {}\r\n", self.content_type);
        let _ = write!(head, "Content-Length: {}\r\n", self.body.len());
        head.push_str("Connection: close\r\n\r\n");
        head
    }

    /// Full request as it goes on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = self.head();
        let mut bytes = Vec::with_capacity(head.len() + self.body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(self.body);
        bytes
    }
}

/// Extract the status code from the start of a response.
///
/// Only the first line has to be present in `response`.
pub fn parse_status_line(response: &[u8]) -> Result<u16, UploadError> {
    let line_end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(response.len());
    let line = core::str::from_utf8(&response[..line_end])
        .map_err(|_| UploadError::MalformedResponse)?;

    let mut parts = line.split(' ');
    let version = parts.next().ok_or(UploadError::MalformedResponse)?;
    if !version.starts_with("HTTP/") {
        return Err(UploadError::MalformedResponse);
    }

    let code = parts.next().ok_or(UploadError::MalformedResponse)?;
    if code.len() != 3 {
        return Err(UploadError::MalformedResponse);
    }
    code.parse::<u16>()
        .map_err(|_| UploadError::MalformedResponse)
}
