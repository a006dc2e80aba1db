//! Telemetry upload to the file collector
//!
//! The collector appends request bodies to `/files/{device}/{file}`; the
//! query flags choose between append and overwrite and whether the server
//! prefixes each line with its own timestamp.

extern crate alloc;

use alloc::string::String;
use log::debug;
use thiserror_no_std::Error;

use crate::config::Config;
use crate::http::{Authority, PostRequest};
use crate::record::TelemetryRecord;

pub const CONTENT_TYPE: &str = "text/plain";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    #[error("invalid collector address: {details}")]
    InvalidCollector { details: &'static str },
    #[error("could not resolve collector host")]
    Dns,
    #[error("could not connect to collector")]
    Connect,
    #[error("I/O error during {details}")]
    Io { details: &'static str },
    #[error("collector answered with status {0}")]
    Status(u16),
    #[error("malformed HTTP response")]
    MalformedResponse,
}

/// Where records of one station go. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTarget<'a> {
    /// `host` or `host:port` of the collector.
    pub collector: &'a str,
    /// Device directory on the collector.
    pub hostname: &'a str,
    pub filename: &'a str,
    /// Append to the file instead of replacing it.
    pub append: bool,
    /// Let the collector prefix the line with its receive timestamp.
    pub tsprefix: bool,
}

impl<'a> UploadTarget<'a> {
    pub fn from_config(config: &Config<'a>, filename: &'a str, append: bool, tsprefix: bool) -> Self {
        Self {
            collector: config.collector.host,
            hostname: config.internet.hostname,
            filename,
            append,
            tsprefix,
        }
    }

    /// Path and query of the upload request.
    pub fn path(&self) -> String {
        let mut path = String::with_capacity(48 + self.hostname.len() + self.filename.len());
        path.push_str("/files/");
        push_segment(&mut path, self.hostname);
        path.push('/');
        push_segment(&mut path, self.filename);
        path.push_str(if self.append {
            "?append=true"
        } else {
            "?append=false"
        });
        path.push_str(if self.tsprefix {
            "&tsprefix=true"
        } else {
            "&tsprefix=false"
        });
        path
    }

    pub fn url(&self) -> String {
        let path = self.path();
        let mut url = String::with_capacity(7 + self.collector.len() + path.len());
        url.push_str("http://");
        url.push_str(self.collector);
        url.push_str(&path);
        url
    }
}

/// Percent-encode everything outside the unreserved set so a name can never
/// spill into the next path segment or the query.
fn push_segment(out: &mut String, segment: &str) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }
}

/// Something that can deliver one POST and report the status code.
pub trait HttpTransport {
    fn post(&mut self, request: &PostRequest<'_>) -> impl Future<Output = Result<u16, UploadError>>;
}

/// Send one record. A non-2xx answer is an error.
///
/// There is no retry: a failed upload is simply lost.
pub async fn upload<T>(
    transport: &mut T,
    record: &TelemetryRecord,
    target: &UploadTarget<'_>,
) -> Result<u16, UploadError>
where
    T: HttpTransport,
{
    let authority = Authority::parse(target.collector)?;
    let path = target.path();
    let body = record.serialize();

    debug!("POST {} <- {}", target.url(), body);

    let request = PostRequest {
        authority,
        target: &path,
        content_type: CONTENT_TYPE,
        body: body.as_bytes(),
    };

    let status = transport.post(&request).await?;
    if (200..300).contains(&status) {
        Ok(status)
    } else {
        Err(UploadError::Status(status))
    }
}
