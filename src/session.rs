//! Boundary to the transport that carries updates from the device.
//!
//! The wire protocol lives outside this crate. A transport plugs in by
//! implementing [`Connector`] (open a session) and [`Session`] (receive the
//! next update). The acquisition loop owns both exclusively.

use crate::config::SessionOptions;
use crate::types::RawUpdate;
use crate::Result;
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Port the tracking app listens on.
pub const DEFAULT_PORT: u16 = 12345;

/// Network address of the tracking source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Plain TCP reachability check. Returns true if any resolved address
    /// accepts a connection. `timeout` bounds the whole check, not each
    /// address.
    pub fn probe(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("Could not resolve {}: {}", self, e);
                return false;
            }
        };

        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::debug!("Reachability check of {} ran out of time", self);
                break;
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(_) => return true,
                Err(e) => log::debug!("Probe of {} failed: {}", addr, e),
            }
        }
        false
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens sessions to a tracking source.
///
/// `connect` must return within `options.connect_timeout`, failing with
/// [`StreamError::ConnectTimeout`](crate::StreamError::ConnectTimeout) when
/// the session cannot be established in time.
pub trait Connector: Send + 'static {
    fn connect(&mut self, endpoint: &Endpoint, options: &SessionOptions) -> Result<Box<dyn Session>>;
}

/// An open session to the tracking source.
pub trait Session: Send {
    /// Issue the streaming request. Called once, right after `connect`.
    fn start_stream(&mut self) -> Result<()> {
        Ok(())
    }

    /// Wait up to `timeout` for the next update.
    ///
    /// `Ok(None)` means nothing arrived yet and the session is still healthy.
    /// End of stream is reported as [`StreamError::StreamEnded`](crate::StreamError::StreamEnded).
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<RawUpdate>>;

    /// Release the session. Called exactly once before the session is dropped.
    fn close(&mut self) {}
}
