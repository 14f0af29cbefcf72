use crate::config::SessionOptions;
use crate::error::StreamError;
use crate::session::{Connector, Endpoint, Session};
use crate::types::RawUpdate;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-process [`Connector`] that plays back a captured sequence of updates.
///
/// Every session starts from the first update and delivers one update per
/// `interval`. Without looping, the session ends after the last update,
/// which the streamer handles like any other stream end.
#[derive(Debug, Clone)]
pub struct ReplayConnector {
    updates: Arc<[RawUpdate]>,
    interval: Duration,
    looping: bool,
}

impl ReplayConnector {
    /// Replay `updates` at 90 Hz, once per session.
    pub fn new(updates: Vec<RawUpdate>) -> Self {
        ReplayConnector {
            updates: updates.into(),
            interval: Duration::from_micros(11_111),
            looping: false,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Restart from the first update instead of ending the session.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl Connector for ReplayConnector {
    fn connect(&mut self, endpoint: &Endpoint, _options: &SessionOptions) -> Result<Box<dyn Session>> {
        if self.updates.is_empty() {
            return Err(StreamError::Connect {
                endpoint: endpoint.to_string(),
                reason: "replay capture is empty".into(),
            });
        }
        log::debug!("Replaying {} updates as {}", self.updates.len(), endpoint);
        Ok(Box::new(ReplaySession {
            updates: self.updates.clone(),
            interval: self.interval,
            looping: self.looping,
            next: 0,
            due: Instant::now(),
        }))
    }
}

struct ReplaySession {
    updates: Arc<[RawUpdate]>,
    interval: Duration,
    looping: bool,
    next: usize,
    due: Instant,
}

impl Session for ReplaySession {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<RawUpdate>> {
        if self.next >= self.updates.len() {
            if !self.looping {
                return Err(StreamError::StreamEnded);
            }
            self.next = 0;
        }

        let wait = self.due.saturating_duration_since(Instant::now());
        if wait > timeout {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        std::thread::sleep(wait);

        let update = self.updates[self.next].clone();
        self.next += 1;
        self.due += self.interval;
        Ok(Some(update))
    }
}
