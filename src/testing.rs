//! Scripted transport for exercising the acquisition loop.

use crate::config::SessionOptions;
use crate::error::StreamError;
use crate::session::{Connector, Endpoint, Session};
use crate::types::{HandJoint, Mat4, RawHand, RawUpdate, IDENTITY};
use crate::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What the next `connect` call does. Once the script runs out every
/// attempt is refused.
pub(crate) enum Attempt {
    /// Open a session that plays these events, then stays idle.
    Open(Vec<Event>),
    /// Block for the given time, then fail with `ConnectTimeout`.
    Timeout(Duration),
}

pub(crate) enum Event {
    Update(RawUpdate),
    /// Report no data for this long.
    Pause(Duration),
    Error(StreamError),
    End,
}

#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    attempts: Arc<Mutex<VecDeque<Attempt>>>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        ScriptedConnector {
            attempts: Arc::new(Mutex::new(attempts.into())),
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, attempt: Attempt) {
        self.attempts.lock().unwrap().push_back(attempt);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&mut self, endpoint: &Endpoint, _options: &SessionOptions) -> Result<Box<dyn Session>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Open(events)) => Ok(Box::new(ScriptedSession {
                events: events.into(),
                paused_until: None,
                closes: self.closes.clone(),
            })),
            Some(Attempt::Timeout(timeout)) => {
                std::thread::sleep(timeout);
                Err(StreamError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                })
            }
            None => Err(StreamError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

struct ScriptedSession {
    events: VecDeque<Event>,
    paused_until: Option<Instant>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedSession {
    fn idle(&mut self, timeout: Duration) -> Result<Option<RawUpdate>> {
        let wait = match self.paused_until {
            Some(until) => until.saturating_duration_since(Instant::now()).min(timeout),
            None => timeout,
        };
        std::thread::sleep(wait);
        Ok(None)
    }
}

impl Session for ScriptedSession {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<RawUpdate>> {
        if let Some(until) = self.paused_until {
            if Instant::now() < until {
                return self.idle(timeout);
            }
            self.paused_until = None;
        }

        match self.events.pop_front() {
            Some(Event::Update(update)) => Ok(Some(update)),
            Some(Event::Pause(d)) => {
                self.paused_until = Some(Instant::now() + d);
                self.idle(timeout)
            }
            Some(Event::Error(e)) => Err(e),
            Some(Event::End) => Err(StreamError::StreamEnded),
            None => self.idle(timeout),
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn at_x(x: f64) -> Mat4 {
    let mut m = IDENTITY;
    m[0][3] = x;
    m
}

/// A well-formed update whose left wrist sits at `x = tag`.
pub(crate) fn raw_update(tag: f64) -> RawUpdate {
    let joints: Vec<Mat4> = (0..HandJoint::COUNT).map(|i| at_x(0.01 * i as f64)).collect();
    RawUpdate {
        left: RawHand {
            wrist: at_x(tag),
            joints: joints.clone(),
        },
        right: RawHand {
            wrist: IDENTITY,
            joints,
        },
        head: IDENTITY,
    }
}

/// An update whose right skeleton is too short for pinch distance.
pub(crate) fn malformed_update() -> RawUpdate {
    let mut update = raw_update(-1.0);
    update.right.joints.truncate(2);
    update
}
