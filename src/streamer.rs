use crate::acquisition::{Command, Shared, Worker};
use crate::config::StreamerConfig;
use crate::session::Connector;
use crate::types::{ConnectionState, Phase, TransformedFrame};
use crate::{Result, StreamError};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// A running acquisition thread.
struct Running {
    commands: Sender<Command>,
    thread: JoinHandle<Box<dyn Connector>>,
}

enum Lifecycle {
    Idle(Box<dyn Connector>),
    Running(Running),
    /// The acquisition thread could not be started or panicked; the connector is gone.
    Lost,
}

/// Streaming client for a hand and head tracking source.
///
/// A background thread keeps a session open to the configured endpoint,
/// transforms every update and publishes it. All accessors are cheap and
/// callable from any thread; no error from the background thread ever
/// reaches them. Connection problems show up as [`Streamer::is_connected`]
/// turning false and in [`Streamer::state`].
///
/// Losing the connection clears [`Streamer::latest`]; a stale frame is never
/// served.
pub struct Streamer {
    config: StreamerConfig,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Streamer {
    /// Create a streamer. Validates `config`; nothing is started yet.
    pub fn new<C: Connector>(config: StreamerConfig, connector: C) -> Result<Streamer> {
        config.validate()?;
        Ok(Streamer {
            shared: Arc::new(Shared::new(config.record)),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle(Box::new(connector))),
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the acquisition thread if it is not running. Returns immediately.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        let connector = match std::mem::replace(&mut *lifecycle, Lifecycle::Lost) {
            Lifecycle::Idle(connector) => connector,
            Lifecycle::Running(running) => {
                *lifecycle = Lifecycle::Running(running);
                return Ok(());
            }
            Lifecycle::Lost => {
                return Err(StreamError::Spawn(
                    "connector was lost with a previous acquisition thread".into(),
                ))
            }
        };

        let (commands, receiver) = crossbeam_channel::unbounded();
        self.shared.state.update(|s| s.begin_connecting());
        let worker = Worker::new(connector, self.config.clone(), self.shared.clone(), receiver);

        let thread = std::thread::Builder::new()
            .name("avp-acquisition".into())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.shared.state.update(|s| s.stopped());
                StreamError::Spawn(e.to_string())
            })?;

        *lifecycle = Lifecycle::Running(Running { commands, thread });
        Ok(())
    }

    /// Start, then block up to `timeout` for the first frame.
    ///
    /// Returns whether the stream is connected when the call returns.
    pub fn start_and_wait(&self, timeout: Duration) -> Result<bool> {
        self.start()?;
        Ok(self.wait_for_connection(timeout))
    }

    /// Most recent frame, or `None` while not streaming.
    pub fn latest(&self) -> Option<Arc<TransformedFrame>> {
        self.shared.slot.read()
    }

    /// True while a session is streaming and at least one frame has arrived
    /// on it.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Block until connected or `timeout` elapses.
    pub fn wait_for_connection(&self, timeout: Duration) -> bool {
        let slot = &self.shared.slot;
        self.shared
            .state
            .wait_until(timeout, |s| s.phase == Phase::Streaming && !slot.is_empty())
    }

    /// Frames recorded so far, oldest first.
    pub fn get_recording(&self) -> Vec<Arc<TransformedFrame>> {
        self.shared.recording.snapshot()
    }

    pub fn recording_len(&self) -> usize {
        self.shared.recording.len()
    }

    pub fn clear_recording(&self) {
        self.shared.recording.clear();
    }

    /// Enable or disable appending new frames to the recording.
    pub fn set_recording(&self, enabled: bool) {
        self.shared.recording.set_enabled(enabled);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running(_))
    }

    /// Force a fresh connection attempt with the failure count reset. Also
    /// the only way out of [`Phase::GivenUp`]. No-op when not started.
    pub fn reconnect(&self) {
        match &*self.lifecycle() {
            Lifecycle::Running(running) => {
                if running.commands.send(Command::Reconnect).is_err() {
                    log::warn!("Reconnect ignored: acquisition thread has exited");
                }
            }
            _ => log::debug!("Reconnect ignored: streamer not started"),
        }
    }

    /// Stop the acquisition thread and close its session. Idempotent.
    ///
    /// Returns once the thread has exited: within `poll_interval` while
    /// streaming or backing off, within the connect timeout while connecting,
    /// and within one second during the startup reachability check.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        let running = match std::mem::replace(&mut *lifecycle, Lifecycle::Lost) {
            Lifecycle::Running(running) => running,
            other => {
                *lifecycle = other;
                return;
            }
        };

        let _ = running.commands.send(Command::Stop);
        match running.thread.join() {
            Ok(connector) => *lifecycle = Lifecycle::Idle(connector),
            Err(_) => {
                log::error!("Acquisition thread panicked");
                self.shared.slot.clear();
                self.shared.state.update(|s| s.stopped());
            }
        }
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}
