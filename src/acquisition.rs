use crate::config::StreamerConfig;
use crate::error::StreamError;
use crate::session::{Connector, Session};
use crate::state::StateCell;
use crate::store::{LatestSlot, Recording};
use crate::transform;
use crate::types::{Phase, TransformedFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on the reachability check done before the first session.
const PROBE_BUDGET: Duration = Duration::from_secs(1);

/// Control messages from the facade to the acquisition thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Reconnect,
    Stop,
}

/// State shared between the acquisition thread and consumers.
#[derive(Debug)]
pub(crate) struct Shared {
    pub slot: LatestSlot,
    pub recording: Recording,
    pub state: StateCell,
}

impl Shared {
    pub fn new(record: bool) -> Self {
        Shared {
            slot: LatestSlot::new(),
            recording: Recording::new(record),
            state: StateCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.snapshot().phase == Phase::Streaming && !self.slot.is_empty()
    }
}

/// What the loop does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    /// A reconnect was requested; state has already been reset.
    Restart,
    Stop,
}

/// The acquisition loop. Runs on its own thread, owns the connector and any
/// open session, and is the only writer of [`Shared`].
pub(crate) struct Worker {
    connector: Box<dyn Connector>,
    config: StreamerConfig,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
}

impl Worker {
    pub fn new(
        connector: Box<dyn Connector>,
        config: StreamerConfig,
        shared: Arc<Shared>,
        commands: Receiver<Command>,
    ) -> Self {
        Worker {
            connector,
            config,
            shared,
            commands,
        }
    }

    /// Run until stopped. Hands the connector back so the facade can restart.
    pub fn run(mut self) -> Box<dyn Connector> {
        log::info!("Acquisition loop started for {}", self.config.endpoint);

        if self.config.probe_on_start
            && !self
                .config
                .endpoint
                .probe(self.config.session.connect_timeout.min(PROBE_BUDGET))
        {
            log::warn!(
                "{} is not accepting connections; is the tracking app running on the same network?",
                self.config.endpoint
            );
        }

        loop {
            let step = match self.shared.state.snapshot().phase {
                Phase::GivenUp => self.wait_for_command(),
                _ => self.connect_and_stream(),
            };
            if step == Step::Stop {
                break;
            }
        }

        self.shared.slot.clear();
        self.shared.state.update(|s| s.stopped());
        log::info!("Acquisition loop stopped");
        self.connector
    }

    /// Drain pending commands without blocking.
    fn poll_commands(&self) -> Step {
        match self.commands.try_recv() {
            Ok(cmd) => self.handle(cmd),
            Err(TryRecvError::Empty) => Step::Continue,
            Err(TryRecvError::Disconnected) => Step::Stop,
        }
    }

    fn handle(&self, cmd: Command) -> Step {
        match cmd {
            Command::Stop => {
                log::info!("Acquisition loop stopping (stop requested)");
                Step::Stop
            }
            Command::Reconnect => {
                log::info!("Reconnect requested, resetting failure count");
                self.shared.slot.clear();
                self.shared.state.update(|s| s.begin_connecting());
                Step::Restart
            }
        }
    }

    /// Parked in `GivenUp`: only a command gets us out.
    fn wait_for_command(&self) -> Step {
        match self.commands.recv() {
            Ok(cmd) => self.handle(cmd),
            Err(_) => Step::Stop,
        }
    }

    /// Interruptible backoff sleep.
    fn sleep(&self, delay: Duration) -> Step {
        match self.commands.recv_timeout(delay) {
            Ok(cmd) => self.handle(cmd),
            Err(RecvTimeoutError::Timeout) => Step::Continue,
            Err(RecvTimeoutError::Disconnected) => Step::Stop,
        }
    }

    fn connect_and_stream(&mut self) -> Step {
        let step = self.poll_commands();
        if step != Step::Continue {
            return step;
        }

        log::info!("Connecting to {}...", self.config.endpoint);
        let mut session = match self
            .connector
            .connect(&self.config.endpoint, &self.config.session)
        {
            Ok(session) => session,
            Err(e) => return self.fail(e),
        };

        if let Err(e) = session.start_stream() {
            session.close();
            return self.fail(e);
        }

        self.shared.state.update(|s| s.stream_opened());
        log::info!("Streaming from {}", self.config.endpoint);

        let result = self.stream(session.as_mut());
        session.close();
        log::debug!("Session to {} closed", self.config.endpoint);

        match result {
            Ok(step) => step,
            Err(e) => self.fail(e),
        }
    }

    /// Receive, transform and publish until the session fails or a command
    /// interrupts it.
    fn stream(&self, session: &mut dyn Session) -> crate::Result<Step> {
        let mut last_update = Instant::now();

        loop {
            let step = self.poll_commands();
            if step != Step::Continue {
                return Ok(step);
            }

            match session.recv_timeout(self.config.poll_interval)? {
                Some(update) => {
                    last_update = Instant::now();
                    let frame = transform::process(&update)?;
                    self.publish(frame, last_update);
                }
                None => {
                    if let Some(idle) = self.config.idle_timeout {
                        if last_update.elapsed() >= idle {
                            return Err(StreamError::IdleTimeout(idle));
                        }
                    }
                }
            }
        }
    }

    fn publish(&self, frame: TransformedFrame, at: Instant) {
        let frame = Arc::new(frame);
        self.shared.recording.append(frame.clone());
        self.shared.slot.publish(frame);
        self.shared.state.update(|s| s.frame_published(at));
        log::trace!("Published frame");
    }

    /// Count a failure, clear the slot and either back off or give up.
    fn fail(&self, err: StreamError) -> Step {
        if err.is_transport() {
            log::warn!("Connection to {} failed: {}", self.config.endpoint, err);
        } else {
            log::warn!("Dropping session to {} after bad update: {}", self.config.endpoint, err);
        }

        self.shared.slot.clear();
        let backoff = self.config.backoff;
        let state = self.shared.state.update(|s| {
            s.record_failure(&backoff);
        });

        if state.phase == Phase::GivenUp {
            log::warn!(
                "Giving up on {} after {} consecutive failures; call reconnect() to retry",
                self.config.endpoint,
                state.consecutive_failures
            );
            return Step::Continue;
        }

        let delay = backoff.delay(state.consecutive_failures);
        log::info!(
            "Reconnecting to {} in {:?} (consecutive failures: {})",
            self.config.endpoint,
            delay,
            state.consecutive_failures
        );
        self.sleep(delay)
    }
}
