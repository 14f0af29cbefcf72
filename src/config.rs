use crate::error::StreamError;
use crate::session::{Endpoint, DEFAULT_PORT};
use crate::Result;
use std::time::Duration;

/// Exponential reconnect backoff with a hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Consecutive failures tolerated before giving up. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_retries: Some(10),
        }
    }
}

impl BackoffPolicy {
    /// Wait before the next attempt after `failures` consecutive failures:
    /// `min(base * 2^failures, cap)`.
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// True once `failures` exceeds the retry ceiling.
    pub fn exhausted(&self, failures: u32) -> bool {
        matches!(self.max_retries, Some(max) if failures > max)
    }
}

/// Options handed to the connector when opening a session.
///
/// Only `connect_timeout` is interpreted by the acquisition loop; the rest is
/// negotiated by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(5),
            max_message_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Configuration for a [`Streamer`](crate::Streamer).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    pub endpoint: Endpoint,
    pub session: SessionOptions,
    pub backoff: BackoffPolicy,
    /// Append every frame to the recording buffer.
    pub record: bool,
    /// Upper bound on how long the loop blocks in a receive before checking
    /// for commands. Bounds `stop()` latency while streaming.
    pub poll_interval: Duration,
    /// Treat a session with no updates for this long as failed. Off by
    /// default: a quiet but healthy session keeps streaming.
    pub idle_timeout: Option<Duration>,
    /// Log a warning when a plain TCP connect to the endpoint fails before the
    /// first session attempt.
    pub probe_on_start: bool,
}

impl StreamerConfig {
    /// Defaults for a device at `host` on the standard port.
    pub fn new(host: impl Into<String>) -> Self {
        StreamerConfig {
            endpoint: Endpoint::new(host, DEFAULT_PORT),
            session: SessionOptions::default(),
            backoff: BackoffPolicy::default(),
            record: true,
            poll_interval: Duration::from_millis(100),
            idle_timeout: None,
            probe_on_start: false,
        }
    }

    /// Check invariants the acquisition loop relies on.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(StreamError::InvalidConfig(msg.to_string()));

        if self.endpoint.host.trim().is_empty() {
            return fail("endpoint host is empty");
        }
        if self.endpoint.port == 0 {
            return fail("endpoint port is 0");
        }
        if self.session.connect_timeout.is_zero() {
            return fail("connect_timeout must be positive");
        }
        if self.session.max_message_bytes == 0 {
            return fail("max_message_bytes must be positive");
        }
        if self.backoff.base.is_zero() {
            return fail("backoff base must be positive");
        }
        if self.backoff.cap < self.backoff.base {
            return fail("backoff cap is smaller than base");
        }
        if self.poll_interval.is_zero() {
            return fail("poll_interval must be positive");
        }
        if matches!(self.idle_timeout, Some(t) if t.is_zero()) {
            return fail("idle_timeout must be positive when set");
        }
        Ok(())
    }

    /// Apply `AVP_STREAM_*` environment overrides. Unparseable values are
    /// ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = read_env_parsed::<u16>("AVP_STREAM_PORT") {
            self.endpoint.port = port;
        }
        if let Some(ms) = read_env_parsed::<u64>("AVP_STREAM_BACKOFF_BASE_MS") {
            self.backoff.base = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env_parsed::<u64>("AVP_STREAM_BACKOFF_CAP_MS") {
            self.backoff.cap = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env_parsed::<u64>("AVP_STREAM_CONNECT_TIMEOUT_MS") {
            self.session.connect_timeout = Duration::from_millis(ms);
        }
        match read_env_string("AVP_STREAM_MAX_RETRIES").as_deref() {
            None => {}
            Some("none") | Some("unlimited") => self.backoff.max_retries = None,
            Some(v) => match v.parse::<u32>() {
                Ok(n) => self.backoff.max_retries = Some(n),
                Err(_) => log::warn!("Ignoring AVP_STREAM_MAX_RETRIES='{}'", v),
            },
        }
        self.record = read_env_bool("AVP_STREAM_RECORD", self.record);
        self
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = read_env_string(name)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}='{}'", name, raw);
            None
        }
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    read_env_string(name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                log::warn!("Ignoring {}='{}'", name, v);
                None
            }
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_is_capped() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_retries: None,
        };
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(40), policy.cap);
        assert_eq!(policy.delay(u32::MAX), policy.cap);
    }

    #[test]
    fn test_exhausted() {
        let policy = BackoffPolicy {
            max_retries: Some(3),
            ..BackoffPolicy::default()
        };
        assert!(!policy.exhausted(3));
        assert!(policy.exhausted(4));

        let forever = BackoffPolicy {
            max_retries: None,
            ..BackoffPolicy::default()
        };
        assert!(!forever.exhausted(u32::MAX));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamerConfig::new("10.0.0.2");
        assert_eq!(config.endpoint.port, DEFAULT_PORT);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StreamerConfig::new("10.0.0.2");
        config.session.connect_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(StreamError::InvalidConfig(_))));

        let mut config = StreamerConfig::new("  ");
        config.validate().unwrap_err();

        config = StreamerConfig::new("10.0.0.2");
        config.backoff.cap = Duration::from_millis(10);
        config.validate().unwrap_err();

        config = StreamerConfig::new("10.0.0.2");
        config.idle_timeout = Some(Duration::ZERO);
        config.validate().unwrap_err();

        config = StreamerConfig::new("10.0.0.2");
        config.poll_interval = Duration::ZERO;
        config.validate().unwrap_err();
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("AVP_STREAM_BACKOFF_BASE_MS", "250");
        std::env::set_var("AVP_STREAM_MAX_RETRIES", "none");
        std::env::set_var("AVP_STREAM_RECORD", "off");
        std::env::set_var("AVP_STREAM_PORT", "not-a-port");

        let config = StreamerConfig::new("10.0.0.2").with_env_overrides();

        std::env::remove_var("AVP_STREAM_BACKOFF_BASE_MS");
        std::env::remove_var("AVP_STREAM_MAX_RETRIES");
        std::env::remove_var("AVP_STREAM_RECORD");
        std::env::remove_var("AVP_STREAM_PORT");

        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.backoff.max_retries, None);
        assert!(!config.record);
        assert_eq!(config.endpoint.port, DEFAULT_PORT);
    }
}
