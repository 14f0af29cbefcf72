//! # avp-stream - resilient hand and head tracking client
//!
//! Pulls hand skeleton, wrist and head poses from a Vision Pro tracking app
//! over an unreliable network link and hands the latest result to any
//! number of consumer threads. Provides:
//! - A background acquisition thread with capped exponential reconnect backoff
//! - Conversion of every update into a Z-up frame with pinch distance and wrist roll
//! - A lock-light latest-value slot and an optional in-memory recording
//!
//! [`GrpcConnector`] talks to the tracking app directly. The transport is
//! pluggable: [`ReplayConnector`] plays back a capture, and any other source
//! can implement [`Connector`] and [`Session`].
//!
//! ## Quick Start
//! ```no_run
//! use avp_stream::{GrpcConnector, Streamer, StreamerConfig};
//! use std::time::Duration;
//!
//! let streamer = Streamer::new(StreamerConfig::new("10.29.230.57"), GrpcConnector::new().unwrap()).unwrap();
//! if streamer.start_and_wait(Duration::from_secs(30)).unwrap() {
//!     let frame = streamer.latest().unwrap();
//!     println!("right pinch: {:.3} m", frame.right.pinch_distance);
//! }
//! ```

pub mod error;
pub mod types;
pub mod transform;
pub mod config;
pub mod session;
pub mod grpc;
pub mod store;
pub mod replay;
mod state;
mod acquisition;
mod streamer;

#[cfg(test)]
mod testing;

pub use config::{BackoffPolicy, SessionOptions, StreamerConfig};
pub use error::StreamError;
pub use grpc::GrpcConnector;
pub use replay::ReplayConnector;
pub use session::{Connector, Endpoint, Session, DEFAULT_PORT};
pub use streamer::Streamer;
pub use types::*;

/// Result type alias for avp-stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
