//! gRPC transport for the tracking app's `HandTrackingService`.
//!
//! The app serves one server-streaming call on port 12345:
//!
//! ```text
//! service HandTrackingService {
//!   rpc StreamHandUpdates(HandUpdate) returns (stream HandUpdate);
//! }
//! ```
//!
//! [`GrpcConnector`] owns a small tokio runtime and drives the async tonic
//! client from the acquisition thread with `block_on`, so the rest of the
//! crate stays synchronous.

use crate::config::SessionOptions;
use crate::error::StreamError;
use crate::session::{Connector, Endpoint, Session};
use crate::transform::mat4_from_row_major;
use crate::types::{Mat4, RawHand, RawUpdate, Side};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

const STREAM_PATH: &str = "/handtracking.HandTrackingService/StreamHandUpdates";

/// Message types of the `handtracking` protobuf package.
///
/// Field numbers follow declaration order in the app's schema.
pub mod proto {
    /// 4x4 pose, `mRC` is row R, column C.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Matrix4x4 {
        #[prost(float, tag = "1")]
        pub m00: f32,
        #[prost(float, tag = "2")]
        pub m01: f32,
        #[prost(float, tag = "3")]
        pub m02: f32,
        #[prost(float, tag = "4")]
        pub m03: f32,
        #[prost(float, tag = "5")]
        pub m10: f32,
        #[prost(float, tag = "6")]
        pub m11: f32,
        #[prost(float, tag = "7")]
        pub m12: f32,
        #[prost(float, tag = "8")]
        pub m13: f32,
        #[prost(float, tag = "9")]
        pub m20: f32,
        #[prost(float, tag = "10")]
        pub m21: f32,
        #[prost(float, tag = "11")]
        pub m22: f32,
        #[prost(float, tag = "12")]
        pub m23: f32,
        #[prost(float, tag = "13")]
        pub m30: f32,
        #[prost(float, tag = "14")]
        pub m31: f32,
        #[prost(float, tag = "15")]
        pub m32: f32,
        #[prost(float, tag = "16")]
        pub m33: f32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Skeleton {
        #[prost(message, repeated, tag = "1")]
        pub joint_matrices: Vec<Matrix4x4>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Hand {
        #[prost(message, optional, tag = "1")]
        pub wrist_matrix: Option<Matrix4x4>,
        #[prost(message, optional, tag = "2")]
        pub skeleton: Option<Skeleton>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct HandUpdate {
        #[prost(message, optional, tag = "1")]
        pub left_hand: Option<Hand>,
        #[prost(message, optional, tag = "2")]
        pub right_hand: Option<Hand>,
        #[prost(message, optional, tag = "3")]
        pub head: Option<Matrix4x4>,
    }
}

fn mat4(m: &proto::Matrix4x4) -> Mat4 {
    mat4_from_row_major(&[
        m.m00, m.m01, m.m02, m.m03, //
        m.m10, m.m11, m.m12, m.m13, //
        m.m20, m.m21, m.m22, m.m23, //
        m.m30, m.m31, m.m32, m.m33,
    ])
}

fn raw_hand(hand: Option<&proto::Hand>, side: Side) -> Result<RawHand> {
    let hand = hand.ok_or_else(|| StreamError::malformed(Some(side), "hand", "missing"))?;
    let wrist = hand
        .wrist_matrix
        .as_ref()
        .ok_or_else(|| StreamError::malformed(Some(side), "wrist", "missing"))?;
    // An absent skeleton decodes as empty and is rejected by the pinch check.
    let joints = hand
        .skeleton
        .as_ref()
        .map(|s| s.joint_matrices.iter().map(mat4).collect())
        .unwrap_or_default();

    Ok(RawHand {
        wrist: mat4(wrist),
        joints,
    })
}

/// Convert one wire message into a [`RawUpdate`].
pub fn raw_update_from_message(msg: &proto::HandUpdate) -> Result<RawUpdate> {
    let head = msg
        .head
        .as_ref()
        .ok_or_else(|| StreamError::malformed(None, "head", "missing"))?;

    Ok(RawUpdate {
        left: raw_hand(msg.left_hand.as_ref(), Side::Left)?,
        right: raw_hand(msg.right_hand.as_ref(), Side::Right)?,
        head: mat4(head),
    })
}

/// Flatten an error and its sources into one line.
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn status_error(status: tonic::Status) -> StreamError {
    StreamError::Transport(format!("{:?}: {}", status.code(), status.message()))
}

/// [`Connector`] speaking gRPC over plaintext HTTP/2.
#[derive(Clone)]
pub struct GrpcConnector {
    runtime: Arc<Runtime>,
}

impl GrpcConnector {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("avp-grpc")
            .enable_all()
            .build()
            .map_err(|e| StreamError::Runtime(e.to_string()))?;
        Ok(GrpcConnector {
            runtime: Arc::new(runtime),
        })
    }
}

fn channel_uri(endpoint: &Endpoint) -> String {
    if endpoint.host.contains(':') && !endpoint.host.starts_with('[') {
        format!("http://[{}]:{}", endpoint.host, endpoint.port)
    } else {
        format!("http://{}", endpoint)
    }
}

impl Connector for GrpcConnector {
    fn connect(&mut self, endpoint: &Endpoint, options: &SessionOptions) -> Result<Box<dyn Session>> {
        let builder = tonic::transport::Endpoint::from_shared(channel_uri(endpoint))
            .map_err(|e| StreamError::InvalidConfig(format!("bad endpoint {}: {}", endpoint, e)))?
            .connect_timeout(options.connect_timeout)
            .http2_keep_alive_interval(options.keepalive_interval)
            .keep_alive_timeout(options.keepalive_timeout)
            .keep_alive_while_idle(true);

        let timeout = options.connect_timeout;
        let connected = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, builder.connect()).await });

        let channel = match connected {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                return Err(StreamError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: describe(&e),
                })
            }
            Err(_) => {
                return Err(StreamError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                })
            }
        };
        log::debug!("gRPC channel to {} is up", endpoint);

        let client = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(options.max_message_bytes)
            .max_encoding_message_size(options.max_message_bytes);

        Ok(Box::new(GrpcSession {
            runtime: self.runtime.clone(),
            client,
            stream: None,
            request_timeout: timeout,
        }))
    }
}

struct GrpcSession {
    runtime: Arc<Runtime>,
    client: tonic::client::Grpc<Channel>,
    stream: Option<tonic::Streaming<proto::HandUpdate>>,
    request_timeout: Duration,
}

impl Session for GrpcSession {
    fn start_stream(&mut self) -> Result<()> {
        let client = &mut self.client;
        let timeout = self.request_timeout;
        let response = self.runtime.block_on(async {
            let call = async {
                client
                    .ready()
                    .await
                    .map_err(|e| StreamError::Transport(format!("service not ready: {}", describe(&e))))?;
                client
                    .server_streaming(
                        tonic::Request::new(proto::HandUpdate::default()),
                        PathAndQuery::from_static(STREAM_PATH),
                        ProstCodec::<proto::HandUpdate, proto::HandUpdate>::default(),
                    )
                    .await
                    .map_err(status_error)
            };
            tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| StreamError::Transport(format!("no stream response within {:?}", timeout)))?
        })?;

        self.stream = Some(response.into_inner());
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<RawUpdate>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| StreamError::Transport("stream not started".into()))?;

        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, stream.message()).await });

        match received {
            Err(_) => Ok(None),
            Ok(Ok(Some(msg))) => raw_update_from_message(&msg).map(Some),
            Ok(Ok(None)) => Err(StreamError::StreamEnded),
            Ok(Err(status)) => Err(status_error(status)),
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
