//! Minimal HTTP bridge: serves the latest frame as JSON.
//!
//! The server never touches the stream directly; it only polls the
//! streamer's latest value and connection state.
//!
//!   GET /latest  -> most recent frame, or 503 while not connected
//!   GET /status  -> connection state
//!
//! Usage:
//!   cargo run --example server [-- <vision-pro-ip>]
//!   curl http://localhost:8080/latest
//!
//! Without a host the bridge serves a looping synthetic capture.

#[path = "capture.rs"]
mod capture;

use avp_stream::{
    transform, Connector, GrpcConnector, ReplayConnector, Side, Streamer, StreamerConfig, TransformedFrame,
};
use tiny_http::{Header, Response, Server};

const PORT: u16 = 8080;

fn main() {
    env_logger::init();

    match std::env::args().nth(1) {
        Some(host) => {
            let connector = GrpcConnector::new().unwrap_or_else(|e| {
                eprintln!("{}", e);
                std::process::exit(1);
            });
            serve(StreamerConfig::new(host), connector);
        }
        None => {
            let connector = ReplayConnector::new(capture::synthetic_capture(180)).looping(true);
            serve(StreamerConfig::new("replay"), connector);
        }
    }
}

fn serve<C: Connector>(config: StreamerConfig, connector: C) {
    let mut config = config.with_env_overrides();
    // The bridge only serves the latest value.
    config.record = false;

    let streamer = match Streamer::new(config, connector) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = streamer.start() {
        eprintln!("Failed to start streamer: {}", e);
        std::process::exit(1);
    }

    let server = Server::http(("0.0.0.0", PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", PORT, e);
        std::process::exit(1);
    });
    eprintln!("[HTTP] Listening on http://localhost:{}", PORT);

    let json = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header is valid");

    for request in server.incoming_requests() {
        let (status, body) = match request.url() {
            "/latest" => match streamer.latest() {
                Some(frame) => (200, frame_json(&frame)),
                None => (503, format!("{{\"error\":\"not connected\",\"phase\":\"{}\"}}", streamer.phase())),
            },
            "/status" => {
                let state = streamer.state();
                let age_ms = state
                    .last_success
                    .map(|t| t.elapsed().as_millis().to_string())
                    .unwrap_or_else(|| "null".into());
                (
                    200,
                    format!(
                        "{{\"phase\":\"{}\",\"connected\":{},\"failures\":{},\"last_frame_age_ms\":{}}}",
                        state.phase,
                        streamer.is_connected(),
                        state.consecutive_failures,
                        age_ms,
                    ),
                )
            }
            _ => (404, "{\"error\":\"not found\"}".to_string()),
        };

        let response = Response::from_string(body)
            .with_status_code(status)
            .with_header(json.clone());
        if let Err(e) = request.respond(response) {
            eprintln!("[HTTP] respond error: {}", e);
        }
    }

    streamer.stop();
}

fn frame_json(frame: &TransformedFrame) -> String {
    let head = transform::translation(&frame.head);
    let mut out = format!("{{\"head\":[{:.4},{:.4},{:.4}]", head[0], head[1], head[2]);
    for side in [Side::Left, Side::Right] {
        let hand = frame.hand(side);
        let w = transform::translation(&hand.wrist);
        out.push_str(&format!(
            ",\"{side}_wrist\":[{:.4},{:.4},{:.4}],\"{side}_pinch\":{:.4},\"{side}_roll\":{:.4}",
            w[0],
            w[1],
            w[2],
            hand.pinch_distance,
            hand.wrist_roll,
            side = side,
        ));
    }
    out.push('}');
    out
}
