//! Stream transformed frames to stdout.
//!
//! Connects to the tracking app over gRPC when given a host, otherwise
//! replays a synthetic capture through the same acquisition stack. Prints
//! the latest frame a few times per second.
//!
//! Usage: cargo run --example stream [-- <vision-pro-ip>]
//! Press Ctrl+C to stop.

#[path = "capture.rs"]
mod capture;

use avp_stream::{transform, Connector, GrpcConnector, ReplayConnector, Streamer, StreamerConfig};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    match std::env::args().nth(1) {
        Some(host) => {
            let connector = GrpcConnector::new().unwrap_or_else(|e| {
                eprintln!("{}", e);
                std::process::exit(1);
            });
            let mut config = StreamerConfig::new(host).with_env_overrides();
            config.probe_on_start = true;
            run(config, connector);
        }
        None => {
            let connector = ReplayConnector::new(capture::synthetic_capture(180)).looping(true);
            run(StreamerConfig::new("replay").with_env_overrides(), connector);
        }
    }
}

fn run<C: Connector>(config: StreamerConfig, connector: C) {
    let streamer = match Streamer::new(config, connector) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match streamer.start_and_wait(Duration::from_secs(30)) {
        Ok(true) => println!("Streaming (Ctrl+C to stop)..."),
        Ok(false) => {
            eprintln!("No frame within 30s (state: {:?})", streamer.state());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    }

    let start = Instant::now();
    let mut last_report = Instant::now();

    loop {
        std::thread::sleep(Duration::from_millis(250));

        match streamer.latest() {
            Some(frame) => {
                let head = transform::translation(&frame.head);
                println!(
                    "head=[{:+.3}, {:+.3}, {:+.3}]  pinch L={:.3} R={:.3}  roll L={:+.2} R={:+.2}",
                    head[0],
                    head[1],
                    head[2],
                    frame.left.pinch_distance,
                    frame.right.pinch_distance,
                    frame.left.wrist_roll,
                    frame.right.wrist_roll,
                );
            }
            None => println!("-- no frame ({}) --", streamer.phase()),
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            let elapsed = start.elapsed().as_secs_f64();
            let count = streamer.recording_len();
            println!("--- {} frames in {:.1}s ({:.1} Hz) ---", count, elapsed, count as f64 / elapsed);
            last_report = now;
        }
    }
}
