//! Stream IMU samples from the glasses to stdout.
//!
//! Usage: cargo run --example stream [-- <host:port>]
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};
use xreal_one_driver::{DriverConfig, Endpoint, Session, XrealError};

fn main() {
    env_logger::init();

    let endpoint = match std::env::args().nth(1) {
        Some(addr) => match addr.parse::<Endpoint>() {
            Ok(ep) => ep,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        },
        None => Endpoint::default(),
    };

    let mut session = match Session::open_with(endpoint, DriverConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming IMU from {} (Ctrl+C to stop)...", session.endpoint());

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match session.next() {
            Ok(sample) => {
                count += 1;

                // Print every ~100th sample to avoid flooding the terminal
                if count % 100 == 1 {
                    println!(
                        "ts={:<12}  gyro=[{:+.4}, {:+.4}, {:+.4}]  accel=[{:+.3}, {:+.3}, {:+.3}]",
                        sample.timestamp,
                        sample.gyro[0], sample.gyro[1], sample.gyro[2],
                        sample.accel[0], sample.accel[1], sample.accel[2],
                    );
                }

                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = start.elapsed().as_secs_f64();
                    let stats = session.stats();
                    println!(
                        "--- {} samples in {:.1}s ({:.1} Hz), {} dropped, {} reconnects ---",
                        count,
                        elapsed,
                        count as f64 / elapsed,
                        stats.decoder.checksum_failures + stats.malformed_frames,
                        stats.reconnects
                    );
                    last_report = now;
                }
            }
            Err(XrealError::Timeout(after)) => {
                eprintln!("No IMU data for {:?}", after);
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    session.close();
    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} samples in {:.1}s ({:.1} Hz)",
        count,
        elapsed,
        count as f64 / elapsed
    );
}
