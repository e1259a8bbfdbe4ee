//! Synthetic glasses: serves IMU frames over TCP for running the driver
//! without hardware.
//!
//! Usage:
//!   cargo run --example mock_glasses [-- <bind addr> [rate Hz]]
//!   cargo run --example stream -- 127.0.0.1:52998
//!
//! Roughly one frame in 200 is sent with a broken checksum and one in 500 is
//! a non-IMU message so the driver's drop counters have something to count.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};
use xreal_one_driver::protocol::{encode_frame, encode_imu_frame, HEADER_LEN};
use xreal_one_driver::SensorSample;

fn main() {
    env_logger::init();

    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:52998".to_string());
    let rate_hz: u32 = std::env::args()
        .nth(2)
        .and_then(|r| r.parse().ok())
        .filter(|&r| r > 0)
        .unwrap_or(1000);

    let listener = TcpListener::bind(&bind).unwrap_or_else(|e| {
        eprintln!("Failed to bind {}: {}", bind, e);
        std::process::exit(1);
    });
    eprintln!("Mock glasses on {} at {} Hz", bind, rate_hz);

    for stream in listener.incoming() {
        match stream {
            Ok(s) => {
                let peer = s.peer_addr().map(|a| a.to_string()).unwrap_or_default();
                eprintln!("Client connected: {}", peer);
                std::thread::spawn(move || {
                    if let Err(e) = serve(s, rate_hz) {
                        eprintln!("Client {} gone: {}", peer, e);
                    }
                });
            }
            Err(e) => eprintln!("accept error: {}", e),
        }
    }
}

fn serve(mut stream: TcpStream, rate_hz: u32) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let period = Duration::from_secs(1) / rate_hz;
    let epoch = Instant::now();
    let mut next_tick = epoch;
    let mut seq: u16 = 0;

    loop {
        let t = epoch.elapsed();
        let phase = t.as_secs_f32() * std::f32::consts::TAU * 0.25;
        let sample = SensorSample {
            gyro: [0.3 * phase.sin(), 0.1 * phase.cos(), 0.02],
            accel: [0.4 * phase.cos(), 9.81, 0.3 * phase.sin()],
            timestamp: t.as_micros() as u64,
        };

        let mut frame = encode_imu_frame(seq, &sample);
        if seq % 200 == 199 {
            frame[HEADER_LEN + 3] ^= 0xFF;
        }
        stream.write_all(&frame)?;
        if seq % 500 == 499 {
            stream.write_all(&encode_frame(seq, b"battery:87"))?;
        }

        seq = seq.wrapping_add(1);
        next_tick += period;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }
}
