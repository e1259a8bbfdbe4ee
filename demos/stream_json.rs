//! Stream IMU samples as JSON lines.
//!
//! {"gx":0.0012,"gy":-0.0031,"gz":0.0004,"ax":0.021,"ay":9.806,"az":0.118,"t":1596314}
//!
//! Usage: cargo run --release --example stream_json [-- <host:port>]

use std::io::{self, Write};
use xreal_one_driver::{DriverConfig, Endpoint, Session, XrealError};

fn main() {
    env_logger::init();

    let endpoint = std::env::args()
        .nth(1)
        .map(|a| a.parse::<Endpoint>())
        .unwrap_or_else(|| Ok(Endpoint::default()));
    let endpoint = match endpoint {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let mut session = match Session::open_with(endpoint, DriverConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Streaming JSON (Ctrl+C to stop)...");

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut idle_timeouts: u32 = 0;

    loop {
        match session.next() {
            Ok(s) => {
                idle_timeouts = 0;
                let _ = writeln!(
                    out,
                    "{{\"gx\":{:.4},\"gy\":{:.4},\"gz\":{:.4},\"ax\":{:.3},\"ay\":{:.3},\"az\":{:.3},\"t\":{}}}",
                    s.gyro[0], s.gyro[1], s.gyro[2], s.accel[0], s.accel[1], s.accel[2], s.timestamp,
                );
                let _ = out.flush();
            }
            Err(XrealError::Timeout(after)) => {
                idle_timeouts += 1;
                eprintln!("No IMU frame for {:?} (timeout #{})", after, idle_timeouts);
                if idle_timeouts >= 15 {
                    eprintln!("Stopping after {} silent periods", idle_timeouts);
                    break;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
