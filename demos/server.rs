//! IMU WebSocket server: glasses IMU -> JSON -> every connected browser.
//!
//! Usage:
//!   cargo run --release --example server [-- <host:port>]
//!   Connect a WebSocket client to ws://localhost:8080

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;
use xreal_one_driver::{DriverConfig, Endpoint, Session, XrealError};

const PORT: u16 = 8080;

type WsClient = Arc<Mutex<tungstenite::WebSocket<TcpStream>>>;
type Clients = Arc<Mutex<Vec<WsClient>>>;

fn main() {
    env_logger::init();

    let endpoint = match std::env::args().nth(1).map(|a| a.parse::<Endpoint>()) {
        Some(Ok(ep)) => ep,
        Some(Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
        None => Endpoint::default(),
    };

    let clients: Clients = Arc::new(Mutex::new(Vec::new()));

    let imu_clients = clients.clone();
    let imu_running = Arc::new(AtomicBool::new(true));
    let imu_stop = imu_running.clone();

    let imu_thread = std::thread::Builder::new()
        .name("xreal-imu".into())
        .spawn(move || {
            imu_loop(endpoint, imu_clients, imu_stop);
        })
        .expect("Failed to spawn IMU thread");

    let listener = TcpListener::bind(format!("0.0.0.0:{}", PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", PORT, e);
        std::process::exit(1);
    });
    eprintln!("[WS] Listening on ws://localhost:{}", PORT);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[TCP] accept error: {}", e);
                continue;
            }
        };

        let clients = clients.clone();
        std::thread::spawn(move || {
            handle_websocket(stream, clients);
        });
    }

    imu_running.store(false, Ordering::Relaxed);
    let _ = imu_thread.join();
}

/// Add the client to the broadcast list and wait until a failed send drops it.
fn handle_websocket(stream: TcpStream, clients: Clients) {
    // Keeps the IMU thread from blocking on a slow client.
    stream.set_write_timeout(Some(Duration::from_secs(2))).ok();
    stream.set_nodelay(true).ok();

    let ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("[WS] handshake error: {}", e);
            return;
        }
    };

    let ws = Arc::new(Mutex::new(ws));
    {
        let mut list = clients.lock().unwrap();
        list.push(ws.clone());
        eprintln!("[WS] Client connected ({} total)", list.len());
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
        let still_active = clients.lock().unwrap().iter().any(|c| Arc::ptr_eq(c, &ws));
        if !still_active {
            break;
        }
    }

    eprintln!(
        "[WS] Client disconnected ({} total)",
        clients.lock().unwrap().len()
    );
}

/// Pull samples from the glasses and broadcast them, reopening the session
/// whenever it ends.
fn imu_loop(endpoint: Endpoint, clients: Clients, running: Arc<AtomicBool>) {
    let broadcast_interval = Duration::from_millis(16); // ~60 Hz to browser

    while running.load(Ordering::Relaxed) {
        eprintln!("[IMU] Connecting to {}...", endpoint);
        let mut session = match Session::open_with(endpoint.clone(), DriverConfig::from_env()) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[IMU] {}; retrying in 2s", e);
                std::thread::sleep(Duration::from_secs(2));
                continue;
            }
        };

        let mut count: u64 = 0;
        let mut ws_sent: u64 = 0;
        let mut last_report = Instant::now();
        let mut last_broadcast = Instant::now();

        while running.load(Ordering::Relaxed) {
            let s = match session.next() {
                Ok(s) => s,
                Err(XrealError::Timeout(_)) => continue,
                Err(e) => {
                    eprintln!("[IMU] Error: {}", e);
                    break;
                }
            };

            count += 1;
            let now = Instant::now();

            if now.duration_since(last_broadcast) >= broadcast_interval {
                last_broadcast = now;
                let json = format!(
                    "{{\"gyro\":[{:.5},{:.5},{:.5}],\"accel\":[{:.4},{:.4},{:.4}],\"t\":{}}}",
                    s.gyro[0], s.gyro[1], s.gyro[2], s.accel[0], s.accel[1], s.accel[2], s.timestamp,
                );

                let msg = Message::Text(json);
                let mut list = clients.lock().unwrap();
                list.retain(|ws_arc| {
                    let mut ws = ws_arc.lock().unwrap();
                    ws.send(msg.clone()).is_ok()
                });
                drop(list);
                ws_sent += 1;
            }

            if now.duration_since(last_report) >= Duration::from_secs(5) {
                let clients_count = clients.lock().unwrap().len();
                let elapsed = last_report.elapsed().as_secs_f64();
                eprintln!(
                    "[IMU] {} samples/s, {} ws/s, {} client(s)",
                    (count as f64 / elapsed) as u32,
                    (ws_sent as f64 / elapsed) as u32,
                    clients_count
                );
                count = 0;
                ws_sent = 0;
                last_report = now;
            }
        }

        session.close();
    }
}
