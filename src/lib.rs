//! # xreal-one-driver - IMU streaming for XREAL One glasses
//!
//! The glasses publish gyroscope and accelerometer readings over a link-local
//! TCP connection. This crate connects, frames and validates the binary
//! stream, converts it to physical units and hands samples out one at a time:
//! - Endpoint parsing and bounded connect/reconnect over TCP or UDP
//! - CRC-checked framing with resynchronization on corrupt input
//! - Samples in rad/s, m/s² and device-clock microseconds
//! - C FFI for integration with C/C++/Unity
//!
//! ## Quick Start
//! ```no_run
//! use xreal_one_driver::Session;
//!
//! let mut session = Session::open().unwrap();
//! for _ in 0..100 {
//!     let sample = session.next().unwrap();
//!     println!("gyro: {:?} accel: {:?}", sample.gyro, sample.accel);
//! }
//! session.close();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod protocol;
pub mod decoder;
pub mod normalize;
pub mod transport;
pub mod session;
pub mod ffi;

pub use config::{DriverConfig, ReconnectPolicy};
pub use error::{FailureCode, XrealError};
pub use session::{Session, SessionStats};
pub use transport::{NetTransport, Received, Transport};
pub use types::*;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, XrealError>;
