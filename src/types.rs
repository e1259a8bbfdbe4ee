use crate::XrealError;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// Link-local address the glasses serve their IMU stream on.
pub const DEFAULT_HOST: &str = "169.254.2.1";
pub const DEFAULT_PORT: u16 = 52998;

/// One normalized IMU reading.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    /// Angular velocity [x, y, z] in rad/s.
    pub gyro: [f32; 3],
    /// Linear acceleration [x, y, z] in m/s².
    pub accel: [f32; 3],
    /// Device clock in microseconds.
    pub timestamp: u64,
}

/// Socket flavour used to reach the glasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

/// Network address of the glasses' streaming service.
///
/// Accepts `host:port`, `[v6]:port`, optionally prefixed with `tcp://` or
/// `udp://`. Parsing never touches the network; names are resolved when the
/// transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub kind: TransportKind,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, kind: TransportKind) -> Self {
        Self {
            host: host.into(),
            port,
            kind,
        }
    }

    /// Resolve the endpoint to socket addresses.
    pub fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, TransportKind::Tcp)
    }
}

impl FromStr for Endpoint {
    type Err = XrealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || XrealError::InvalidAddress(s.to_string());
        let trimmed = s.trim();

        let (kind, rest) = if let Some(rest) = trimmed.strip_prefix("tcp://") {
            (TransportKind::Tcp, rest)
        } else if let Some(rest) = trimmed.strip_prefix("udp://") {
            (TransportKind::Udp, rest)
        } else {
            (TransportKind::Tcp, trimmed)
        };

        if let Ok(addr) = rest.parse::<SocketAddr>() {
            if addr.port() == 0 {
                return Err(invalid());
            }
            return Ok(Self::new(addr.ip().to_string(), addr.port(), kind));
        }

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        let host_ok = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
        if port == 0 || !host_ok {
            return Err(invalid());
        }
        Ok(Self::new(host, port, kind))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TransportKind::Udp {
            write!(f, "udp://")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Lifecycle of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Lifecycle of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Opening,
    Streaming,
    Reconnecting,
    /// Terminal: reconnect attempts exhausted.
    Failed,
    Closed,
}

bitflags::bitflags! {
    /// Plausibility checks applied to decoded sensor values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SampleChecks: u32 {
        /// Reject NaN and infinite values.
        const FINITE     = 1 << 0;
        /// Reject any gyro axis beyond 1000 rad/s.
        const GYRO_RANGE  = 1 << 1;
        /// Reject any accel axis beyond 100 m/s².
        const ACCEL_RANGE = 1 << 2;
        /// Reject frames whose gyro and accel are both all-zero.
        const NON_ZERO   = 1 << 3;
        /// Reject accel magnitudes outside 5..15 m/s².
        const GRAVITY    = 1 << 4;
    }
}

impl Default for SampleChecks {
    fn default() -> Self {
        Self::FINITE | Self::GYRO_RANGE | Self::ACCEL_RANGE | Self::NON_ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_address() {
        let ep: Endpoint = "169.254.2.1:52998".parse().unwrap();
        assert_eq!(ep, Endpoint::default());
        assert_eq!(ep.to_string(), "169.254.2.1:52998");
    }

    #[test]
    fn test_parse_scheme_and_hostname() {
        let ep: Endpoint = "udp://glasses.local:6000".parse().unwrap();
        assert_eq!(ep.kind, TransportKind::Udp);
        assert_eq!(ep.host, "glasses.local");
        assert_eq!(ep.port, 6000);
        assert_eq!(ep.to_string(), "udp://glasses.local:6000");

        let v6: Endpoint = "[::1]:52998".parse().unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.to_string(), "[::1]:52998");
    }

    #[test]
    fn test_malformed_addresses() {
        for bad in [
            "",
            "169.254.2.1",
            "169.254.2.1:",
            ":52998",
            "169.254.2.1:99999",
            "169.254.2.1:0",
            "169.254.2.1:port",
            "not a host:80",
            "http://169.254.2.1:52998",
        ] {
            assert!(
                matches!(bad.parse::<Endpoint>(), Err(XrealError::InvalidAddress(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_default_checks_exclude_gravity() {
        let checks = SampleChecks::default();
        assert!(checks.contains(SampleChecks::FINITE));
        assert!(!checks.contains(SampleChecks::GRAVITY));
    }
}
