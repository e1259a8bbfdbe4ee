use crate::config::{DriverConfig, ReconnectPolicy};
use crate::decoder::FramingMode;
use crate::types::{ConnectionState, Endpoint, TransportKind};
use crate::{Result, XrealError};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

/// Outcome of one bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many bytes were written to the front of the buffer.
    Data(usize),
    /// Nothing arrived within the poll interval.
    Idle,
}

/// A byte source the session can pull from.
///
/// Implementations must bound every call: `receive` returns `Idle` instead
/// of blocking past its poll interval, and `connect` gives up after its own
/// timeout.
pub trait Transport {
    /// Establish the connection. Fails with `Connect` when the device cannot
    /// be reached in time.
    fn connect(&mut self) -> Result<()>;

    /// Read whatever is available into `buf`. A dead connection is reported
    /// as `ConnectionLost`.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Received>;

    /// Release the connection. Safe to call repeatedly.
    fn close(&mut self);

    fn state(&self) -> ConnectionState;

    /// How reads map onto frames.
    fn framing(&self) -> FramingMode;

    /// Replace a lost connection, backing off between a bounded number of
    /// attempts.
    fn reconnect(&mut self, policy: &ReconnectPolicy) -> Result<()> {
        self.close();
        for attempt in 1..=policy.max_attempts {
            std::thread::sleep(policy.backoff(attempt));
            match self.connect() {
                Ok(()) => {
                    log::info!("Reconnected (attempt {}/{})", attempt, policy.max_attempts);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Reconnect attempt {}/{} failed: {}",
                        attempt,
                        policy.max_attempts,
                        e
                    );
                }
            }
        }
        Err(XrealError::ReconnectExhausted {
            attempts: policy.max_attempts,
        })
    }
}

enum Socket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// TCP or UDP connection to the glasses.
pub struct NetTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    poll_interval: Duration,
    socket: Option<Socket>,
    state: ConnectionState,
}

impl NetTransport {
    pub fn new(endpoint: Endpoint, config: &DriverConfig) -> Self {
        // std rejects zero timeouts.
        let floor = Duration::from_millis(1);
        Self {
            endpoint,
            connect_timeout: config.connect_timeout.max(floor),
            poll_interval: config.poll_interval.max(floor),
            socket: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn open_socket(&self) -> io::Result<Socket> {
        let addrs = self.endpoint.resolve()?;
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");

        for addr in addrs {
            let attempt = match self.endpoint.kind {
                TransportKind::Tcp => self.open_tcp(addr).map(Socket::Tcp),
                TransportKind::Udp => self.open_udp(addr).map(Socket::Udp),
            };
            match attempt {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn open_tcp(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.poll_interval))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn open_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        let local: SocketAddr = if addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(self.poll_interval))?;
        Ok(socket)
    }

    fn lost(&mut self, reason: impl Into<String>) -> XrealError {
        self.state = ConnectionState::Failed;
        self.socket = None;
        XrealError::ConnectionLost(reason.into())
    }
}

impl Transport for NetTransport {
    fn connect(&mut self) -> Result<()> {
        self.close();
        self.state = ConnectionState::Connecting;

        match self.open_socket() {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = ConnectionState::Connected;
                log::info!("Connected to {}", self.endpoint);
                Ok(())
            }
            Err(source) => {
                self.state = ConnectionState::Failed;
                Err(XrealError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                })
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Received> {
        let (result, is_stream) = match self.socket.as_mut() {
            Some(Socket::Tcp(stream)) => (stream.read(buf), true),
            Some(Socket::Udp(socket)) => (socket.recv(buf), false),
            None => return Err(XrealError::ConnectionLost("not connected".into())),
        };

        match result {
            Ok(0) if is_stream => Err(self.lost("connection closed by device")),
            Ok(0) => Ok(Received::Idle),
            Ok(n) => {
                log::trace!("Received {} bytes", n);
                Ok(Received::Data(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Received::Idle)
            }
            Err(e) => Err(self.lost(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Socket::Tcp(stream) = &socket {
                let _ = stream.shutdown(Shutdown::Both);
            }
            log::debug!("Closed connection to {}", self.endpoint);
        }
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn framing(&self) -> FramingMode {
        match self.endpoint.kind {
            TransportKind::Tcp => FramingMode::Stream,
            TransportKind::Udp => FramingMode::Datagram,
        }
    }
}

impl Drop for NetTransport {
    fn drop(&mut self) {
        self.close();
    }
}
