use crate::config::DriverConfig;
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::normalize::Normalizer;
use crate::transport::{NetTransport, Received, Transport};
use crate::types::{Endpoint, SensorSample, SessionState};
use crate::{Result, XrealError};
use std::time::Instant;

const RECV_CHUNK: usize = 4096;

/// Counters for one session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub decoder: DecoderStats,
    /// Samples handed to the caller.
    pub samples: u64,
    /// Valid frames that did not yield a sample (other message types,
    /// implausible values).
    pub malformed_frames: u64,
    /// Breaks in the device's frame sequence numbers.
    pub sequence_gaps: u64,
    pub reconnects: u64,
}

/// An open IMU stream from the glasses.
///
/// `next()` does all I/O on the calling thread and never blocks longer than
/// the configured sample timeout plus one bounded reconnect cycle, however
/// often the connection drops within the call. A session
/// is meant to be driven by one thread; wrap it in a mutex to share it.
///
/// Dropping the session closes it.
pub struct Session<T: Transport = NetTransport> {
    transport: T,
    decoder: FrameDecoder,
    normalizer: Normalizer,
    config: DriverConfig,
    state: SessionState,
    recv_buf: Vec<u8>,
    stats: SessionStats,
    last_sequence: Option<u16>,
}

impl Session<NetTransport> {
    /// Connect to the glasses at their well-known link-local address.
    pub fn open() -> Result<Self> {
        Self::open_with(Endpoint::default(), DriverConfig::default())
    }

    /// Connect to `address` (`host:port`, optionally `udp://` prefixed).
    ///
    /// Malformed addresses fail before any socket is created.
    pub fn open_addr(address: &str) -> Result<Self> {
        let endpoint: Endpoint = address.parse()?;
        Self::open_with(endpoint, DriverConfig::default())
    }

    pub fn open_with(endpoint: Endpoint, config: DriverConfig) -> Result<Self> {
        let transport = NetTransport::new(endpoint, &config);
        Self::with_transport(transport, config)
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }
}

impl<T: Transport> Session<T> {
    /// Open a session over an arbitrary transport.
    pub fn with_transport(transport: T, config: DriverConfig) -> Result<Self> {
        let decoder = FrameDecoder::new(transport.framing(), config.max_buffer);
        let mut session = Session {
            transport,
            decoder,
            normalizer: Normalizer::new(config.checks),
            config,
            state: SessionState::Created,
            recv_buf: vec![0u8; RECV_CHUNK],
            stats: SessionStats::default(),
            last_sequence: None,
        };

        session.state = SessionState::Opening;
        session.transport.connect()?;
        session.state = SessionState::Streaming;
        Ok(session)
    }

    /// Pull the next IMU sample.
    ///
    /// Corrupt frames, foreign messages and single connection drops are
    /// handled internally. Errors returned here are terminal for the call:
    /// `Timeout` when the device stayed silent for the sample timeout (the
    /// session stays usable), `ReconnectExhausted` when the connection could
    /// not be restored, `StreamEnded`/`SessionClosed` on a dead session.
    pub fn next(&mut self) -> Result<SensorSample> {
        match self.state {
            SessionState::Streaming | SessionState::Reconnecting => {}
            SessionState::Closed => return Err(XrealError::SessionClosed),
            SessionState::Failed | SessionState::Created | SessionState::Opening => {
                return Err(XrealError::StreamEnded)
            }
        }

        let deadline = Instant::now() + self.config.sample_timeout;
        loop {
            while let Some(frame) = self.decoder.next_frame() {
                self.track_sequence(frame.header.sequence);
                match self.normalizer.normalize(&frame) {
                    Ok(sample) => {
                        self.stats.samples += 1;
                        return Ok(sample);
                    }
                    Err(e) => {
                        self.stats.malformed_frames += 1;
                        log::debug!("Skipping frame seq={}: {}", frame.header.sequence, e);
                    }
                }
            }

            if Instant::now() >= deadline {
                log::warn!(
                    "No IMU sample within {:?} ({} bytes buffered)",
                    self.config.sample_timeout,
                    self.decoder.buffered()
                );
                return Err(XrealError::Timeout(self.config.sample_timeout));
            }

            match self.transport.receive(&mut self.recv_buf) {
                Ok(Received::Data(n)) => self.decoder.push(&self.recv_buf[..n]),
                Ok(Received::Idle) => {}
                Err(XrealError::ConnectionLost(reason)) => self.recover(&reason)?,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
    }

    /// Release the connection and buffers. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_open = self.is_active();
        self.transport.close();
        self.decoder.clear();
        self.state = SessionState::Closed;
        if was_open {
            log::info!(
                "Session closed after {} samples ({} frames dropped)",
                self.stats.samples,
                self.stats.decoder.checksum_failures + self.stats.malformed_frames
            );
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether `next()` can still produce samples.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::Streaming | SessionState::Reconnecting
        )
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            decoder: self.decoder.stats(),
            ..self.stats
        }
    }

    fn recover(&mut self, reason: &str) -> Result<()> {
        log::warn!("Connection to glasses lost: {}", reason);
        self.state = SessionState::Reconnecting;
        self.decoder.clear();
        self.last_sequence = None;

        match self.transport.reconnect(&self.config.reconnect) {
            Ok(()) => {
                self.stats.reconnects += 1;
                self.state = SessionState::Streaming;
                Ok(())
            }
            Err(e) => {
                log::error!("Giving up on glasses: {}", e);
                self.fail();
                Err(e)
            }
        }
    }

    fn fail(&mut self) {
        self.transport.close();
        self.decoder.clear();
        self.state = SessionState::Failed;
    }

    fn track_sequence(&mut self, sequence: u16) {
        if let Some(last) = self.last_sequence {
            if sequence != last.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
                log::trace!("Sequence jump {} -> {}", last, sequence);
            }
        }
        self.last_sequence = Some(sequence);
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}
