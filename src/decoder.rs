//! Byte stream to validated frames.
//!
//! The decoder owns the session's accumulation buffer. Bytes go in through
//! [`FrameDecoder::push`]; complete, checksum-verified frames come out of
//! [`FrameDecoder::next_frame`] until it returns `None`, meaning more bytes are
//! needed. Corrupt frames are counted and skipped, never reported as errors.

use crate::protocol::{self, FrameHeader, RawFrame, HEADER_LEN, MARKER};

/// How reads from the transport relate to frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// Frames may be split across or packed into arbitrary reads (TCP).
    Stream,
    /// Every read is a self-contained candidate (UDP). Leftovers from the
    /// previous datagram are dropped on the next push.
    Datagram,
}

/// Counters describing what the decoder has seen. All monotonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed framing and checksum validation.
    pub frames: u64,
    pub checksum_failures: u64,
    /// Markers followed by an impossible body length.
    pub invalid_headers: u64,
    /// Times undrained bytes outgrew the buffer limit and were cut back to
    /// the newest marker.
    pub resyncs: u64,
    /// Bytes thrown away while hunting for a marker.
    pub bytes_discarded: u64,
}

pub struct FrameDecoder {
    buffer: Vec<u8>,
    mode: FramingMode,
    max_buffer: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(mode: FramingMode, max_buffer: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_buffer.min(64 * 1024)),
            mode,
            max_buffer: max_buffer.max(protocol::HEADER_LEN + protocol::MAX_BODY_LEN),
            stats: DecoderStats::default(),
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes currently held waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes. Used when the connection is replaced.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append bytes received from the transport.
    ///
    /// The limit applies to bytes left behind by earlier pushes, so one large
    /// read is always framed in full before anything is thrown away. Callers
    /// that drain [`next_frame`](Self::next_frame) after every push never hold
    /// more than one partial frame.
    pub fn push(&mut self, data: &[u8]) {
        if self.mode == FramingMode::Datagram && !self.buffer.is_empty() {
            log::trace!("Dropping {} bytes left over from previous datagram", self.buffer.len());
            self.discard(self.buffer.len());
        }

        if self.buffer.len() > self.max_buffer {
            self.resync();
        }

        self.buffer.extend_from_slice(data);
    }

    /// Extract the next valid frame, if one is complete.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            let start = match protocol::find_subsequence(&self.buffer, &MARKER) {
                Some(pos) => pos,
                None => {
                    // Keep a tail that could be the start of a split marker.
                    let keep = (MARKER.len() - 1).min(self.buffer.len());
                    self.discard(self.buffer.len() - keep);
                    return None;
                }
            };
            if start > 0 {
                self.discard(start);
            }

            let header = FrameHeader::parse(&self.buffer)?;

            if !header.is_plausible() {
                self.stats.invalid_headers += 1;
                log::debug!("Skipping marker with body length {}", header.body_len);
                self.discard(MARKER.len());
                continue;
            }

            let frame_len = header.frame_len();
            if self.buffer.len() < frame_len {
                return None;
            }

            let body = &self.buffer[HEADER_LEN..frame_len];
            let actual = protocol::checksum(body);
            if actual != header.checksum {
                self.stats.checksum_failures += 1;
                log::debug!(
                    "Dropping frame seq={}: checksum 0x{:08x} != 0x{:08x}",
                    header.sequence,
                    actual,
                    header.checksum
                );
                // Only skip the marker: a real frame may start inside the rejected span.
                self.discard(MARKER.len());
                continue;
            }

            let frame = RawFrame {
                header,
                body: body.to_vec(),
            };
            self.buffer.drain(..frame_len);
            self.stats.frames += 1;
            return Some(frame);
        }
    }

    /// Cut the buffer back to its newest marker after an overflow.
    fn resync(&mut self) {
        let last_marker = self
            .buffer
            .windows(MARKER.len())
            .rposition(|w| w == MARKER);
        let cut = last_marker.unwrap_or(self.buffer.len());

        log::warn!(
            "Receive buffer exceeded {} bytes without being drained, discarding {} bytes",
            self.max_buffer,
            cut
        );
        self.stats.resyncs += 1;
        self.discard(cut);
    }

    fn discard(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.stats.bytes_discarded += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, encode_imu_frame, IMU_FRAME_LEN};
    use crate::types::SensorSample;

    fn sample(timestamp: u64) -> SensorSample {
        SensorSample {
            gyro: [0.1, -0.2, 0.05],
            accel: [9.8, 0.0, 0.1],
            timestamp,
        }
    }

    fn stream_decoder() -> FrameDecoder {
        FrameDecoder::new(FramingMode::Stream, 16 * 1024)
    }

    #[test]
    fn test_single_frame() {
        let bytes = encode_imu_frame(1, &sample(1000));
        let mut decoder = stream_decoder();
        decoder.push(&bytes);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.header.sequence, 1);
        assert_eq!(frame.body, bytes[HEADER_LEN..].to_vec());
        assert!(frame.is_imu());
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().frames, 1);
    }

    #[test]
    fn test_fragmented_delivery_is_split_invariant() {
        let bytes = encode_imu_frame(3, &sample(42));
        let reference = {
            let mut d = stream_decoder();
            d.push(&bytes);
            d.next_frame().unwrap()
        };

        for chunk in [1, 2, 5, 13, 41, 83, IMU_FRAME_LEN] {
            let mut decoder = stream_decoder();
            let mut frames = Vec::new();
            for piece in bytes.chunks(chunk) {
                decoder.push(piece);
                while let Some(f) = decoder.next_frame() {
                    frames.push(f);
                }
            }
            assert_eq!(frames, vec![reference.clone()], "chunk size {}", chunk);
        }

        for split in 1..bytes.len() {
            let mut decoder = stream_decoder();
            decoder.push(&bytes[..split]);
            assert!(decoder.next_frame().is_none());
            decoder.push(&bytes[split..]);
            assert_eq!(decoder.next_frame().as_ref(), Some(&reference));
        }
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut bytes = Vec::new();
        for seq in 0..4u16 {
            bytes.extend(encode_imu_frame(seq, &sample(seq as u64)));
        }
        let mut decoder = stream_decoder();
        decoder.push(&bytes);
        let seqs: Vec<u16> = std::iter::from_fn(|| decoder.next_frame())
            .map(|f| f.header.sequence)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut bytes = vec![0x11, 0x28, 0x36, 0x00, 0x42];
        bytes.extend(encode_imu_frame(9, &sample(5)));
        let mut decoder = stream_decoder();
        decoder.push(&bytes);
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 9);
        assert_eq!(decoder.stats().bytes_discarded, 5);
    }

    #[test]
    fn test_any_body_mutation_is_rejected_then_recovers() {
        let bad_source = encode_imu_frame(1, &sample(10));
        let good = encode_imu_frame(2, &sample(20));

        for index in HEADER_LEN..bad_source.len() {
            for flip in [0x01u8, 0x80, 0xFF] {
                let mut corrupt = bad_source.clone();
                corrupt[index] ^= flip;

                let mut decoder = stream_decoder();
                decoder.push(&corrupt);
                decoder.push(&good);

                let frame = decoder.next_frame().unwrap();
                assert_eq!(frame.header.sequence, 2, "byte {} flip {:02x}", index, flip);
                assert!(decoder.next_frame().is_none());
                assert_eq!(decoder.stats().checksum_failures, 1);
            }
        }
    }

    #[test]
    fn test_checksum_field_mutation_is_rejected() {
        let good = encode_imu_frame(2, &sample(20));
        for index in 10..HEADER_LEN {
            let mut corrupt = encode_imu_frame(1, &sample(10));
            corrupt[index] ^= 0x5A;
            let mut decoder = stream_decoder();
            decoder.push(&corrupt);
            decoder.push(&good);
            assert_eq!(decoder.next_frame().unwrap().header.sequence, 2);
            assert_eq!(decoder.stats().checksum_failures, 1);
        }
    }

    #[test]
    fn test_implausible_length_is_skipped() {
        let mut bogus = MARKER.to_vec();
        bogus.extend_from_slice(&u16::MAX.to_le_bytes());
        bogus.extend_from_slice(&[0; 6]);
        bogus.extend(encode_imu_frame(4, &sample(1)));

        let mut decoder = stream_decoder();
        decoder.push(&bogus);
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 4);
        assert_eq!(decoder.stats().invalid_headers, 1);
    }

    #[test]
    fn test_resync_bounds_memory() {
        let mut decoder = FrameDecoder::new(FramingMode::Stream, 4096);
        decoder.push(&vec![0x55; 5000]);
        assert_eq!(decoder.stats().resyncs, 0);

        let frame = encode_imu_frame(11, &sample(1));
        decoder.push(&frame);
        assert_eq!(decoder.stats().resyncs, 1);
        assert_eq!(decoder.buffered(), frame.len());
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 11);
    }

    #[test]
    fn test_resync_keeps_newest_marker() {
        let mut decoder = FrameDecoder::new(FramingMode::Stream, 2048);
        let frame = encode_imu_frame(5, &sample(1));
        let mut data = vec![0x55; 3000];
        data.extend_from_slice(&frame[..20]);
        decoder.push(&data);

        decoder.push(&frame[20..]);
        assert_eq!(decoder.stats().resyncs, 1);
        assert_eq!(decoder.buffered(), frame.len());
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 5);
    }

    #[test]
    fn test_large_read_of_valid_frames_is_not_resynced() {
        let mut bytes = Vec::new();
        for seq in 0..30u16 {
            bytes.extend(encode_imu_frame(seq, &sample(seq as u64)));
        }
        let mut decoder = FrameDecoder::new(FramingMode::Stream, 2048);
        assert!(bytes.len() > 2048);

        decoder.push(&bytes);
        let count = std::iter::from_fn(|| decoder.next_frame()).count();
        assert_eq!(count, 30);
        assert_eq!(decoder.stats().resyncs, 0);
        assert_eq!(decoder.stats().checksum_failures, 0);

        decoder.push(&bytes);
        assert_eq!(std::iter::from_fn(|| decoder.next_frame()).count(), 30);
        assert_eq!(decoder.stats().resyncs, 0);
    }

    #[test]
    fn test_partial_marker_tail_is_kept() {
        let frame = encode_imu_frame(6, &sample(1));
        let mut decoder = stream_decoder();
        let mut first = vec![0x99; 10];
        first.extend_from_slice(&frame[..3]);
        decoder.push(&first);
        assert!(decoder.next_frame().is_none());
        assert!(decoder.buffered() <= MARKER.len() - 1);

        decoder.push(&frame[3..]);
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 6);
    }

    #[test]
    fn test_datagram_mode_drops_leftovers() {
        let frame = encode_imu_frame(8, &sample(1));
        let mut decoder = FrameDecoder::new(FramingMode::Datagram, 4096);

        decoder.push(&frame[..40]);
        assert!(decoder.next_frame().is_none());

        decoder.push(&frame[40..]);
        assert!(decoder.next_frame().is_none());

        decoder.push(&frame);
        assert_eq!(decoder.next_frame().unwrap().header.sequence, 8);
    }

    #[test]
    fn test_non_imu_frame_is_still_framed() {
        let other = encode_frame(12, &[1, 2, 3, 4]);
        let mut decoder = stream_decoder();
        decoder.push(&other);
        let frame = decoder.next_frame().unwrap();
        assert!(!frame.is_imu());
        assert_eq!(frame.body, vec![1, 2, 3, 4]);
    }
}
