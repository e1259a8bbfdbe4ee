use crate::types::SensorSample;
use crc::{Crc, CRC_32_ISO_HDLC};

// -- Frame header --
pub const MARKER: [u8; 6] = [0x28, 0x36, 0x00, 0x00, 0x00, 0x80];
pub const HEADER_LEN: usize = 14;
/// Upper bound on a declared body length; anything larger is a corrupt header.
pub const MAX_BODY_LEN: usize = 1024;

// -- IMU body geometry (offsets relative to the body) --
pub const IMU_BODY_LEN: usize = 70;
pub const IMU_FRAME_LEN: usize = HEADER_LEN + IMU_BODY_LEN;
pub const SENSOR_TAG: [u8; 6] = [0x00, 0x40, 0x1F, 0x00, 0x00, 0x40];
pub const TIMESTAMP_OFFSET: usize = 0;
pub const TAG_OFFSET: usize = 14;
pub const GYRO_OFFSET: usize = 20;
pub const ACCEL_OFFSET: usize = 32;

// -- Unit conversion --
/// rad/s per raw gyro unit. The device already reports radians per second.
pub const GYRO_SCALE: f32 = 1.0;
/// m/s² per raw accel unit.
pub const ACCEL_SCALE: f32 = 1.0;
/// Device timestamps are nanoseconds; samples carry microseconds.
pub const TIMESTAMP_DIVISOR: u64 = 1000;

/// Device axis feeding each host axis, with its sign.
/// Host `[x, y, z]` = device `[-x, -z, -y]`.
pub const AXIS_MAP: [(usize, f32); 3] = [(0, -1.0), (2, -1.0), (1, -1.0)];

/// Frame checksum: CRC-32/ISO-HDLC over the body.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn checksum(body: &[u8]) -> u32 {
    CRC32.checksum(body)
}

/// Parsed 14-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub body_len: u16,
    pub sequence: u16,
    pub checksum: u32,
}

impl FrameHeader {
    /// Parse a header from the start of `data`.
    ///
    /// Returns `None` when fewer than `HEADER_LEN` bytes are available or the
    /// marker does not match.
    pub fn parse(data: &[u8]) -> Option<FrameHeader> {
        if data.len() < HEADER_LEN || data[..MARKER.len()] != MARKER {
            return None;
        }
        Some(FrameHeader {
            body_len: u16::from_le_bytes([data[6], data[7]]),
            sequence: u16::from_le_bytes([data[8], data[9]]),
            checksum: u32::from_le_bytes([data[10], data[11], data[12], data[13]]),
        })
    }

    /// Whether the declared body length is one the decoder will wait for.
    pub fn is_plausible(&self) -> bool {
        self.body_len > 0 && (self.body_len as usize) <= MAX_BODY_LEN
    }

    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.body_len as usize
    }
}

/// One framed, checksum-verified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub body: Vec<u8>,
}

impl RawFrame {
    pub fn is_imu(&self) -> bool {
        self.body.len() == IMU_BODY_LEN
            && self.body[TAG_OFFSET..TAG_OFFSET + SENSOR_TAG.len()] == SENSOR_TAG
    }
}

/// Frame an arbitrary body: marker, length, sequence, CRC, body.
pub fn encode_frame(sequence: u16, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&MARKER);
    frame.extend_from_slice(&(body.len() as u16).to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&checksum(body).to_le_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Build the device-side IMU frame that decodes back to `sample`.
///
/// Applies the inverse of [`AXIS_MAP`] and converts the timestamp back to
/// nanoseconds. Used by tests and by the mock device.
pub fn encode_imu_frame(sequence: u16, sample: &SensorSample) -> Vec<u8> {
    let mut body = [0u8; IMU_BODY_LEN];
    let timestamp_ns = sample.timestamp.wrapping_mul(TIMESTAMP_DIVISOR);
    body[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&timestamp_ns.to_le_bytes());
    body[TAG_OFFSET..TAG_OFFSET + SENSOR_TAG.len()].copy_from_slice(&SENSOR_TAG);

    let gyro = to_device_axes(&sample.gyro, GYRO_SCALE);
    let accel = to_device_axes(&sample.accel, ACCEL_SCALE);
    write_vec3(&mut body[GYRO_OFFSET..GYRO_OFFSET + 12], &gyro);
    write_vec3(&mut body[ACCEL_OFFSET..ACCEL_OFFSET + 12], &accel);

    encode_frame(sequence, &body)
}

/// Read three consecutive little-endian `f32`s.
pub fn read_vec3(data: &[u8]) -> [f32; 3] {
    let f = |i: usize| f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
    [f(0), f(4), f(8)]
}

fn write_vec3(out: &mut [u8], v: &[f32; 3]) {
    for (i, value) in v.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Map device axes to host axes and scale to physical units.
pub fn to_host_axes(raw: &[f32; 3], scale: f32) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (host, &(device, sign)) in AXIS_MAP.iter().enumerate() {
        out[host] = sign * raw[device] * scale;
    }
    out
}

fn to_device_axes(host: &[f32; 3], scale: f32) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (h, &(device, sign)) in AXIS_MAP.iter().enumerate() {
        out[device] = sign * host[h] / scale;
    }
    out
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
