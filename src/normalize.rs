use crate::protocol::{
    self, RawFrame, ACCEL_OFFSET, ACCEL_SCALE, GYRO_OFFSET, GYRO_SCALE, IMU_BODY_LEN,
    SENSOR_TAG, TAG_OFFSET, TIMESTAMP_DIVISOR, TIMESTAMP_OFFSET,
};
use crate::types::{SampleChecks, SensorSample};
use crate::{Result, XrealError};

const MAX_GYRO: f32 = 1000.0;
const MAX_ACCEL: f32 = 100.0;
const GRAVITY_BAND: (f32, f32) = (5.0, 15.0);

/// Converts validated IMU frames into [`SensorSample`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    checks: SampleChecks,
}

impl Normalizer {
    pub fn new(checks: SampleChecks) -> Self {
        Self { checks }
    }

    /// Decode one frame.
    ///
    /// Fails with `MalformedFrame` for frames that are not IMU messages or whose
    /// values fail the configured plausibility checks. Callers treat that as
    /// "no sample yet".
    pub fn normalize(&self, frame: &RawFrame) -> Result<SensorSample> {
        if frame.body.len() != IMU_BODY_LEN {
            return Err(XrealError::malformed(format!(
                "body length {} is not an IMU frame",
                frame.body.len()
            )));
        }
        if frame.body[TAG_OFFSET..TAG_OFFSET + SENSOR_TAG.len()] != SENSOR_TAG {
            return Err(XrealError::malformed("missing sensor tag"));
        }

        let body = &frame.body;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&body[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);
        let timestamp = u64::from_le_bytes(ts) / TIMESTAMP_DIVISOR;

        let raw_gyro = protocol::read_vec3(&body[GYRO_OFFSET..GYRO_OFFSET + 12]);
        let raw_accel = protocol::read_vec3(&body[ACCEL_OFFSET..ACCEL_OFFSET + 12]);
        self.check(&raw_gyro, &raw_accel)?;

        Ok(SensorSample {
            gyro: protocol::to_host_axes(&raw_gyro, GYRO_SCALE),
            accel: protocol::to_host_axes(&raw_accel, ACCEL_SCALE),
            timestamp,
        })
    }

    fn check(&self, gyro: &[f32; 3], accel: &[f32; 3]) -> Result<()> {
        let all = || gyro.iter().chain(accel.iter());

        if self.checks.contains(SampleChecks::FINITE) && !all().all(|v| v.is_finite()) {
            return Err(XrealError::malformed("non-finite sensor value"));
        }
        if self.checks.contains(SampleChecks::GYRO_RANGE)
            && gyro.iter().any(|v| v.abs() > MAX_GYRO)
        {
            return Err(XrealError::malformed("gyroscope value out of range"));
        }
        if self.checks.contains(SampleChecks::ACCEL_RANGE)
            && accel.iter().any(|v| v.abs() > MAX_ACCEL)
        {
            return Err(XrealError::malformed("accelerometer value out of range"));
        }

        let accel_magnitude = magnitude(accel);
        if self.checks.contains(SampleChecks::NON_ZERO)
            && magnitude(gyro) < 1e-6
            && accel_magnitude < 1e-6
        {
            return Err(XrealError::malformed("all-zero sensor data"));
        }
        if self.checks.contains(SampleChecks::GRAVITY)
            && !(GRAVITY_BAND.0..=GRAVITY_BAND.1).contains(&accel_magnitude)
        {
            return Err(XrealError::malformed(format!(
                "accelerometer magnitude {:.2} outside gravity band",
                accel_magnitude
            )));
        }
        Ok(())
    }
}

fn magnitude(v: &[f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{FrameDecoder, FramingMode};
    use crate::protocol::{encode_frame, encode_imu_frame};

    fn decode(bytes: &[u8]) -> RawFrame {
        let mut decoder = FrameDecoder::new(FramingMode::Stream, 4096);
        decoder.push(bytes);
        decoder.next_frame().unwrap()
    }

    fn frame_with(gyro: [f32; 3], accel: [f32; 3]) -> RawFrame {
        decode(&encode_imu_frame(
            0,
            &SensorSample {
                gyro,
                accel,
                timestamp: 1,
            },
        ))
    }

    #[test]
    fn test_scenario_values_round_trip_exactly() {
        let expected = SensorSample {
            gyro: [0.1, -0.2, 0.05],
            accel: [9.8, 0.0, 0.1],
            timestamp: 1000,
        };
        let frame = decode(&encode_imu_frame(1, &expected));
        let sample = Normalizer::default().normalize(&frame).unwrap();
        assert_eq!(sample, expected);
    }

    #[test]
    fn test_timestamp_is_device_microseconds() {
        let mut bytes = encode_imu_frame(
            0,
            &SensorSample {
                gyro: [0.0, 0.0, 1.0],
                accel: [0.0, 9.81, 0.0],
                timestamp: 0,
            },
        );
        // Patch a nanosecond count that is not a whole microsecond.
        let body_start = protocol::HEADER_LEN;
        bytes[body_start..body_start + 8].copy_from_slice(&1_234_567_999u64.to_le_bytes());
        let crc = protocol::checksum(&bytes[body_start..]);
        bytes[10..14].copy_from_slice(&crc.to_le_bytes());

        let sample = Normalizer::default().normalize(&decode(&bytes)).unwrap();
        assert_eq!(sample.timestamp, 1_234_567);
    }

    #[test]
    fn test_device_axes_are_remapped() {
        let mut body = [0u8; IMU_BODY_LEN];
        body[TAG_OFFSET..TAG_OFFSET + 6].copy_from_slice(&SENSOR_TAG);
        for (i, v) in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0].iter().enumerate() {
            body[GYRO_OFFSET + i * 4..GYRO_OFFSET + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        let sample = Normalizer::default()
            .normalize(&decode(&encode_frame(0, &body)))
            .unwrap();
        assert_eq!(sample.gyro, [-1.0, -3.0, -2.0]);
        assert_eq!(sample.accel, [-4.0, -6.0, -5.0]);
    }

    #[test]
    fn test_non_imu_frames_are_malformed() {
        let short = decode(&encode_frame(0, &[0u8; 12]));
        assert!(matches!(
            Normalizer::default().normalize(&short),
            Err(XrealError::MalformedFrame(_))
        ));

        let untagged = decode(&encode_frame(0, &[0x11u8; IMU_BODY_LEN]));
        assert!(matches!(
            Normalizer::default().normalize(&untagged),
            Err(XrealError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_plausibility_checks() {
        let normalizer = Normalizer::default();
        assert!(normalizer
            .normalize(&frame_with([f32::NAN, 0.0, 0.0], [0.0, 9.8, 0.0]))
            .is_err());
        assert!(normalizer
            .normalize(&frame_with([0.0, 0.0, 0.0], [0.0, f32::INFINITY, 0.0]))
            .is_err());
        assert!(normalizer
            .normalize(&frame_with([1500.0, 0.0, 0.0], [0.0, 9.8, 0.0]))
            .is_err());
        assert!(normalizer
            .normalize(&frame_with([0.0, 0.0, 0.0], [0.0, 120.0, 0.0]))
            .is_err());
        assert!(normalizer
            .normalize(&frame_with([0.0; 3], [0.0; 3]))
            .is_err());

        // Free fall is fine unless the gravity band is requested.
        let weightless = frame_with([0.5, 0.0, 0.0], [0.0, 0.2, 0.0]);
        assert!(normalizer.normalize(&weightless).is_ok());
        let strict = Normalizer::new(SampleChecks::default() | SampleChecks::GRAVITY);
        assert!(strict.normalize(&weightless).is_err());

        let lax = Normalizer::new(SampleChecks::empty());
        assert!(lax.normalize(&frame_with([f32::NAN; 3], [0.0; 3])).is_ok());
    }
}
