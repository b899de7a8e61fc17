//! Time, sample and byte conversions for 16-bit interleaved PCM
//!
//! "Samples" here are individual 16-bit values, so one multi-channel frame
//! holds `channel_count` samples. All conversions round half away from zero
//! on exact integer arithmetic.

/// Bytes per PCM sample (16-bit signed)
pub const BYTES_PER_SAMPLE: i64 = 2;

const US_PER_SECOND: i64 = 1_000_000;

/// Conversions for one PCM layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmUnits {
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl PcmUnits {
    pub fn new(sample_rate: u32, channel_count: u16) -> Self {
        PcmUnits {
            sample_rate,
            channel_count,
        }
    }

    /// Samples (all channels) per second
    fn samples_per_second(&self) -> i64 {
        self.sample_rate as i64 * self.channel_count as i64
    }

    /// Bytes per multi-channel frame
    pub fn frame_bytes(&self) -> usize {
        self.channel_count as usize * BYTES_PER_SAMPLE as usize
    }

    pub fn us_to_bytes(&self, us: i64) -> i64 {
        div_round(
            us as i128 * self.samples_per_second() as i128 * BYTES_PER_SAMPLE as i128,
            US_PER_SECOND as i128,
        )
    }

    pub fn bytes_to_us(&self, bytes: i64) -> i64 {
        div_round(
            bytes as i128 * US_PER_SECOND as i128,
            self.samples_per_second() as i128 * BYTES_PER_SAMPLE as i128,
        )
    }

    pub fn us_to_samples(&self, us: i64) -> i64 {
        div_round(
            us as i128 * self.samples_per_second() as i128,
            US_PER_SECOND as i128,
        )
    }

    pub fn samples_to_us(&self, samples: i64) -> i64 {
        div_round(
            samples as i128 * US_PER_SECOND as i128,
            self.samples_per_second() as i128,
        )
    }

    /// Round a byte count down to a whole frame so a cut never splits a sample
    pub fn align_to_frame(&self, bytes: usize) -> usize {
        let frame = self.frame_bytes();
        if frame == 0 {
            return bytes;
        }
        bytes - bytes % frame
    }
}

/// Integer division rounding half away from zero
///
/// A zero denominator yields zero; it only arises from a zero sample rate or
/// channel count, which no caller configures.
fn div_round(num: i128, den: i128) -> i64 {
    if den == 0 {
        return 0;
    }
    let magnitude = (num.abs() + den.abs() / 2) / den.abs();
    if (num < 0) != (den < 0) {
        -(magnitude as i64)
    } else {
        magnitude as i64
    }
}
