//! Linear fade-out over the tail of the window
//!
//! A running counter of samples processed in the current decoding pass
//! drives the envelope. Gain stays at 1.0 until the counter passes the fade
//! start, then falls linearly to 0.0 at the window end.

use crate::pipeline::units::PcmUnits;
use crate::pipeline::window::TimeWindow;

/// Bounds of the envelope in per-channel samples, counted from the window start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEnvelope {
    pub fade_start: i64,
    pub fade_end: i64,
}

impl FadeEnvelope {
    /// Envelope for `window` with a fade of `fade_duration_us`
    pub fn for_window(window: &TimeWindow, units: &PcmUnits, fade_duration_us: i64) -> Self {
        let fade_end = units.us_to_samples(window.len_us());
        let fade_start = (fade_end - units.us_to_samples(fade_duration_us.max(0))).max(0);
        FadeEnvelope {
            fade_start,
            fade_end,
        }
    }

    /// Gain for the sample at position `count` (1-based)
    pub fn gain(&self, count: i64) -> f64 {
        if self.fade_end <= self.fade_start || count < self.fade_start {
            return 1.0;
        }
        let span = (self.fade_end - self.fade_start) as f64;
        let progress = 1.0 - (count - self.fade_start) as f64 / span;
        progress.max(0.0)
    }
}

/// Applies the fade-out to little-endian 16-bit PCM
#[derive(Debug, Clone, Default)]
pub struct FadeOut {
    fade_duration_us: i64,
    sample_count: i64,
}

impl FadeOut {
    pub fn new(fade_duration_us: i64) -> Self {
        FadeOut {
            fade_duration_us: fade_duration_us.max(0),
            sample_count: 0,
        }
    }

    pub fn fade_duration_us(&self) -> i64 {
        self.fade_duration_us
    }

    /// Change the fade length. The sample counter is left alone.
    pub fn set_fade_duration_us(&mut self, fade_duration_us: i64) {
        self.fade_duration_us = fade_duration_us.max(0);
    }

    /// Samples processed since the last reset
    pub fn sample_count(&self) -> i64 {
        self.sample_count
    }

    /// Start counting from zero; called at every decoding pass
    pub fn reset(&mut self) {
        self.sample_count = 0;
    }

    /// Scale one sample, advancing the counter first
    pub fn process_sample(&mut self, envelope: &FadeEnvelope, sample: i16) -> i16 {
        self.sample_count += 1;
        let gain = envelope.gain(self.sample_count);
        if gain >= 1.0 {
            return sample;
        }
        (sample as f64 * gain) as i16
    }

    /// Fade `input` into `output`, both interleaved LE 16-bit PCM
    ///
    /// Processes `min(input.len(), output.len())` bytes rounded down to whole
    /// samples and returns the number of samples written.
    pub fn process(
        &mut self,
        window: &TimeWindow,
        units: &PcmUnits,
        input: &[u8],
        output: &mut [u8],
    ) -> usize {
        let envelope = FadeEnvelope::for_window(window, units, self.fade_duration_us);
        let mut written = 0;
        for (src, dst) in input.chunks_exact(2).zip(output.chunks_exact_mut(2)) {
            let sample = i16::from_le_bytes([src[0], src[1]]);
            let faded = self.process_sample(&envelope, sample);
            dst.copy_from_slice(&faded.to_le_bytes());
            written += 1;
        }
        written
    }
}
