//! Time window over the source track

use serde::Serialize;

use crate::error::{ClipError, Result};

/// The `[start_us, end_us]` range of source audio to process
///
/// Setters clamp into `[0, duration_us]` and never fail. Whether the window
/// is usable (`start_us <= end_us`) is checked by [`TimeWindow::validate`]
/// when a decoding pass starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start_us: i64,
    end_us: i64,
    duration_us: i64,
}

impl TimeWindow {
    /// The whole track
    pub fn full(duration_us: i64) -> Self {
        let duration_us = duration_us.max(0);
        TimeWindow {
            start_us: 0,
            end_us: duration_us,
            duration_us,
        }
    }

    pub fn start_us(&self) -> i64 {
        self.start_us
    }

    pub fn end_us(&self) -> i64 {
        self.end_us
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    /// Length of the window; zero when the window is inverted
    pub fn len_us(&self) -> i64 {
        (self.end_us - self.start_us).max(0)
    }

    pub fn set_start_us(&mut self, start_us: i64) {
        self.start_us = start_us.clamp(0, self.duration_us);
    }

    pub fn set_end_us(&mut self, end_us: i64) {
        self.end_us = end_us.clamp(0, self.duration_us);
    }

    /// Fail with `InvalidWindow` when start lies after end
    pub fn validate(&self) -> Result<()> {
        if self.start_us > self.end_us {
            return Err(ClipError::InvalidWindow {
                start_us: self.start_us,
                end_us: self.end_us,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_window() {
        let window = TimeWindow::full(10_000_000);
        assert_eq!(window.start_us(), 0);
        assert_eq!(window.end_us(), 10_000_000);
        assert_eq!(window.len_us(), 10_000_000);
    }

    #[test]
    fn test_setters_clamp_to_duration() {
        let mut window = TimeWindow::full(10_000_000);
        window.set_start_us(-5);
        window.set_end_us(20_000_000);
        assert_eq!(window.start_us(), 0);
        assert_eq!(window.end_us(), 10_000_000);

        window.set_start_us(12_000_000);
        window.set_end_us(-1);
        assert_eq!(window.start_us(), 10_000_000);
        assert_eq!(window.end_us(), 0);
    }

    #[test]
    fn test_inverted_window_is_rejected_not_fixed() {
        let mut window = TimeWindow::full(10_000_000);
        window.set_start_us(6_000_000);
        window.set_end_us(2_000_000);
        assert_eq!(window.start_us(), 6_000_000);
        assert!(matches!(
            window.validate(),
            Err(ClipError::InvalidWindow {
                start_us: 6_000_000,
                end_us: 2_000_000
            })
        ));
        assert_eq!(window.len_us(), 0);
    }
}
