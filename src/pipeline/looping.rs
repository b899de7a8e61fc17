//! Loop plan
//!
//! Splits a target output length into passes over the start of the source.
//! Every pass plays `[0, loop_length]` except the last, which plays only
//! what is left. The last pass always fades out: two seconds when the whole
//! output is longer than five seconds, one second otherwise.

use log::info;

use crate::config::LoopConfig;
use crate::error::{ClipError, Result};

const LONG_OUTPUT_US: i64 = 5_000_000;
const LONG_FINAL_FADE_US: i64 = 2_000_000;
const SHORT_FINAL_FADE_US: i64 = 1_000_000;

/// One decoding pass over `[0, end_us]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSegment {
    pub end_us: i64,
    pub fade_duration_us: i64,
}

/// Ordered passes that together fill the target duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopPlan {
    segments: Vec<LoopSegment>,
    current: usize,
}

impl LoopPlan {
    pub fn new(target_duration_us: i64, loop_length_us: i64, loop_fade_us: i64) -> Result<Self> {
        if target_duration_us <= 0 || loop_length_us <= 0 {
            return Err(ClipError::Config {
                reason: format!(
                    "cannot loop {}us of audio into {}us",
                    loop_length_us, target_duration_us
                ),
            });
        }

        let full_passes = target_duration_us / loop_length_us;
        let remainder = target_duration_us - full_passes * loop_length_us;

        let mut ends: Vec<i64> = (0..full_passes).map(|_| loop_length_us).collect();
        if remainder > 0 {
            ends.push(remainder);
        }

        let final_fade_us = if target_duration_us > LONG_OUTPUT_US {
            LONG_FINAL_FADE_US
        } else {
            SHORT_FINAL_FADE_US
        };
        let last = ends.len() - 1;
        let segments = ends
            .into_iter()
            .enumerate()
            .map(|(i, end_us)| LoopSegment {
                end_us,
                fade_duration_us: if i == last {
                    final_fade_us
                } else {
                    loop_fade_us.max(0)
                },
            })
            .collect::<Vec<_>>();

        info!(
            "[LOOP] {}us from {}us passes: {} segments",
            target_duration_us,
            loop_length_us,
            segments.len()
        );
        Ok(LoopPlan {
            segments,
            current: 0,
        })
    }

    pub fn from_config(config: &LoopConfig) -> Result<Self> {
        Self::new(
            config.target_duration_us,
            config.loop_length_us,
            config.loop_fade_us,
        )
    }

    pub fn segments(&self) -> &[LoopSegment] {
        &self.segments
    }

    /// Index of the pass being decoded
    pub fn position(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&LoopSegment> {
        self.segments.get(self.current)
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.segments.len()
    }

    /// Move to the next pass, or `None` once the plan is used up
    pub fn advance(&mut self) -> Option<LoopSegment> {
        if self.is_last() {
            return None;
        }
        self.current += 1;
        self.segments.get(self.current).copied()
    }

    pub fn total_duration_us(&self) -> i64 {
        self.segments.iter().map(|s| s.end_us).sum()
    }
}
