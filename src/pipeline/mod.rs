//! Transcode pipeline
//!
//! decode -> trim -> fade -> encode -> mux, driven by cooperative polling.
//! [`AudioPipeline::run_step`] never blocks: it advances whatever part of
//! the chain can move and returns. Callers loop on it, usually interleaved
//! with a video pipeline writing to the same container.

pub mod decoder;
pub mod encoder;
pub mod fade;
pub mod looping;
pub mod mux;
pub mod units;
pub mod window;

use std::fmt;

use log::{debug, error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::engine::codec::Codec;
use crate::engine::container::SharedWriter;
use crate::engine::source::MediaSource;
use crate::error::{ClipError, Result};

pub use decoder::{AudioDecoder, DecodeStep, DecodedBuffer, DecoderState, TrackInfo};
pub use encoder::{AudioEncoder, EncodeStep, EncoderState};
pub use fade::{FadeEnvelope, FadeOut};
pub use looping::{LoopPlan, LoopSegment};
pub use mux::{EncodedFrame, MuxSynchronizer, DEFAULT_SAMPLES_PER_FRAME};
pub use units::PcmUnits;
pub use window::TimeWindow;

/// Sample rate used when neither the target nor the track sets one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Bit rate used when neither the target nor the track sets one
pub const DEFAULT_BIT_RATE: u32 = 128_000;
/// Channel count used when neither the target nor the track sets one
pub const DEFAULT_CHANNEL_COUNT: u16 = 2;

/// Observer told when a decoding pass has handed all its audio to the encoder
///
/// Fires once per pass. Closures implement it.
pub trait InputExhaustedListener: Send {
    fn on_input_exhausted(&mut self);
}

impl<F: FnMut() + Send> InputExhaustedListener for F {
    fn on_input_exhausted(&mut self) {
        self()
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    /// The last encoded frame has been written
    Finished,
    /// Torn down by `stop`
    Stopped,
    /// Torn down after a fatal error
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Running => write!(f, "Running"),
            PipelineState::Finished => write!(f, "Finished"),
            PipelineState::Stopped => write!(f, "Stopped"),
            PipelineState::Failed => write!(f, "Failed"),
        }
    }
}

/// Result of one pipeline step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub progressed: bool,
    pub finished: bool,
}

/// One audio transcode session
pub struct AudioPipeline {
    id: Uuid,
    decoder: AudioDecoder,
    encoder: AudioEncoder,
    fade: FadeOut,
    mux: MuxSynchronizer,
    listener: Option<Box<dyn InputExhaustedListener>>,
    loop_plan: Option<LoopPlan>,
    state: PipelineState,
    torn_down: bool,
    steps: u64,
}

impl AudioPipeline {
    /// Open the audio track of `source` and start both engines
    ///
    /// # Arguments
    /// * `source` - Opened container holding at least one audio track
    /// * `decode_codec` - Unconfigured engine for the source track format
    /// * `encode_codec` - Unconfigured engine for the output format
    /// * `writer` - Container writer, possibly shared with other pipelines
    /// * `config` - Window, fade, encoder overrides and loop plan
    ///
    /// # Errors
    /// Precondition errors (`NoAudioTrack`, `InvalidWindow`,
    /// `MissingDuration`, `Config`) before any engine is started, engine
    /// errors otherwise.
    pub fn new(
        source: Box<dyn MediaSource>,
        decode_codec: Box<dyn Codec>,
        encode_codec: Box<dyn Codec>,
        writer: SharedWriter,
        config: &PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut decoder = AudioDecoder::new(source, decode_codec)?;
        let mut fade = FadeOut::new(config.fade_duration_us);

        let loop_plan = config
            .looping
            .as_ref()
            .map(LoopPlan::from_config)
            .transpose()?;
        match loop_plan.as_ref().and_then(|plan| plan.current()) {
            Some(segment) => {
                decoder.set_start_time_us(0);
                decoder.set_end_time_us(segment.end_us);
                fade.set_fade_duration_us(segment.fade_duration_us);
            }
            None => {
                decoder.set_start_time_us(config.start_time_us);
                if let Some(end_us) = config.end_time_us {
                    decoder.set_end_time_us(end_us);
                }
            }
        }
        decoder.window().validate()?;

        let mut encoder = AudioEncoder::start(encode_codec, decoder.track_info(), &config.target)?;
        if let Err(e) = decoder.start() {
            encoder.stop();
            decoder.release_resources();
            return Err(e);
        }

        let mux = MuxSynchronizer::new(
            writer,
            encoder.units().sample_rate,
            config.samples_per_frame,
        );
        let id = Uuid::new_v4();
        info!(
            "[PIPELINE] Session {} window [{}us, {}us], fade {}us",
            id,
            decoder.start_time_us(),
            decoder.end_time_us(),
            fade.fade_duration_us()
        );

        Ok(AudioPipeline {
            id,
            decoder,
            encoder,
            fade,
            mux,
            listener: None,
            loop_plan,
            state: PipelineState::Running,
            torn_down: false,
            steps: 0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == PipelineState::Finished
    }

    /// Whether the output track has been registered with the container
    pub fn is_ready(&self) -> bool {
        self.mux.is_ready()
    }

    pub fn track_index(&self) -> Option<usize> {
        self.mux.track_index()
    }

    pub fn track_info(&self) -> &TrackInfo {
        self.decoder.track_info()
    }

    pub fn duration_us(&self) -> i64 {
        self.decoder.duration_us()
    }

    pub fn window(&self) -> &TimeWindow {
        self.decoder.window()
    }

    pub fn decoder(&self) -> &AudioDecoder {
        &self.decoder
    }

    pub fn encoder(&self) -> &AudioEncoder {
        &self.encoder
    }

    pub fn fade(&self) -> &FadeOut {
        &self.fade
    }

    pub fn mux(&self) -> &MuxSynchronizer {
        &self.mux
    }

    pub fn loop_plan(&self) -> Option<&LoopPlan> {
        self.loop_plan.as_ref()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    // ========================================================================
    // Control
    // ========================================================================

    pub fn set_listener(&mut self, listener: impl InputExhaustedListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Change the window used by the next decoding pass
    pub fn set_window(&mut self, start_us: i64, end_us: i64) {
        self.decoder.set_start_time_us(start_us);
        self.decoder.set_end_time_us(end_us);
    }

    /// Change the fade length. The fade counter keeps running.
    pub fn set_fade_duration_us(&mut self, fade_duration_us: i64) {
        self.fade.set_fade_duration_us(fade_duration_us);
    }

    /// Start a new decoding pass from the window start
    ///
    /// Resets the fade counter and flushes the decoder. The encoder keeps
    /// its configuration and its running presentation time.
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.encoder.is_input_done() {
            return Err(ClipError::codec(
                "encoder",
                "cannot restart after end of input was queued",
            ));
        }
        let result = self.restart_pass();
        self.fail_on_error(result)
    }

    fn restart_pass(&mut self) -> Result<()> {
        self.encoder.discard_pending(&mut self.decoder)?;
        self.fade.reset();
        self.decoder.restart()
    }

    /// Advance the pipeline without blocking
    pub fn run_step(&mut self) -> Result<StepOutcome> {
        match self.state {
            PipelineState::Finished => {
                return Ok(StepOutcome {
                    progressed: false,
                    finished: true,
                })
            }
            PipelineState::Stopped | PipelineState::Failed => {
                return Err(ClipError::PipelineStopped)
            }
            PipelineState::Running => {}
        }

        self.steps += 1;
        let result = self.advance();
        self.fail_on_error(result)
    }

    fn advance(&mut self) -> Result<StepOutcome> {
        let step = self
            .encoder
            .step(&mut self.decoder, &mut self.fade, &mut self.mux)?;

        if step.input_exhausted {
            self.on_input_exhausted()?;
        }
        if step.finished {
            self.state = PipelineState::Finished;
            info!(
                "[PIPELINE] Session {} finished: {} frames, {} repaired, {} steps",
                self.id,
                self.mux.frames_written(),
                self.mux.frames_repaired(),
                self.steps
            );
        }
        Ok(StepOutcome {
            progressed: step.progressed,
            finished: step.finished,
        })
    }

    fn on_input_exhausted(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_input_exhausted();
        }

        let next = self.loop_plan.as_mut().and_then(|plan| plan.advance());
        if let Some(segment) = next {
            debug!(
                "[PIPELINE] Next loop pass: [0, {}us], fade {}us",
                segment.end_us, segment.fade_duration_us
            );
            self.decoder.set_start_time_us(0);
            self.decoder.set_end_time_us(segment.end_us);
            self.fade.set_fade_duration_us(segment.fade_duration_us);
            self.restart_pass()?;
        }
        Ok(())
    }

    /// Step until the output track is registered
    pub fn run_until_ready(&mut self) -> Result<usize> {
        loop {
            if let Some(index) = self.mux.track_index() {
                return Ok(index);
            }
            if self.run_step()?.finished {
                return Err(ClipError::codec(
                    "encoder",
                    "finished without reporting an output format",
                ));
            }
        }
    }

    /// Step until the last frame has been written
    pub fn run_to_completion(&mut self) -> Result<()> {
        while !self.run_step()?.finished {}
        Ok(())
    }

    /// Tear down both engines, dropping any in-flight buffer. Idempotent.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Running || self.state == PipelineState::Finished {
            self.state = PipelineState::Stopped;
        }
        self.teardown();
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            PipelineState::Running => Ok(()),
            PipelineState::Finished => Err(ClipError::codec(
                "encoder",
                "session already finished",
            )),
            PipelineState::Stopped | PipelineState::Failed => Err(ClipError::PipelineStopped),
        }
    }

    fn fail_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("[PIPELINE] Session {} failed: {}", self.id, e);
            self.state = PipelineState::Failed;
            self.teardown();
        }
        result
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.encoder.stop();
        self.decoder.release_resources();
        debug!("[PIPELINE] Session {} torn down", self.id);
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
