//! Pipeline Tests
//!
//! End-to-end behaviour of the decode -> fade -> encode -> mux chain,
//! driven through scripted engines.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;

use audioclip::config::{LoopConfig, PipelineConfig};
use audioclip::engine::{BufferFlags, PcmCodec};
use audioclip::pipeline::{AudioDecoder, DecodeStep, PipelineState};
use audioclip::ClipError;

use common::{
    build, build_with, build_with_codecs, raw_config, ScriptedSource, Signal, TrackingCodec,
    CONFIG_FRAME,
};

const RATE: u32 = 8000;
/// One 1024-sample encoder frame at 8 kHz mono
const FRAME_US: i64 = 128_000;

fn pcm_duration_us(samples: usize) -> i64 {
    samples as i64 * 1_000_000 / RATE as i64
}

// === Window and preconditions ===

#[test]
fn test_window_is_clamped_to_duration() {
    let config = raw_config().with_window(-5, Some(20_000_000));
    let harness = build(ScriptedSource::new(RATE, 1, 10_000_000), &config).unwrap();

    let window = harness.pipeline.window();
    assert_eq!(window.start_us(), 0);
    assert_eq!(window.end_us(), 10_000_000);
}

#[test]
fn test_inverted_window_fails_before_decoding() {
    let source = ScriptedSource::new(RATE, 1, 10_000_000);
    let seeks = source.seeks.clone();
    let config = raw_config().with_window(6_000_000, Some(2_000_000));

    let err = build(source, &config).err().expect("window must be rejected");
    assert!(matches!(
        err,
        ClipError::InvalidWindow {
            start_us: 6_000_000,
            end_us: 2_000_000
        }
    ));
    assert!(err.is_precondition());
    assert!(seeks.lock().unwrap().is_empty());
}

#[test]
fn test_source_without_audio_is_rejected() {
    let source = ScriptedSource::new(RATE, 1, 1_000_000).without_audio();
    let err = build(source, &raw_config()).err().expect("no audio track");
    assert!(matches!(err, ClipError::NoAudioTrack));
}

#[test]
fn test_source_without_duration_is_rejected() {
    let source = ScriptedSource::new(RATE, 1, 1_000_000).without_duration();
    let err = build(source, &raw_config()).err().expect("no duration");
    assert!(matches!(err, ClipError::MissingDuration));
}

#[test]
fn test_audio_track_after_video_is_selected() {
    let source = ScriptedSource::new(RATE, 2, 1_000_000).with_video_track();
    let harness = build(source, &raw_config()).unwrap();
    assert_eq!(harness.pipeline.decoder().track_index(), 1);
    assert_eq!(harness.pipeline.track_info().channel_count, Some(2));
}

// === Trimming ===

#[test]
fn test_trim_duration_matches_window() {
    let config = raw_config().with_window(2_000_000, Some(8_000_000));
    let mut harness = build(ScriptedSource::new(RATE, 1, 10_000_000), &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let recording = harness.recording.lock().unwrap();
    let last = recording.samples.last().unwrap();
    let encoded_end_us = last.presentation_time_us + pcm_duration_us(last.data.len() / 2);
    assert_abs_diff_eq!(encoded_end_us as f64, 6_000_000.0, epsilon = FRAME_US as f64);

    let pcm = recording.pcm();
    assert_eq!(pcm.len(), 48_000);
    // Ramp source: the first kept sample is the one at 2s
    assert_eq!(pcm[0], 16_000);
}

#[test]
fn test_trim_keeps_whole_stereo_frames() {
    // 2.5ms does not fall on a 1024-frame unit boundary
    let config = raw_config().with_window(2_500, Some(502_500));
    let source = ScriptedSource::new(RATE, 2, 1_000_000);
    let mut harness = build(source, &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let pcm = harness.recording.lock().unwrap().pcm();
    assert_eq!(pcm.len() % 2, 0);
    assert_eq!(pcm.len(), 8000);
    // frame 20, left channel
    assert_eq!(pcm[0], 40);
    assert_eq!(pcm[1], 41);
}

// === Fade ===

#[test]
fn test_fade_decays_to_zero() {
    let config = raw_config()
        .with_window(0, Some(10_000_000))
        .with_fade(2_000_000);
    let source = ScriptedSource::new(RATE, 1, 10_000_000).with_signal(Signal::Constant(10_000));
    let mut harness = build(source, &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let pcm = harness.recording.lock().unwrap().pcm();
    assert_eq!(pcm.len(), 80_000);

    let fade_start = 64_000;
    assert!(pcm[..fade_start].iter().all(|s| *s == 10_000));
    let tail = &pcm[fade_start..];
    assert!(tail.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(pcm[71_999], 5_000);
    assert_eq!(*pcm.last().unwrap(), 0);
}

#[test]
fn test_zero_fade_leaves_samples_untouched() {
    let config = raw_config().with_window(0, Some(500_000));
    let source = ScriptedSource::new(RATE, 1, 1_000_000).with_signal(Signal::Constant(-1234));
    let mut harness = build(source, &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let pcm = harness.recording.lock().unwrap().pcm();
    assert_eq!(pcm.len(), 4000);
    assert!(pcm.iter().all(|s| *s == -1234));
}

// === Timestamps ===

#[test]
fn test_written_timestamps_never_decrease() {
    let config = raw_config().with_window(0, Some(1_000_000));
    let (encoder, encoder_stats) = TrackingCodec::new(PcmCodec::new());
    let mut harness = build_with(
        ScriptedSource::new(RATE, 1, 2_000_000),
        (encoder.with_collapsed_final_pts(), encoder_stats),
        &config,
    )
    .unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let times = harness.recording.lock().unwrap().timestamps();
    assert!(times.windows(2).all(|w| w[1] >= w[0]));
    // 7 full frames, then the collapsed tail placed one frame later
    let expected: Vec<i64> = (0..8).map(|i| i * FRAME_US).collect();
    assert_eq!(times, expected);
    assert_eq!(harness.pipeline.mux().frames_repaired(), 1);
}

// === Encoded output ===

#[test]
fn test_output_offset_is_applied_once() {
    let config = raw_config().with_window(0, Some(500_000));
    let mut plain = build(ScriptedSource::new(RATE, 1, 1_000_000), &config).unwrap();
    plain.pipeline.run_to_completion().unwrap();

    let (encoder, encoder_stats) = TrackingCodec::new(PcmCodec::new());
    let mut offset = build_with(
        ScriptedSource::new(RATE, 1, 1_000_000),
        (encoder.with_output_offset(6), encoder_stats),
        &config,
    )
    .unwrap();
    offset.pipeline.run_to_completion().unwrap();

    let expected = plain.recording.lock().unwrap().pcm();
    let written = offset.recording.lock().unwrap().pcm();
    assert_eq!(written.len(), 4000);
    assert_eq!(written, expected);
}

#[test]
fn test_codec_config_frames_are_not_written() {
    let (encoder, encoder_stats) = TrackingCodec::new(PcmCodec::new());
    let mut harness = build_with(
        ScriptedSource::new(RATE, 1, 1_000_000),
        (encoder.with_config_frame(), encoder_stats),
        &raw_config(),
    )
    .unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let recording = harness.recording.lock().unwrap();
    assert!(recording
        .samples
        .iter()
        .all(|s| !s.flags.contains(BufferFlags::CODEC_CONFIG) && s.data != CONFIG_FRAME));
    assert_eq!(recording.pcm().len(), 8000);

    let stats = harness.encoder_stats.lock().unwrap();
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(stats.double_releases, 0);
}

// === Restart ===

fn first_buffer(decoder: &mut AudioDecoder) -> (i64, Vec<u8>) {
    loop {
        match decoder.step().unwrap() {
            DecodeStep::Pending => continue,
            DecodeStep::Buffer(buffer) => {
                let bytes = decoder.bytes(&buffer).unwrap().to_vec();
                let pts = buffer.presentation_time_us();
                decoder.release(buffer).unwrap();
                return (pts, bytes);
            }
            DecodeStep::EndOfStream => panic!("window produced no audio"),
        }
    }
}

#[test]
fn test_restart_reproduces_first_buffer() {
    let source = ScriptedSource::new(RATE, 2, 2_000_000);
    let seeks = source.seeks.clone();
    let mut decoder = AudioDecoder::new(Box::new(source), Box::new(PcmCodec::new())).unwrap();
    decoder.set_start_time_us(300_000);
    decoder.set_end_time_us(900_000);
    decoder.start().unwrap();

    let first = first_buffer(&mut decoder);
    // move further into the window before restarting
    let _ = first_buffer(&mut decoder);

    decoder.restart().unwrap();
    assert_eq!(first_buffer(&mut decoder), first);
    assert_eq!(*seeks.lock().unwrap(), vec![300_000, 300_000]);
}

#[test]
fn test_pipeline_restart_resets_fade_and_position() {
    let config = raw_config().with_window(0, Some(500_000)).with_fade(500_000);
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &config).unwrap();

    while harness.pipeline.fade().sample_count() < 2048 {
        harness.pipeline.run_step().unwrap();
    }
    harness.pipeline.restart().unwrap();
    assert_eq!(harness.pipeline.fade().sample_count(), 0);

    harness.pipeline.run_to_completion().unwrap();
    assert_eq!(harness.decoder_stats.lock().unwrap().flushes, 1);
}

#[test]
fn test_restart_after_finish_is_rejected() {
    let config = raw_config().with_window(0, Some(200_000));
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    assert!(harness.pipeline.restart().is_err());
    let outcome = harness.pipeline.run_step().unwrap();
    assert!(outcome.finished);
    assert!(!outcome.progressed);
}

// === Buffer discipline ===

#[test]
fn test_every_buffer_is_released_once() {
    let config = raw_config().with_window(100_000, Some(1_700_000)).with_fade(300_000);
    let mut harness = build(ScriptedSource::new(RATE, 2, 2_000_000), &config).unwrap();
    harness.pipeline.run_to_completion().unwrap();

    for stats in [&harness.decoder_stats, &harness.encoder_stats] {
        let stats = stats.lock().unwrap();
        assert!(stats.outputs_dequeued > 0);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.double_releases, 0);
    }
}

#[test]
fn test_release_discipline_survives_restart() {
    // 400 KB access units do not fit one 256 KiB encoder slot, so the
    // second step leaves a decoded buffer half consumed
    let source = ScriptedSource::new(48_000, 1, 10_000_000).with_unit_frames(200_000);
    let mut harness = build(source, &raw_config()).unwrap();

    for _ in 0..2 {
        harness.pipeline.run_step().unwrap();
    }
    {
        let stats = harness.decoder_stats.lock().unwrap();
        assert_eq!(stats.outstanding(), 1);
    }
    harness.pipeline.restart().unwrap();
    harness.pipeline.run_to_completion().unwrap();

    let stats = harness.decoder_stats.lock().unwrap();
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(stats.double_releases, 0);
    assert_eq!(harness.recording.lock().unwrap().pcm().len(), 480_000 + 131_072);
}

// === Lifecycle ===

#[test]
fn test_listener_fires_once_per_pass() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = raw_config().with_window(0, Some(500_000));
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &config).unwrap();

    let counter = calls.clone();
    harness.pipeline.set_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    harness.pipeline.run_to_completion().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(harness.pipeline.is_finished());
}

#[test]
fn test_ready_once_output_track_is_added() {
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &raw_config()).unwrap();
    assert!(!harness.pipeline.is_ready());
    assert_eq!(harness.pipeline.run_until_ready().unwrap(), 0);
    assert!(harness.pipeline.is_ready());
    assert_eq!(harness.pipeline.track_index(), Some(0));
    assert_eq!(harness.recording.lock().unwrap().tracks.len(), 1);
}

#[test]
fn test_engine_fault_stops_the_pipeline() {
    let (encoder, encoder_stats) = TrackingCodec::new(PcmCodec::new());
    let mut harness = build_with(
        ScriptedSource::new(RATE, 1, 1_000_000),
        (encoder.with_fault_on_poll(3), encoder_stats),
        &raw_config(),
    )
    .unwrap();

    let err = loop {
        match harness.pipeline.run_step() {
            Ok(outcome) => assert!(!outcome.finished),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, ClipError::CodecState { engine: "encoder", .. }));
    assert_eq!(harness.pipeline.state(), PipelineState::Failed);
    assert!(matches!(
        harness.pipeline.run_step(),
        Err(ClipError::PipelineStopped)
    ));
    assert!(harness.encoder_stats.lock().unwrap().released);
    assert!(harness.decoder_stats.lock().unwrap().released);
}

#[test]
fn test_decoder_fault_stops_the_pipeline() {
    let (decoder, decoder_stats) = TrackingCodec::new(PcmCodec::new());
    let mut harness = build_with_codecs(
        ScriptedSource::new(RATE, 1, 1_000_000),
        (decoder.with_fault_on_poll(2), decoder_stats),
        TrackingCodec::new(PcmCodec::new()),
        &raw_config(),
    )
    .unwrap();

    let err = loop {
        match harness.pipeline.run_step() {
            Ok(outcome) => assert!(!outcome.finished),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, ClipError::CodecState { engine: "decoder", .. }));
    assert_eq!(harness.pipeline.state(), PipelineState::Failed);
    assert!(matches!(
        harness.pipeline.run_step(),
        Err(ClipError::PipelineStopped)
    ));
    assert!(harness.decoder_stats.lock().unwrap().released);
    assert!(harness.encoder_stats.lock().unwrap().released);
}

#[test]
fn test_default_target_is_rejected_by_pcm_engine() {
    let result = build(ScriptedSource::new(RATE, 1, 1_000_000), &PipelineConfig::default());
    assert!(matches!(result, Err(ClipError::UnsupportedFormat { .. })));
}

#[test]
fn test_stop_is_idempotent() {
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &raw_config()).unwrap();
    harness.pipeline.run_step().unwrap();
    harness.pipeline.stop();
    harness.pipeline.stop();

    assert_eq!(harness.pipeline.state(), PipelineState::Stopped);
    assert!(matches!(
        harness.pipeline.run_step(),
        Err(ClipError::PipelineStopped)
    ));
    assert!(harness.decoder_stats.lock().unwrap().released);
}

// === Looping ===

#[test]
fn test_loop_plan_repeats_source_start() {
    let passes = Arc::new(AtomicUsize::new(0));
    let config = raw_config().with_looping(LoopConfig {
        target_duration_us: 1_000_000,
        loop_length_us: 400_000,
        loop_fade_us: 0,
    });
    let mut harness = build(ScriptedSource::new(RATE, 1, 1_000_000), &config).unwrap();
    let counter = passes.clone();
    harness.pipeline.set_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    harness.pipeline.run_to_completion().unwrap();

    assert_eq!(passes.load(Ordering::SeqCst), 3);
    assert_eq!(harness.decoder_stats.lock().unwrap().flushes, 2);

    let recording = harness.recording.lock().unwrap();
    let pcm = recording.pcm();
    assert_eq!(pcm.len(), 8000);
    // second pass starts over at the source start, unfaded
    assert_eq!(pcm[3200..3300], pcm[0..100]);
    // the last pass fades out completely
    assert_eq!(*pcm.last().unwrap(), 0);

    let times = recording.timestamps();
    assert!(times.windows(2).all(|w| w[1] > w[0]));
}
