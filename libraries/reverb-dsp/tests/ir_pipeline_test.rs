//! IR pipeline integration tests
//!
//! Drives two channel pipelines the way the engine does: load a stereo IR,
//! rebuild only when needed, merge the channels and feed the main pipelines.

use reverb_core::params::ids;
use reverb_core::{
    AudioBuffer, LogLevel, MemorySink, ParameterSnapshot, RawIr, ReverbError, SampleRate,
};
use reverb_dsp::pipeline::{merge_channels, IrPipeline, MainPipeline, PipelineState};
use reverb_dsp::Task;
use std::sync::Arc;

fn stereo_ir(rate: SampleRate, len: usize) -> RawIr {
    let left = (0..len).map(|i| (-(i as f32) / 300.0).exp()).collect();
    let right = (0..len).map(|i| 0.8 * (-(i as f32) / 250.0).exp()).collect();
    RawIr::new(rate, vec![left, right])
}

fn pipelines(log: &Arc<MemorySink>, raw: &RawIr, rate: SampleRate) -> Vec<IrPipeline> {
    (0..2)
        .map(|channel| {
            let mut pipeline = IrPipeline::new(channel, log.clone());
            pipeline.update_sample_rate(rate);
            pipeline.load_ir(raw, 10.0).unwrap();
            pipeline
                .update_params(&ParameterSnapshot::defaults(), "")
                .unwrap();
            pipeline
        })
        .collect()
}

fn rebuild_all(pipelines: &mut [IrPipeline]) -> Result<AudioBuffer, ReverbError> {
    let mut channels = Vec::new();
    for pipeline in pipelines.iter_mut() {
        channels.push(pipeline.rebuild()?);
    }
    merge_channels(channels)
}

#[test]
fn test_stereo_rebuild_and_merge() {
    let log = MemorySink::shared();
    let raw = stereo_ir(SampleRate::HIGH_RES_96, 4_800);
    let mut pipelines = pipelines(&log, &raw, SampleRate::DVD_QUALITY);

    let merged = rebuild_all(&mut pipelines).unwrap();
    assert_eq!(merged.num_channels(), 2);
    assert_eq!(merged.num_samples(), 2_400);
    assert!(pipelines.iter().all(|p| p.state() == PipelineState::Clean));
}

#[test]
fn test_rebuild_skipped_without_changes() {
    let log = MemorySink::shared();
    let raw = stereo_ir(SampleRate::DVD_QUALITY, 1_000);
    let mut pipelines = pipelines(&log, &raw, SampleRate::DVD_QUALITY);
    rebuild_all(&mut pipelines).unwrap();

    // Several processing cycles with identical parameters
    let params = ParameterSnapshot::defaults();
    for _ in 0..10 {
        for pipeline in &mut pipelines {
            pipeline.update_params(&params, "").unwrap();
            pipeline.update_sample_rate(SampleRate::DVD_QUALITY);
            if pipeline.needs_to_run() {
                pipeline.rebuild().unwrap();
            }
        }
    }
    assert!(pipelines.iter().all(|p| p.rebuild_count() == 1));

    // One change triggers exactly one more rebuild per channel
    let params = params.with_float(ids::IR_GAIN, 0.8);
    for _ in 0..10 {
        for pipeline in &mut pipelines {
            pipeline.update_params(&params, "").unwrap();
            if pipeline.needs_to_run() {
                pipeline.rebuild().unwrap();
            }
        }
    }
    assert!(pipelines.iter().all(|p| p.rebuild_count() == 2));
}

#[test]
fn test_channel_length_mismatch_is_detected() {
    let log = MemorySink::shared();
    let raw = stereo_ir(SampleRate::DVD_QUALITY, 1_000);
    let mut pipelines = pipelines(&log, &raw, SampleRate::DVD_QUALITY);

    // Replace the right channel's source with a shorter one
    pipelines[1].load_channel(vec![0.5; 900], SampleRate::DVD_QUALITY);

    let err = rebuild_all(&mut pipelines).unwrap_err();
    assert!(matches!(err, ReverbError::ChannelLengthMismatch { ref lengths } if lengths == &vec![1_000, 900]));
}

#[test]
fn test_full_chain_into_main_pipeline() {
    let log = MemorySink::shared();
    let raw = stereo_ir(SampleRate::DVD_QUALITY, 2_000);
    let mut ir_pipelines = pipelines(&log, &raw, SampleRate::DVD_QUALITY);
    let params = ParameterSnapshot::defaults()
        .with_float(ids::PREDELAY, 20.0)
        .with_float(ids::WET_RATIO, 1.0);
    for pipeline in &mut ir_pipelines {
        pipeline.update_params(&params, "").unwrap();
    }

    let merged = rebuild_all(&mut ir_pipelines).unwrap();
    assert_eq!(merged.num_samples(), 2_000 + 960);

    let mut mains: Vec<MainPipeline> = (0..2).map(|_| MainPipeline::new(256)).collect();
    for (main, channel) in mains.iter_mut().zip(merged.into_channels()) {
        main.update_params(&params, "").unwrap();
        main.load_ir(AudioBuffer::mono(channel)).unwrap();
    }

    // An impulse comes out after the 20 ms pre-delay
    let mut first = AudioBuffer::mono({
        let mut block = vec![0.0; 256];
        block[0] = 1.0;
        block
    });
    mains[0].exec(&mut first).unwrap();
    assert!(first.channel(0).unwrap().iter().all(|s| s.abs() < 1e-5));

    let mut output = Vec::new();
    for _ in 0..4 {
        let mut block = AudioBuffer::mono(vec![0.0; 256]);
        mains[0].exec(&mut block).unwrap();
        output.extend_from_slice(block.channel(0).unwrap());
    }
    // Sample 960 of the stream is output[960 - 256]
    assert!((output[960 - 256] - 1.0).abs() < 1e-4);
    assert!(output[..960 - 256].iter().all(|s| s.abs() < 1e-4));
    assert_eq!(log.count(LogLevel::Error), 0);
}

#[test]
fn test_invalid_pre_delay_logged_and_skipped() {
    let log = MemorySink::shared();
    let raw = stereo_ir(SampleRate::DVD_QUALITY, 500);
    let mut pipelines = pipelines(&log, &raw, SampleRate::DVD_QUALITY);
    let params = ParameterSnapshot::defaults().with_float(ids::PREDELAY, 1_200.0);
    for pipeline in &mut pipelines {
        pipeline.update_params(&params, "").unwrap();
    }

    let merged = rebuild_all(&mut pipelines).unwrap();
    assert_eq!(merged.num_samples(), 500);
    assert_eq!(log.count(LogLevel::Error), 2);
    assert!(log.contains(LogLevel::Error, "pre-delay"));
}
