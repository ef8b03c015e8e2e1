/// IR preparation pipeline (one per channel)
///
/// Turns the raw IR for one channel into the IR the main pipeline convolves
/// with. Stage order is fixed: filters expect the IR's native rate, while
/// gain and pre-delay run after resampling.
use super::state::{PipelineEvent, PipelineState};
use crate::stages::{Filter, FilterKind, Gain, PreDelay, ResamplingQuality, TimeStretch};
use crate::task::Task;
use reverb_core::params::ids;
use reverb_core::{
    AudioBuffer, ErrorCategory, LogLevel, ParameterSource, RawIr, Result, ReverbError, SampleRate,
    SharedLogSink,
};
use std::time::Instant;

/// Position in the IR pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrStage {
    /// Filter slot 0..=3
    Filter(usize),
    TimeStretch,
    Gain,
    PreDelay,
}

/// Execution order of the IR pipeline
pub const IR_STAGES: [IrStage; 7] = [
    IrStage::Filter(0),
    IrStage::Filter(1),
    IrStage::Filter(2),
    IrStage::Filter(3),
    IrStage::TimeStretch,
    IrStage::Gain,
    IrStage::PreDelay,
];

/// Split a raw IR into at most two mono channels of at most `max_seconds`
pub fn split_ir(raw: &RawIr, max_seconds: f32) -> Result<Vec<Vec<f32>>> {
    if raw.num_samples() == 0 {
        return Err(ReverbError::IrDecode("impulse response has no samples".to_string()));
    }
    let max_samples = (max_seconds.max(0.0) * raw.sample_rate.as_hz() as f32) as usize;
    Ok(raw
        .channels
        .iter()
        .take(2)
        .map(|channel| channel[..channel.len().min(max_samples)].to_vec())
        .collect())
}

/// Merge per-channel mono IRs into one multi-channel IR
///
/// Fails with a consistency error if the channels differ in length.
pub fn merge_channels(channels: Vec<AudioBuffer>) -> Result<AudioBuffer> {
    let mut merged = Vec::with_capacity(channels.len());
    for channel in channels {
        let mut samples = channel.into_channels();
        if samples.len() != 1 {
            return Err(ReverbError::not_mono("IRPipeline", samples.len()));
        }
        merged.append(&mut samples);
    }
    AudioBuffer::from_channels(merged)
}

/// Per-channel IR pipeline
pub struct IrPipeline {
    channel: usize,
    filters: [Filter; 4],
    time_stretch: TimeStretch,
    gain: Gain,
    pre_delay: PreDelay,
    source: Option<Vec<f32>>,
    state: PipelineState,
    sample_rate: SampleRate,
    rebuild_count: u64,
    log: SharedLogSink,
}

impl IrPipeline {
    /// Pipeline for engine channel `channel`
    pub fn new(channel: usize, log: SharedLogSink) -> Self {
        Self::with_quality(channel, ResamplingQuality::default(), log)
    }

    pub fn with_quality(channel: usize, quality: ResamplingQuality, log: SharedLogSink) -> Self {
        Self {
            channel,
            filters: [
                Filter::new(FilterKind::LowShelf),
                Filter::new(FilterKind::Peak),
                Filter::new(FilterKind::Peak),
                Filter::new(FilterKind::HighShelf),
            ],
            time_stretch: TimeStretch::with_quality(quality),
            gain: Gain::new(),
            pre_delay: PreDelay::new(),
            source: None,
            state: PipelineState::default(),
            sample_rate: SampleRate::UNSET,
            rebuild_count: 0,
            log,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether a raw IR has been loaded
    pub fn has_ir(&self) -> bool {
        self.source.is_some()
    }

    /// Length of the loaded raw IR
    pub fn source_len(&self) -> usize {
        self.source.as_ref().map_or(0, Vec::len)
    }

    /// Number of completed rebuilds
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    /// Filter in `slot`
    pub fn filter(&self, slot: usize) -> Option<&Filter> {
        self.filters.get(slot)
    }

    /// Load this channel's share of `raw`, capped at `max_seconds`
    ///
    /// Channels past the IR's channel count wrap around, so a mono IR feeds
    /// every channel.
    pub fn load_ir(&mut self, raw: &RawIr, max_seconds: f32) -> Result<()> {
        let mut channels = split_ir(raw, max_seconds)?;
        let index = self.channel % channels.len();
        let samples = channels.swap_remove(index);
        self.load_channel(samples, raw.sample_rate);
        Ok(())
    }

    /// Replace the raw source with `samples` recorded at `rate`
    pub fn load_channel(&mut self, samples: Vec<f32>, rate: SampleRate) {
        self.source = Some(samples);
        self.time_stretch.set_original_rate(rate);
        self.state = self.state.reduce(PipelineEvent::IrLoaded);
    }

    /// Run the pipeline on the loaded source and return the prepared IR
    pub fn rebuild(&mut self) -> Result<AudioBuffer> {
        let mut ir = AudioBuffer::default();
        self.exec(&mut ir)?;
        Ok(ir)
    }

    fn run_stage(&mut self, stage: IrStage, ir: &mut AudioBuffer) -> Result<()> {
        match stage {
            IrStage::Filter(slot) => self.filters[slot].exec(ir),
            IrStage::TimeStretch => self.time_stretch.exec(ir),
            IrStage::Gain => self.gain.exec(ir),
            IrStage::PreDelay => self.pre_delay.exec(ir),
        }
    }

    fn stage_name(&self, stage: IrStage) -> &'static str {
        match stage {
            IrStage::Filter(slot) => self.filters[slot].name(),
            IrStage::TimeStretch => self.time_stretch.name(),
            IrStage::Gain => self.gain.name(),
            IrStage::PreDelay => self.pre_delay.name(),
        }
    }

    /// Decide whether a stage failure is skipped (logged) or aborts the rebuild
    fn absorb(&self, stage: IrStage, err: ReverbError) -> Result<()> {
        let name = self.stage_name(stage);
        match (stage, err.category()) {
            (IrStage::Filter(slot), ErrorCategory::Range) => {
                self.log.log(
                    LogLevel::Warning,
                    &format!(
                        "Channel {}: treating {} (slot {}) as disabled: {}",
                        self.channel, name, slot, err
                    ),
                );
                Ok(())
            }
            (IrStage::TimeStretch, ErrorCategory::Recoverable) | (IrStage::PreDelay, _) => {
                self.log.log(
                    LogLevel::Error,
                    &format!(
                        "Channel {}: skipping {} step due to: {}",
                        self.channel, name, err
                    ),
                );
                Ok(())
            }
            _ => Err(err),
        }
    }
}

impl Task for IrPipeline {
    /// Fans out to every stage with its fixed key; `block_id` is unused
    fn update_params(&mut self, params: &dyn ParameterSource, _block_id: &str) -> Result<bool> {
        let mut changed = false;
        for (filter, slot) in self.filters.iter_mut().zip(ids::FILTER_SLOTS) {
            changed |= filter.update_params(params, slot)?;
        }
        changed |= self.time_stretch.update_params(params, "")?;
        changed |= self.gain.update_params(params, ids::IR_GAIN)?;
        changed |= self.pre_delay.update_params(params, ids::PREDELAY)?;

        if changed {
            self.state = self.state.reduce(PipelineEvent::ParamsChanged);
        }
        Ok(changed)
    }

    /// Replace `buffer` with the prepared IR
    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let Some(source) = &self.source else {
            return Err(ReverbError::IrNotFound(format!(
                "no IR loaded for channel {}",
                self.channel
            )));
        };
        let started = Instant::now();
        buffer.load_mono(source);
        self.state = self.state.reduce(PipelineEvent::RebuildStarted);

        for stage in IR_STAGES {
            if let Err(err) = self.run_stage(stage, buffer) {
                if let Err(err) = self.absorb(stage, err) {
                    self.state = self.state.reduce(PipelineEvent::RebuildFailed);
                    self.log.log(
                        LogLevel::Error,
                        &format!("Channel {}: IR rebuild aborted: {}", self.channel, err),
                    );
                    return Err(err);
                }
            }
        }

        self.rebuild_count += 1;
        self.state = self.state.reduce(PipelineEvent::RebuildFinished);
        tracing::debug!(
            channel = self.channel,
            samples = buffer.num_samples(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "IR rebuilt"
        );
        Ok(())
    }

    fn needs_to_run(&self) -> bool {
        self.state.is_dirty() && self.source.is_some()
    }

    fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        for filter in &mut self.filters {
            filter.update_sample_rate(rate);
        }
        self.time_stretch.update_sample_rate(rate);
        self.gain.update_sample_rate(rate);
        self.pre_delay.update_sample_rate(rate);

        if self.sample_rate == rate {
            return false;
        }
        self.sample_rate = rate;
        self.state = self.state.reduce(PipelineEvent::SampleRateChanged);
        true
    }

    fn name(&self) -> &'static str {
        "IRPipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverb_core::{MemorySink, ParameterSnapshot};
    use std::sync::Arc;

    fn decaying(len: usize) -> Vec<f32> {
        (0..len).map(|i| (-(i as f32) / 200.0).exp()).collect()
    }

    fn pipeline(log: &Arc<MemorySink>) -> IrPipeline {
        let mut pipeline = IrPipeline::new(0, log.clone());
        pipeline.update_sample_rate(SampleRate::DVD_QUALITY);
        pipeline
            .load_ir(
                &RawIr::new(SampleRate::DVD_QUALITY, vec![decaying(1_000)]),
                10.0,
            )
            .unwrap();
        pipeline
            .update_params(&ParameterSnapshot::defaults(), "")
            .unwrap();
        pipeline
    }

    #[test]
    fn test_needs_source_before_running() {
        let log = MemorySink::shared();
        let mut pipeline = IrPipeline::new(0, log);
        assert_eq!(pipeline.state(), PipelineState::Dirty);
        assert!(!pipeline.needs_to_run());
        assert!(matches!(
            pipeline.rebuild(),
            Err(ReverbError::IrNotFound(_))
        ));
    }

    #[test]
    fn test_clean_after_rebuild() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        assert!(pipeline.needs_to_run());

        let ir = pipeline.rebuild().unwrap();
        assert_eq!(ir.num_samples(), 1_000);
        assert_eq!(pipeline.state(), PipelineState::Clean);
        assert!(!pipeline.needs_to_run());
        assert_eq!(pipeline.rebuild_count(), 1);

        // Same parameters: nothing to do
        assert!(!pipeline
            .update_params(&ParameterSnapshot::defaults(), "")
            .unwrap());
        assert!(!pipeline.needs_to_run());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        let params = ParameterSnapshot::defaults()
            .with_float("filter01_gain", 3.0)
            .with_float(ids::PREDELAY, 5.0);
        pipeline.update_params(&params, "").unwrap();

        let first = pipeline.rebuild().unwrap();
        let second = pipeline.rebuild().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_param_change_marks_dirty() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        pipeline.rebuild().unwrap();

        let params = ParameterSnapshot::defaults().with_float(ids::IR_GAIN, 0.5);
        assert!(pipeline.update_params(&params, "").unwrap());
        assert!(pipeline.needs_to_run());

        let ir = pipeline.rebuild().unwrap();
        assert!((ir.channel(0).unwrap()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_rate_change_marks_dirty_and_resamples() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        pipeline.rebuild().unwrap();

        assert!(pipeline.update_sample_rate(SampleRate::HIGH_RES_96));
        assert!(pipeline.needs_to_run());
        assert!(!pipeline.update_sample_rate(SampleRate::HIGH_RES_96));

        let ir = pipeline.rebuild().unwrap();
        assert_eq!(ir.num_samples(), 2_000);
    }

    #[test]
    fn test_pre_delay_failure_is_skipped() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        let params = ParameterSnapshot::defaults().with_float(ids::PREDELAY, 5_000.0);
        pipeline.update_params(&params, "").unwrap();

        let ir = pipeline.rebuild().unwrap();
        assert_eq!(ir.num_samples(), 1_000);
        assert!(log.contains(LogLevel::Error, "PreDelay"));
        assert_eq!(pipeline.state(), PipelineState::Clean);
    }

    #[test]
    fn test_pre_delay_prepends_after_resampling() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        let params = ParameterSnapshot::defaults().with_float(ids::PREDELAY, 10.0);
        pipeline.update_params(&params, "").unwrap();
        pipeline.update_sample_rate(SampleRate::HIGH_RES_96);

        let ir = pipeline.rebuild().unwrap();
        assert_eq!(ir.num_samples(), 2_000 + 960);
        assert!(ir.channel(0).unwrap()[..960].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_out_of_range_filter_is_disabled() {
        let log = MemorySink::shared();
        let mut pipeline = pipeline(&log);
        let reference = pipeline.rebuild().unwrap();

        let params = ParameterSnapshot::defaults().with_float("filter02_Q", 0.01);
        pipeline.update_params(&params, "").unwrap();
        let ir = pipeline.rebuild().unwrap();

        assert!(log.contains(LogLevel::Warning, "slot 2"));
        for (a, b) in ir.channel(0).unwrap().iter().zip(reference.channel(0).unwrap()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_missing_parameter_is_an_error() {
        let log = MemorySink::shared();
        let mut pipeline = IrPipeline::new(0, log);
        let mut params = ParameterSnapshot::defaults();
        params.remove(ids::PREDELAY);
        assert!(matches!(
            pipeline.update_params(&params, ""),
            Err(ReverbError::ParameterNotFound(key)) if key == ids::PREDELAY
        ));
    }

    #[test]
    fn test_channel_selection() {
        let log = MemorySink::shared();
        let raw = RawIr::new(
            SampleRate::DVD_QUALITY,
            vec![vec![1.0; 10], vec![2.0; 10]],
        );
        let mut right = IrPipeline::new(1, log.clone());
        right.load_ir(&raw, 10.0).unwrap();
        assert_eq!(right.source_len(), 10);

        let mono = RawIr::new(SampleRate::DVD_QUALITY, vec![vec![1.0; 10]]);
        let mut second = IrPipeline::new(1, log);
        second.load_ir(&mono, 10.0).unwrap();
        assert!(second.has_ir());
    }

    #[test]
    fn test_split_ir_caps_length_and_channels() {
        let raw = RawIr::new(SampleRate::new(1_000), vec![vec![0.1; 5_000]; 3]);
        let channels = split_ir(&raw, 2.5).unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.len() == 2_500));

        let empty = RawIr::new(SampleRate::new(1_000), vec![]);
        assert!(split_ir(&empty, 1.0).is_err());
    }

    #[test]
    fn test_merge_channels() {
        let merged = merge_channels(vec![
            AudioBuffer::mono(vec![1.0; 4]),
            AudioBuffer::mono(vec![2.0; 4]),
        ])
        .unwrap();
        assert_eq!(merged.num_channels(), 2);

        let err = merge_channels(vec![
            AudioBuffer::mono(vec![1.0; 4]),
            AudioBuffer::mono(vec![2.0; 5]),
        ])
        .unwrap_err();
        assert!(matches!(err, ReverbError::ChannelLengthMismatch { .. }));
    }
}
