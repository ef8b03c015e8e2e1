//! Multi-channel IR rebuild
//!
//! [`IrRebuilder`] owns one [`IrPipeline`] per engine channel, resolves the
//! selected IR through an [`IrSource`], and turns the merged result into one
//! [`PartitionedConvolver`] per channel. The engine uses it directly in inline
//! mode; in background mode the worker thread owns it.

use crate::config::EngineConfig;
use reverb_core::params::ids;
use reverb_core::{
    AudioBuffer, IrSource, LogLevel, ParameterSnapshot, ParameterSource, RawIr, Result,
    ReverbError, SampleRate, SharedLogSink,
};
use reverb_dsp::pipeline::{merge_channels, IrPipeline};
use reverb_dsp::{PartitionedConvolver, ResamplingQuality, Task};
use std::sync::Arc;
use std::time::Instant;

/// Everything a rebuild depends on, copied at one block boundary
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildJob {
    pub params: ParameterSnapshot,
    pub sample_rate: SampleRate,
    pub num_channels: usize,
    pub partition_size: usize,
    /// Produce a set even if nothing changed since the last refresh
    pub force: bool,
}

/// Per-channel IR pipelines plus the IR currently loaded into them
pub struct IrRebuilder {
    pipelines: Vec<IrPipeline>,
    source: Arc<dyn IrSource>,
    raw: Option<RawIr>,
    current_ir: Option<String>,
    /// Last requested name, loaded or not; avoids retrying a failed load every job
    requested_ir: Option<String>,
    prepared: Option<AudioBuffer>,
    params: ParameterSnapshot,
    sample_rate: SampleRate,
    partition_size: usize,
    max_ir_seconds: f32,
    quality: ResamplingQuality,
    log: SharedLogSink,
}

impl IrRebuilder {
    pub fn new(config: &EngineConfig, source: Arc<dyn IrSource>, log: SharedLogSink) -> Self {
        Self {
            pipelines: Vec::new(),
            source,
            raw: None,
            current_ir: None,
            requested_ir: None,
            prepared: None,
            params: ParameterSnapshot::defaults(),
            sample_rate: SampleRate::UNSET,
            partition_size: 0,
            max_ir_seconds: config.max_ir_seconds,
            quality: config.resampling_quality,
            log,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.pipelines.len()
    }

    /// Name of the IR loaded into the pipelines
    pub fn current_ir(&self) -> Option<&str> {
        self.current_ir.as_deref()
    }

    /// Most recent successfully merged IR
    pub fn prepared(&self) -> Option<&AudioBuffer> {
        self.prepared.as_ref()
    }

    /// Pipeline for `channel`
    pub fn pipeline(&self, channel: usize) -> Option<&IrPipeline> {
        self.pipelines.get(channel)
    }

    /// Grow or shrink to `num_channels` pipelines
    ///
    /// Surviving pipelines keep their state; new ones are primed with the
    /// current sample rate, IR and parameters.
    pub fn resize(&mut self, num_channels: usize) {
        if num_channels <= self.pipelines.len() {
            self.pipelines.truncate(num_channels);
            return;
        }
        for channel in self.pipelines.len()..num_channels {
            let mut pipeline = IrPipeline::with_quality(channel, self.quality, self.log.clone());
            pipeline.update_sample_rate(self.sample_rate);
            if let Some(raw) = &self.raw {
                if let Err(e) = pipeline.load_ir(raw, self.max_ir_seconds) {
                    self.log.log(
                        LogLevel::Error,
                        &format!("Channel {}: failed to load IR: {}", channel, e),
                    );
                }
            }
            if let Err(e) = pipeline.update_params(&self.params, "") {
                self.log.log(
                    LogLevel::Error,
                    &format!("Channel {}: invalid parameters: {}", channel, e),
                );
            }
            self.pipelines.push(pipeline);
        }
    }

    /// Propagate the processing rate; returns true if it changed
    pub fn set_sample_rate(&mut self, rate: SampleRate) -> bool {
        let changed = self.sample_rate != rate;
        self.sample_rate = rate;
        for pipeline in &mut self.pipelines {
            pipeline.update_sample_rate(rate);
        }
        changed
    }

    /// Resolve `name` and load it into every pipeline
    pub fn load(&mut self, name: &str) -> Result<()> {
        self.requested_ir = Some(name.to_string());
        let raw = self.source.load_capped(name, self.max_ir_seconds)?;
        for pipeline in &mut self.pipelines {
            pipeline.load_ir(&raw, self.max_ir_seconds)?;
        }
        self.log.log(
            LogLevel::Info,
            &format!(
                "Loaded IR '{}' ({} channels, {} samples @ {} Hz)",
                name,
                raw.num_channels(),
                raw.num_samples(),
                raw.sample_rate.as_hz()
            ),
        );
        self.raw = Some(raw);
        self.current_ir = Some(name.to_string());
        Ok(())
    }

    /// Apply a parameter snapshot, loading a newly selected IR
    ///
    /// Returns true if any pipeline parameter changed.
    pub fn sync(&mut self, params: &ParameterSnapshot) -> Result<bool> {
        let choice = match params.choice(ids::IR_CHOICE) {
            Ok(choice) => choice,
            Err(ReverbError::ParameterNotFound(_)) => "",
            Err(e) => return Err(e),
        };
        if !choice.is_empty() && self.requested_ir.as_deref() != Some(choice) {
            if let Err(e) = self.load(choice) {
                self.log.log(
                    LogLevel::Error,
                    &format!("Failed to load IR '{}': {}", choice, e),
                );
            }
        }

        let mut changed = false;
        for pipeline in &mut self.pipelines {
            changed |= pipeline.update_params(params, "")?;
        }
        if self.params != *params {
            self.params = params.clone();
        }
        Ok(changed)
    }

    /// Whether any pipeline has pending changes and a loaded IR
    pub fn needs_to_run(&self) -> bool {
        self.pipelines.iter().any(Task::needs_to_run)
    }

    /// Rebuild every channel and merge the results
    ///
    /// On failure the previously prepared IR is kept.
    pub fn rebuild(&mut self) -> Result<&AudioBuffer> {
        let started = Instant::now();
        let mut channels = Vec::with_capacity(self.pipelines.len());
        for pipeline in &mut self.pipelines {
            channels.push(pipeline.rebuild()?);
        }
        let merged = merge_channels(channels)?;
        tracing::debug!(
            channels = merged.num_channels(),
            samples = merged.num_samples(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "IR set rebuilt"
        );
        Ok(self.prepared.insert(merged))
    }

    /// Bring the pipelines in line with `job` and rebuild if anything changed
    ///
    /// Returns the convolvers to install, or `None` when the installed ones
    /// are still current. A forced job re-partitions the prepared IR when
    /// nothing else changed, since the set built for an earlier job may
    /// have been discarded by the engine.
    pub fn refresh(&mut self, job: &RebuildJob) -> Result<Option<Vec<PartitionedConvolver>>> {
        self.set_sample_rate(job.sample_rate);
        self.resize(job.num_channels);
        self.sync(&job.params)?;

        let repartition = self.partition_size != job.partition_size;
        self.partition_size = job.partition_size;

        let ir = if self.needs_to_run() {
            self.rebuild()?
        } else {
            match &self.prepared {
                Some(ir) if repartition || job.force => ir,
                _ => return Ok(None),
            }
        };
        partition(ir, job.partition_size).map(Some)
    }
}

/// Split a merged IR into one convolver per channel
pub fn partition(ir: &AudioBuffer, partition_size: usize) -> Result<Vec<PartitionedConvolver>> {
    ir.channels()
        .map(|samples| PartitionedConvolver::new(samples, partition_size))
        .collect()
}
