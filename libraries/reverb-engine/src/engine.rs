//! Convolution reverb engine
//!
//! Owns one [`MainPipeline`] per channel and keeps their IRs in step with
//! the control-thread parameters. `process_block` never blocks on the
//! control thread; in background mode it never waits on a rebuild either.

use crate::config::{EngineConfig, RebuildMode};
use crate::control::ControlHandle;
use crate::rebuild::{IrRebuilder, RebuildJob};
use crate::worker::RebuildWorker;
use reverb_core::{
    AudioBuffer, IrSource, LogLevel, ParameterSnapshot, Result, ReverbError, SampleRate,
    SharedLogSink, TracingSink,
};
use reverb_dsp::pipeline::MainPipeline;
use reverb_dsp::Task;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

enum IrRefresh {
    Inline(IrRebuilder),
    Background(RebuildWorker),
}

pub struct ReverbEngine {
    config: EngineConfig,
    controls: ControlHandle,
    params: ParameterSnapshot,
    params_version: u64,
    pipelines: Vec<MainPipeline>,
    scratch: AudioBuffer,
    sample_rate: SampleRate,
    max_block_size: usize,
    partition_size: usize,
    refresh: IrRefresh,
    refresh_pending: bool,
    /// Earlier results were discarded; the next job must produce a set
    force_refresh: bool,
    log: SharedLogSink,
}

impl ReverbEngine {
    /// Create an engine; call [`prepare`](Self::prepare) before processing
    ///
    /// In background mode this spawns the rebuild thread.
    pub fn new(
        config: EngineConfig,
        ir_source: Arc<dyn IrSource>,
        log: SharedLogSink,
    ) -> Result<Self> {
        config.validate()?;

        let controls = ControlHandle::new();
        if let Some(name) = &config.default_ir {
            controls.select_ir(name);
        }

        let rebuilder = IrRebuilder::new(&config, ir_source, log.clone());
        let refresh = match config.rebuild_mode {
            RebuildMode::Inline => IrRefresh::Inline(rebuilder),
            RebuildMode::Background => IrRefresh::Background(RebuildWorker::spawn(
                rebuilder,
                config.rebuild_queue_depth,
                log.clone(),
            )?),
        };

        Ok(Self {
            params: controls.snapshot(),
            params_version: controls.version(),
            controls,
            pipelines: Vec::new(),
            scratch: AudioBuffer::default(),
            sample_rate: SampleRate::UNSET,
            max_block_size: 0,
            partition_size: 0,
            refresh,
            refresh_pending: true,
            force_refresh: false,
            log,
            config,
        })
    }

    /// Create an engine that logs through `tracing`
    pub fn with_tracing(config: EngineConfig, ir_source: Arc<dyn IrSource>) -> Result<Self> {
        let log = TracingSink::shared(config.log_verbosity);
        Self::new(config, ir_source, log)
    }

    /// Configure for a stream
    ///
    /// Existing channels keep their state; channels are added or removed to
    /// match `num_channels`. In inline mode the IR is rebuilt before this
    /// returns.
    pub fn prepare(
        &mut self,
        sample_rate: SampleRate,
        max_block_size: usize,
        num_channels: usize,
    ) -> Result<()> {
        if sample_rate.is_unset() {
            return Err(ReverbError::InvalidConfig(
                "sample rate must be set".to_string(),
            ));
        }
        if max_block_size == 0 || num_channels == 0 {
            return Err(ReverbError::InvalidConfig(format!(
                "invalid stream layout: {} channels, block size {}",
                num_channels, max_block_size
            )));
        }

        self.refresh_params();
        let partition_size = self.config.partition_for(max_block_size);
        let layout_changed = partition_size != self.partition_size
            || sample_rate != self.sample_rate
            || num_channels != self.pipelines.len();

        self.pipelines.truncate(num_channels);
        for pipeline in &mut self.pipelines {
            if pipeline.partition_size() != partition_size {
                pipeline.prepare(partition_size);
            }
            pipeline.update_sample_rate(sample_rate);
        }
        for channel in self.pipelines.len()..num_channels {
            let mut pipeline = MainPipeline::new(partition_size);
            pipeline.update_sample_rate(sample_rate);
            if let Err(e) = pipeline.update_params(&self.params, "") {
                self.log.log(
                    LogLevel::Error,
                    &format!("Channel {}: invalid parameters: {}", channel, e),
                );
            }
            self.pipelines.push(pipeline);
        }

        self.scratch = AudioBuffer::with_capacity(max_block_size);
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.partition_size = partition_size;

        if layout_changed {
            self.refresh_pending = true;
            self.force_refresh = true;
            if let IrRefresh::Background(worker) = &mut self.refresh {
                worker.invalidate();
            }
        }

        self.log.log(
            LogLevel::Info,
            &format!(
                "Prepared {} channels @ {} Hz, block {} (partition {})",
                num_channels,
                sample_rate.as_hz(),
                max_block_size,
                partition_size
            ),
        );

        self.refresh_ir();
        Ok(())
    }

    /// Process one block in place
    pub fn process_block(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(ReverbError::InvalidConfig(
                "engine is not prepared".to_string(),
            ));
        }

        let refreshed = self.refresh_params();

        for (channel, pipeline) in self.pipelines.iter_mut().enumerate() {
            if let Err(e) = pipeline.update_params(&self.params, "") {
                // Reported once per change rather than every block
                if refreshed {
                    self.log.log(
                        LogLevel::Error,
                        &format!("Channel {}: invalid parameters: {}", channel, e),
                    );
                }
            }
        }

        self.install_ready();
        self.refresh_ir();

        let processed = self.pipelines.len().min(buffer.num_channels());
        for channel in 0..processed {
            let Some(samples) = buffer.channel_mut(channel) else {
                continue;
            };
            self.scratch.load_mono(samples);

            let pipeline = &mut self.pipelines[channel];
            let scratch = &mut self.scratch;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.exec(scratch)));

            match outcome {
                Ok(Ok(())) => match scratch.channel(0) {
                    Some(out) if out.len() == samples.len() => samples.copy_from_slice(out),
                    _ => samples.fill(0.0),
                },
                Ok(Err(e)) => {
                    samples.fill(0.0);
                    self.log.log(
                        LogLevel::Error,
                        &format!("Channel {}: processing failed: {}", channel, e),
                    );
                }
                Err(_) => {
                    samples.fill(0.0);
                    pipeline.reset();
                    self.log.log(
                        LogLevel::Fatal,
                        &format!("Channel {}: panic while processing, block silenced", channel),
                    );
                }
            }
        }

        for channel in self.pipelines.len()..buffer.num_channels() {
            if let Some(samples) = buffer.channel_mut(channel) {
                samples.fill(0.0);
            }
        }

        Ok(())
    }

    /// Copy the control values if they changed; returns true if they did
    fn refresh_params(&mut self) -> bool {
        match self.controls.try_snapshot(self.params_version) {
            Some((version, params)) => {
                self.params_version = version;
                self.params = params;
                self.refresh_pending = true;
                true
            }
            None => false,
        }
    }

    /// Install a finished background set, if one is waiting
    fn install_ready(&mut self) {
        let IrRefresh::Background(worker) = &mut self.refresh else {
            return;
        };
        let Some(mut set) = worker.poll() else {
            return;
        };
        if set.len() == self.pipelines.len() {
            set.install_into(&mut self.pipelines);
        } else {
            self.refresh_pending = true;
            self.force_refresh = true;
        }
        worker.retire(set);
    }

    /// Rebuild inline, or hand the job to the worker
    fn refresh_ir(&mut self) {
        if !self.refresh_pending || self.pipelines.is_empty() {
            return;
        }
        let job = RebuildJob {
            params: self.params.clone(),
            sample_rate: self.sample_rate,
            num_channels: self.pipelines.len(),
            partition_size: self.partition_size,
            force: self.force_refresh,
        };

        match &mut self.refresh {
            IrRefresh::Inline(rebuilder) => {
                self.refresh_pending = false;
                self.force_refresh = false;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| rebuilder.refresh(&job)));
                match outcome {
                    Ok(Ok(Some(convolvers))) => {
                        for (pipeline, convolver) in self.pipelines.iter_mut().zip(convolvers) {
                            pipeline.install(convolver);
                        }
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => self.log.log(
                        LogLevel::Error,
                        &format!("IR refresh failed, keeping previous IR: {}", e),
                    ),
                    Err(_) => self
                        .log
                        .log(LogLevel::Fatal, "IR rebuild panicked, keeping previous IR"),
                }
            }
            IrRefresh::Background(worker) => {
                if worker.request(job) {
                    self.refresh_pending = false;
                    self.force_refresh = false;
                }
            }
        }
    }

    /// Handle for writing parameters from other threads
    pub fn controls(&self) -> ControlHandle {
        self.controls.clone()
    }

    /// Whether every channel has an IR installed
    pub fn has_ir(&self) -> bool {
        !self.pipelines.is_empty() && self.pipelines.iter().all(MainPipeline::has_ir)
    }

    pub fn num_channels(&self) -> usize {
        self.pipelines.len()
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Convolution partition size in use
    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Length of the installed IR in samples, 0 if none
    pub fn ir_len(&self) -> usize {
        self.pipelines.first().map_or(0, MainPipeline::ir_len)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Added latency in samples
    ///
    /// Always 0: the first partition is convolved within the block.
    pub fn latency_samples(&self) -> usize {
        0
    }
}
