//! Convolution stage
//!
//! Uniformly partitioned FFT convolution with zero latency: every input sample
//! produces its output in the same call, whatever the block length. Tail
//! samples carry across calls through a frequency-domain delay line and a
//! time-domain overlap buffer.
//!
//! Preparing a convolver (partitioning and transforming the IR) allocates and
//! is expensive, so [`PartitionedConvolver::new`] can run off the audio thread
//! and the result is swapped in with [`Convolution::install`].
//!
//! # Example
//!
//! ```rust
//! use reverb_core::AudioBuffer;
//! use reverb_dsp::{Convolution, Task};
//!
//! let mut convolution = Convolution::new(256);
//! convolution.load_ir(AudioBuffer::mono(vec![0.5, 0.25])).unwrap();
//!
//! let mut block = AudioBuffer::mono(vec![1.0, 0.0, 0.0, 0.0]);
//! convolution.exec(&mut block).unwrap();
//! assert!((block.channel(0).unwrap()[1] - 0.25).abs() < 1e-5);
//! ```

use crate::task::{Task, TaskState};
use reverb_core::{AudioBuffer, ParameterSource, Result, ReverbError, SampleRate};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// Smallest partition used when none is requested
pub const MIN_PARTITION_SIZE: usize = 64;

/// Streaming convolver for one mono IR
pub struct PartitionedConvolver {
    ir_len: usize,
    block_size: usize,
    segment_count: usize,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    /// Transformed IR partitions
    ir_segments: Vec<Vec<Complex<f32>>>,
    /// Transformed input history (ring, indexed by `current`)
    input_segments: Vec<Vec<Complex<f32>>>,
    /// Sum of products for every partition but the newest
    pre_multiplied: Vec<Complex<f32>>,
    conv: Vec<Complex<f32>>,
    overlap: Vec<f32>,
    input_buffer: Vec<f32>,
    input_fill: usize,
    current: usize,
    scale: f32,
}

impl PartitionedConvolver {
    /// Partition and transform `ir`
    ///
    /// `block_size` is rounded up to a power of two. Fails on an empty IR.
    pub fn new(ir: &[f32], block_size: usize) -> Result<Self> {
        if ir.is_empty() {
            return Err(ReverbError::InvalidBuffer(
                "impulse response is empty".to_string(),
            ));
        }
        let block_size = block_size.max(1).next_power_of_two();
        let segment_size = 2 * block_size;
        let segment_count = ir.len().div_ceil(block_size);

        let mut planner = FftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(segment_size);
        let fft_inverse = planner.plan_fft_inverse(segment_size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let mut fft_scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let mut ir_segments = Vec::with_capacity(segment_count);
        for part in ir.chunks(block_size) {
            let mut segment = vec![Complex::new(0.0, 0.0); segment_size];
            for (dst, &src) in segment.iter_mut().zip(part) {
                dst.re = src;
            }
            fft_forward.process_with_scratch(&mut segment, &mut fft_scratch);
            ir_segments.push(segment);
        }

        Ok(Self {
            ir_len: ir.len(),
            block_size,
            segment_count,
            fft_forward,
            fft_inverse,
            fft_scratch,
            ir_segments,
            input_segments: vec![vec![Complex::new(0.0, 0.0); segment_size]; segment_count],
            pre_multiplied: vec![Complex::new(0.0, 0.0); segment_size],
            conv: vec![Complex::new(0.0, 0.0); segment_size],
            overlap: vec![0.0; block_size],
            input_buffer: vec![0.0; block_size],
            input_fill: 0,
            current: 0,
            scale: 1.0 / segment_size as f32,
        })
    }

    /// IR length in samples
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Partition size in samples
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Clear the signal history, keeping the IR
    pub fn reset(&mut self) {
        for segment in &mut self.input_segments {
            segment.fill(Complex::new(0.0, 0.0));
        }
        self.pre_multiplied.fill(Complex::new(0.0, 0.0));
        self.overlap.fill(0.0);
        self.input_buffer.fill(0.0);
        self.input_fill = 0;
        self.current = 0;
    }

    /// Convolve `samples` in place, continuing the stream from the last call
    ///
    /// # Real-Time Safety
    /// - No allocations
    pub fn process(&mut self, samples: &mut [f32]) {
        let mut processed = 0;
        while processed < samples.len() {
            let was_empty = self.input_fill == 0;
            let offset = self.input_fill;
            let count = (samples.len() - processed).min(self.block_size - offset);

            self.input_buffer[offset..offset + count]
                .copy_from_slice(&samples[processed..processed + count]);

            // Transform the (partially filled) newest partition
            let newest = &mut self.input_segments[self.current];
            for (dst, &src) in newest.iter_mut().zip(&self.input_buffer) {
                *dst = Complex::new(src, 0.0);
            }
            newest[self.block_size..].fill(Complex::new(0.0, 0.0));
            self.fft_forward
                .process_with_scratch(newest, &mut self.fft_scratch);

            // Older partitions only change when a new one starts
            if was_empty {
                self.pre_multiplied.fill(Complex::new(0.0, 0.0));
                for i in 1..self.segment_count {
                    let audio = &self.input_segments[(self.current + i) % self.segment_count];
                    for ((acc, &a), &h) in self
                        .pre_multiplied
                        .iter_mut()
                        .zip(audio)
                        .zip(&self.ir_segments[i])
                    {
                        *acc += a * h;
                    }
                }
            }

            let newest = &self.input_segments[self.current];
            for (((out, &pre), &a), &h) in self
                .conv
                .iter_mut()
                .zip(&self.pre_multiplied)
                .zip(newest)
                .zip(&self.ir_segments[0])
            {
                *out = pre + a * h;
            }
            self.fft_inverse
                .process_with_scratch(&mut self.conv, &mut self.fft_scratch);

            for k in 0..count {
                samples[processed + k] =
                    self.conv[offset + k].re * self.scale + self.overlap[offset + k];
            }

            self.input_fill += count;
            if self.input_fill == self.block_size {
                self.input_buffer.fill(0.0);
                self.input_fill = 0;
                for (dst, src) in self.overlap.iter_mut().zip(&self.conv[self.block_size..]) {
                    *dst = src.re * self.scale;
                }
                self.current = if self.current > 0 {
                    self.current - 1
                } else {
                    self.segment_count - 1
                };
            }
            processed += count;
        }
    }
}

impl fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("ir_len", &self.ir_len)
            .field("block_size", &self.block_size)
            .field("segment_count", &self.segment_count)
            .finish_non_exhaustive()
    }
}

/// Convolution stage
///
/// Passes audio through unchanged until the first IR is loaded.
#[derive(Debug)]
pub struct Convolution {
    convolver: Option<PartitionedConvolver>,
    partition_size: usize,
    state: TaskState,
}

impl Convolution {
    /// Create a stage that partitions IRs into `partition_size` blocks
    pub fn new(partition_size: usize) -> Self {
        Self {
            convolver: None,
            partition_size: partition_size.max(MIN_PARTITION_SIZE).next_power_of_two(),
            state: TaskState::new(),
        }
    }

    /// Partition size used by `load_ir`
    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Change the partition size for future `load_ir` calls
    pub fn set_partition_size(&mut self, partition_size: usize) {
        self.partition_size = partition_size.max(MIN_PARTITION_SIZE).next_power_of_two();
    }

    /// Take ownership of a mono IR and prepare it
    pub fn load_ir(&mut self, ir: AudioBuffer) -> Result<()> {
        let samples = ir.mono_samples(self.name())?;
        let convolver = PartitionedConvolver::new(samples, self.partition_size)?;
        self.install(convolver);
        Ok(())
    }

    /// Swap in a prepared convolver, returning the previous one
    pub fn install(&mut self, convolver: PartitionedConvolver) -> Option<PartitionedConvolver> {
        self.state.mark_dirty();
        self.convolver.replace(convolver)
    }

    pub fn has_ir(&self) -> bool {
        self.convolver.is_some()
    }

    /// Length of the loaded IR, 0 if none
    pub fn ir_len(&self) -> usize {
        self.convolver.as_ref().map_or(0, PartitionedConvolver::ir_len)
    }

    /// Clear the signal history
    pub fn reset(&mut self) {
        if let Some(convolver) = &mut self.convolver {
            convolver.reset();
        }
    }
}

impl Task for Convolution {
    fn update_params(&mut self, _params: &dyn ParameterSource, _block_id: &str) -> Result<bool> {
        Ok(false)
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let samples = buffer.mono_samples_mut(self.name())?;
        if let Some(convolver) = &mut self.convolver {
            convolver.process(samples);
        }
        self.state.mark_clean();
        Ok(())
    }

    fn needs_to_run(&self) -> bool {
        true
    }

    fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        self.state.update_sample_rate(rate)
    }

    fn name(&self) -> &'static str {
        "Convolution"
    }
}
