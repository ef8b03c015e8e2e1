//! Time-stretch stage
//!
//! Reconciles the IR's native sample rate with the processing rate by
//! resampling the whole IR offline with rubato. The IR keeps its duration, so
//! its sample count scales by `target / original`.

use crate::task::{Task, TaskState};
use reverb_core::{AudioBuffer, ParameterSource, Result, ReverbError, SampleRate};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResamplerTrait, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

/// Frames fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Upper bound on zero-padded flush calls after the input is exhausted
const MAX_FLUSH_CALLS: usize = 16;

/// Resampling quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingQuality {
    /// Polynomial interpolation
    Fast,
    /// Windowed sinc, 128 taps
    #[default]
    Balanced,
    /// Windowed sinc, 256 taps
    High,
}

impl ResamplingQuality {
    fn sinc_params(self) -> SincInterpolationParameters {
        match self {
            Self::Fast | Self::Balanced => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris,
            },
            Self::High => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.99,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 512,
                window: WindowFunction::BlackmanHarris,
            },
        }
    }
}

/// Resamples a mono IR from its native rate to the processing rate
#[derive(Debug, Clone)]
pub struct TimeStretch {
    original_rate: SampleRate,
    quality: ResamplingQuality,
    state: TaskState,
}

impl Default for TimeStretch {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeStretch {
    /// No original rate yet: pass-through until one is set
    pub fn new() -> Self {
        Self::with_quality(ResamplingQuality::default())
    }

    pub fn with_quality(quality: ResamplingQuality) -> Self {
        Self {
            original_rate: SampleRate::UNSET,
            quality,
            state: TaskState::new(),
        }
    }

    pub fn original_rate(&self) -> SampleRate {
        self.original_rate
    }

    /// Record the IR's native rate; returns `true` if it changed
    pub fn set_original_rate(&mut self, rate: SampleRate) -> bool {
        self.state.refresh(&mut self.original_rate, rate)
    }

    pub fn quality(&self) -> ResamplingQuality {
        self.quality
    }

    /// Whether `exec` would leave the buffer untouched
    pub fn is_pass_through(&self) -> bool {
        let target = self.state.sample_rate();
        self.original_rate.is_unset() || target.is_unset() || self.original_rate == target
    }

    fn resample(&self, input: &[f32]) -> Result<Vec<f32>> {
        let from = u64::from(self.original_rate.as_hz());
        let to = u64::from(self.state.sample_rate().as_hz());
        let ratio = to as f64 / from as f64;
        let expected = (input.len() as u64 * to).div_ceil(from) as usize;

        let output = match self.quality {
            ResamplingQuality::Fast => {
                let resampler =
                    FastFixedIn::<f32>::new(ratio, 2.0, PolynomialDegree::Cubic, CHUNK_SIZE, 1)
                        .map_err(|e| {
                            ReverbError::Resampling(format!("FastFixedIn creation failed: {}", e))
                        })?;
                drive(resampler, input, expected)?
            }
            ResamplingQuality::Balanced | ResamplingQuality::High => {
                let resampler = SincFixedIn::<f32>::new(
                    ratio,
                    2.0,
                    self.quality.sinc_params(),
                    CHUNK_SIZE,
                    1,
                )
                .map_err(|e| {
                    ReverbError::Resampling(format!("SincFixedIn creation failed: {}", e))
                })?;
                drive(resampler, input, expected)?
            }
        };

        tracing::debug!(
            from = self.original_rate.as_hz(),
            to = self.state.sample_rate().as_hz(),
            input = input.len(),
            output = output.len(),
            "IR resampled"
        );
        Ok(output)
    }
}

/// Push a whole buffer through `resampler`, compensating its output delay
fn drive<R: RubatoResamplerTrait<f32>>(
    mut resampler: R,
    input: &[f32],
    expected: usize,
) -> Result<Vec<f32>> {
    let to_error = |e: rubato::ResampleError| ReverbError::Resampling(e.to_string());
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    let mut position = 0;
    while input.len() - position >= resampler.input_frames_next() {
        let frames = resampler.input_frames_next();
        let chunk: [&[f32]; 1] = [&input[position..position + frames]];
        let out = resampler.process(&chunk[..], None).map_err(to_error)?;
        output.extend_from_slice(&out[0]);
        position += frames;
    }

    if position < input.len() {
        let chunk: [&[f32]; 1] = [&input[position..]];
        let out = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(to_error)?;
        output.extend_from_slice(&out[0]);
    }

    for _ in 0..MAX_FLUSH_CALLS {
        if output.len() >= expected + delay {
            break;
        }
        let out = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(to_error)?;
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

impl Task for TimeStretch {
    /// Reads no parameters: the original rate comes from the loaded IR
    fn update_params(&mut self, _params: &dyn ParameterSource, _block_id: &str) -> Result<bool> {
        Ok(false)
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let samples = buffer.mono_samples_mut(self.name())?;
        if !self.is_pass_through() && !samples.is_empty() {
            *samples = self.resample(samples)?;
        }
        self.state.mark_clean();
        Ok(())
    }

    fn needs_to_run(&self) -> bool {
        self.state.must_exec()
    }

    fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        self.state.update_sample_rate(rate)
    }

    fn name(&self) -> &'static str {
        "TimeStretch"
    }
}
