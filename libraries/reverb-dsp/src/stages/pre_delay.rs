/// Pre-delay stage: prepends silence to an IR
use crate::task::{Task, TaskState};
use reverb_core::params::limits::PREDELAY_MAX_MS;
use reverb_core::{AudioBuffer, ParameterSource, Result, ReverbError, SampleRate};

/// Prepends `ceil(sample_rate * delay_ms / 1000)` zeros
///
/// The output always lives in a freshly allocated buffer that replaces the
/// input; a failed call leaves the input untouched.
#[derive(Debug, Clone)]
pub struct PreDelay {
    delay_ms: f32,
    state: TaskState,
}

impl Default for PreDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl PreDelay {
    /// No delay
    pub fn new() -> Self {
        Self {
            delay_ms: 0.0,
            state: TaskState::new(),
        }
    }

    pub fn delay_ms(&self) -> f32 {
        self.delay_ms
    }

    /// Set the delay directly; returns `true` if it changed
    pub fn set_delay_ms(&mut self, delay_ms: f32) -> bool {
        self.state.refresh(&mut self.delay_ms, delay_ms)
    }

    /// Zeros to prepend at the current sample rate
    pub fn num_samples_to_add(&self) -> usize {
        let samples = self.state.sample_rate().as_f64() * f64::from(self.delay_ms) / 1000.0;
        samples.ceil() as usize
    }
}

impl Task for PreDelay {
    fn update_params(&mut self, params: &dyn ParameterSource, block_id: &str) -> Result<bool> {
        let delay_ms = params.float(block_id)?;
        Ok(self.set_delay_ms(delay_ms))
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if !(0.0..=PREDELAY_MAX_MS).contains(&self.delay_ms) {
            return Err(ReverbError::out_of_range(
                "pre-delay (ms)",
                self.delay_ms,
                0.0,
                PREDELAY_MAX_MS,
            ));
        }
        let samples = buffer.mono_samples_mut(self.name())?;

        let added = self.num_samples_to_add();
        if added > 0 {
            let mut delayed = vec![0.0; added + samples.len()];
            delayed[added..].copy_from_slice(samples);
            *samples = delayed;
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
        "PreDelay"
    }
}
