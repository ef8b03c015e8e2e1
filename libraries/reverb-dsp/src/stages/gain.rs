/// Scalar gain stage
///
/// Used twice: as the IR gain in the IR pipeline and as the output gain in
/// the main pipeline. Only the parameter key differs.
use crate::task::{Task, TaskState};
use reverb_core::{AudioBuffer, ParameterSource, Result, SampleRate};

/// Multiplies every sample by a cached factor
#[derive(Debug, Clone)]
pub struct Gain {
    gain: f32,
    state: TaskState,
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Gain {
    /// Unity gain
    pub fn new() -> Self {
        Self::with_gain(1.0)
    }

    pub fn with_gain(gain: f32) -> Self {
        Self {
            gain,
            state: TaskState::new(),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the factor directly; returns `true` if it changed
    pub fn set_gain(&mut self, gain: f32) -> bool {
        self.state.refresh(&mut self.gain, gain)
    }
}

impl Task for Gain {
    fn update_params(&mut self, params: &dyn ParameterSource, block_id: &str) -> Result<bool> {
        let gain = params.float(block_id)?;
        Ok(self.set_gain(gain))
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let samples = buffer.mono_samples_mut(self.name())?;
        for sample in samples.iter_mut() {
            *sample *= self.gain;
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
        "Gain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverb_core::params::ids;
    use reverb_core::{ParameterSnapshot, ReverbError};

    #[test]
    fn test_constant_buffer_scaled() {
        let mut gain = Gain::with_gain(2.0);
        let mut buffer = AudioBuffer::mono(vec![1.0; 512]);
        gain.exec(&mut buffer).unwrap();
        assert!(buffer.channel(0).unwrap().iter().all(|&s| (s - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_update_params_uses_block_id_as_key() {
        let mut gain = Gain::new();
        let params = ParameterSnapshot::defaults().with_float(ids::OUT_GAIN, 0.5);

        assert!(gain.update_params(&params, ids::OUT_GAIN).unwrap());
        assert_eq!(gain.gain(), 0.5);
        assert!(!gain.update_params(&params, ids::OUT_GAIN).unwrap());

        assert!(gain.update_params(&params, ids::IR_GAIN).unwrap());
        assert_eq!(gain.gain(), 1.0);
    }

    #[test]
    fn test_rejects_stereo() {
        let mut gain = Gain::new();
        let mut stereo = AudioBuffer::new(2, 4);
        assert!(matches!(
            gain.exec(&mut stereo),
            Err(ReverbError::InvalidChannelCount { actual: 2, .. })
        ));
    }
}
