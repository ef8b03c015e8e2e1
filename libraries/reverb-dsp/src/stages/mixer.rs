/// Dry/wet mixer
///
/// `output = (1 - wet_ratio) * dry + wet_ratio * wet`, per sample.
///
/// The main pipeline passes the dry buffer explicitly through [`Mixer::blend`].
/// The `Task` path (`load_dry` then `exec`) is kept for standalone use and is
/// guarded: `exec` without a `load_dry` in the same cycle is an error.
use crate::task::{Task, TaskState};
use reverb_core::{AudioBuffer, ParameterSource, Result, ReverbError, SampleRate};

#[derive(Debug, Clone)]
pub struct Mixer {
    wet_ratio: f32,
    dry: AudioBuffer,
    dry_loaded: bool,
    state: TaskState,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    /// Fully wet mixer
    pub fn new() -> Self {
        Self::with_wet_ratio(1.0)
    }

    pub fn with_wet_ratio(wet_ratio: f32) -> Self {
        Self {
            wet_ratio,
            dry: AudioBuffer::default(),
            dry_loaded: false,
            state: TaskState::new(),
        }
    }

    pub fn wet_ratio(&self) -> f32 {
        self.wet_ratio
    }

    /// Set the ratio directly; returns `true` if it changed
    pub fn set_wet_ratio(&mut self, wet_ratio: f32) -> bool {
        self.state.refresh(&mut self.wet_ratio, wet_ratio)
    }

    /// Whether the current ratio lies in `[0, 1]`
    pub fn is_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.wet_ratio)
    }

    /// Fails with a range error when the ratio lies outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.is_in_range() {
            Ok(())
        } else {
            Err(ReverbError::out_of_range("wet ratio", self.wet_ratio, 0.0, 1.0))
        }
    }

    /// Capture the dry reference for the next `exec`
    pub fn load_dry(&mut self, dry: &AudioBuffer) {
        self.dry.copy_from(dry);
        self.dry_loaded = true;
    }

    /// Blend `dry` into `wet` in place
    ///
    /// Both buffers must have the same channel count and length, and the
    /// ratio must lie in `[0, 1]`.
    pub fn blend(&self, dry: &AudioBuffer, wet: &mut AudioBuffer) -> Result<()> {
        self.validate()?;
        if dry.num_channels() != wet.num_channels() || dry.num_samples() != wet.num_samples() {
            return Err(ReverbError::InvalidBuffer(format!(
                "dry is {}x{}, wet is {}x{}",
                dry.num_channels(),
                dry.num_samples(),
                wet.num_channels(),
                wet.num_samples()
            )));
        }

        let wet_gain = self.wet_ratio;
        let dry_gain = 1.0 - wet_gain;
        for (index, dry_samples) in dry.channels().enumerate() {
            if let Some(wet_samples) = wet.channel_mut(index) {
                for (out, &d) in wet_samples.iter_mut().zip(dry_samples) {
                    *out = dry_gain * d + wet_gain * *out;
                }
            }
        }
        Ok(())
    }
}

impl Task for Mixer {
    fn update_params(&mut self, params: &dyn ParameterSource, block_id: &str) -> Result<bool> {
        let wet_ratio = params.float(block_id)?;
        Ok(self.set_wet_ratio(wet_ratio))
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if !self.dry_loaded {
            return Err(ReverbError::DryNotLoaded);
        }
        self.blend(&self.dry, buffer)?;
        self.dry_loaded = false;
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
        "Mixer"
    }
}
