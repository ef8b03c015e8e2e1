/// Real-time pipeline (one per channel)
///
/// Runs on every block: keep a dry copy, convolve, blend dry and wet, apply
/// the output gain. Only its IR is refreshed conditionally.
///
/// A wet ratio outside `[0, 1]` bypasses the mixer (the wet signal passes
/// unchanged) until it is corrected. `update_params` reports it once, on the
/// call that brought the bad value in.
use crate::stages::{Convolution, Gain, Mixer, PartitionedConvolver};
use crate::task::Task;
use reverb_core::params::ids;
use reverb_core::{AudioBuffer, ParameterSource, Result, SampleRate};

pub struct MainPipeline {
    convolution: Convolution,
    mixer: Mixer,
    gain: Gain,
    dry: AudioBuffer,
    sample_rate: SampleRate,
}

impl MainPipeline {
    /// Pipeline sized for blocks of up to `max_block_size` samples
    pub fn new(max_block_size: usize) -> Self {
        Self {
            convolution: Convolution::new(max_block_size),
            mixer: Mixer::new(),
            gain: Gain::new(),
            dry: AudioBuffer::with_capacity(max_block_size),
            sample_rate: SampleRate::UNSET,
        }
    }

    /// Resize scratch space for a new maximum block size
    pub fn prepare(&mut self, max_block_size: usize) {
        self.convolution.set_partition_size(max_block_size);
        self.dry = AudioBuffer::with_capacity(max_block_size);
    }

    /// Move a freshly rebuilt mono IR into the convolution stage
    pub fn load_ir(&mut self, ir: AudioBuffer) -> Result<()> {
        self.convolution.load_ir(ir)
    }

    /// Swap in a convolver prepared elsewhere, returning the previous one
    pub fn install(&mut self, convolver: PartitionedConvolver) -> Option<PartitionedConvolver> {
        self.convolution.install(convolver)
    }

    pub fn has_ir(&self) -> bool {
        self.convolution.has_ir()
    }

    pub fn ir_len(&self) -> usize {
        self.convolution.ir_len()
    }

    pub fn partition_size(&self) -> usize {
        self.convolution.partition_size()
    }

    /// Clear convolution history
    pub fn reset(&mut self) {
        self.convolution.reset();
    }
}

impl Task for MainPipeline {
    /// Reads the wet ratio and output gain; `block_id` is unused
    fn update_params(&mut self, params: &dyn ParameterSource, _block_id: &str) -> Result<bool> {
        let mut changed = self.convolution.update_params(params, "")?;
        let mixer_changed = self.mixer.update_params(params, ids::WET_RATIO)?;
        changed |= self.gain.update_params(params, ids::OUT_GAIN)?;
        if mixer_changed {
            self.mixer.validate()?;
        }
        Ok(changed || mixer_changed)
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.dry.copy_from(buffer);
        self.convolution.exec(buffer)?;
        if self.mixer.is_in_range() {
            self.mixer.blend(&self.dry, buffer)?;
        }
        self.gain.exec(buffer)
    }

    /// Always true: the live signal must be processed every block
    fn needs_to_run(&self) -> bool {
        true
    }

    fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        self.convolution.update_sample_rate(rate);
        self.mixer.update_sample_rate(rate);
        self.gain.update_sample_rate(rate);
        if self.sample_rate == rate {
            return false;
        }
        self.sample_rate = rate;
        true
    }

    fn name(&self) -> &'static str {
        "MainPipeline"
    }
}
