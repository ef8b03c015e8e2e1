/// Core traits for the reverb engine
use crate::error::Result;
use crate::types::RawIr;

/// Source of impulse response assets
///
/// Implementations resolve a file path or a named in-memory resource into
/// decoded samples.
pub trait IrSource: Send + Sync {
    /// Load and decode the IR identified by `name`
    fn load(&self, name: &str) -> Result<RawIr>;

    /// Load and truncate every channel to at most `max_seconds`
    fn load_capped(&self, name: &str, max_seconds: f32) -> Result<RawIr> {
        let mut ir = self.load(name)?;
        let max_samples = (max_seconds.max(0.0) * ir.sample_rate.as_hz() as f32) as usize;
        for channel in &mut ir.channels {
            channel.truncate(max_samples);
        }
        Ok(ir)
    }
}
