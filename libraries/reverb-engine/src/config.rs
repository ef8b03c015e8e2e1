/// Engine configuration
use reverb_core::{LogLevel, Result, ReverbError};
use reverb_dsp::ResamplingQuality;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where IR rebuilds run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// Rebuild synchronously inside `process_block`
    #[default]
    Inline,
    /// Rebuild on a worker thread and install at a block boundary
    Background,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rebuild_mode: RebuildMode,

    /// Decoded IRs are truncated to this many seconds
    #[serde(default = "default_max_ir_seconds")]
    pub max_ir_seconds: f32,

    /// Convolution partition size; 0 derives it from the block size
    #[serde(default)]
    pub partition_size: usize,

    #[serde(default)]
    pub resampling_quality: ResamplingQuality,

    #[serde(default = "default_log_verbosity")]
    pub log_verbosity: LogLevel,

    /// IR selected at construction
    #[serde(default)]
    pub default_ir: Option<String>,

    /// Capacity of the background request channel
    #[serde(default = "default_rebuild_queue_depth")]
    pub rebuild_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rebuild_mode: RebuildMode::default(),
            max_ir_seconds: default_max_ir_seconds(),
            partition_size: 0,
            resampling_quality: ResamplingQuality::default(),
            log_verbosity: default_log_verbosity(),
            default_ir: None,
            rebuild_queue_depth: default_rebuild_queue_depth(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ReverbError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ReverbError::InvalidConfig(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.max_ir_seconds.is_finite() || self.max_ir_seconds <= 0.0 {
            return Err(ReverbError::InvalidConfig(format!(
                "max_ir_seconds must be positive, got {}",
                self.max_ir_seconds
            )));
        }

        if self.partition_size != 0 && !self.partition_size.is_power_of_two() {
            return Err(ReverbError::InvalidConfig(format!(
                "partition_size must be 0 or a power of two, got {}",
                self.partition_size
            )));
        }

        if self.rebuild_queue_depth == 0 {
            return Err(ReverbError::InvalidConfig(
                "rebuild_queue_depth must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Partition size used for blocks of up to `max_block_size` samples
    pub fn partition_for(&self, max_block_size: usize) -> usize {
        let requested = if self.partition_size == 0 {
            max_block_size
        } else {
            self.partition_size
        };
        requested
            .max(reverb_dsp::stages::MIN_PARTITION_SIZE)
            .next_power_of_two()
    }
}

// Default values
fn default_max_ir_seconds() -> f32 {
    10.0
}

fn default_log_verbosity() -> LogLevel {
    LogLevel::Info
}

fn default_rebuild_queue_depth() -> usize {
    4
}
