/// Core error types for the reverb engine
use thiserror::Error;

/// Result type alias using `ReverbError`
pub type Result<T> = std::result::Result<T, ReverbError>;

/// How a failure should be handled by the pipeline that observes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Wiring mistake (missing parameter, wrong channel count). Aborts the call.
    Configuration,
    /// Parameter outside its valid range. The offending stage is disabled.
    Range,
    /// Backend failure inside a rebuild. The stage is skipped for this cycle.
    Recoverable,
    /// Rebuilt channels disagree. The previous IR stays in use.
    Consistency,
    /// IR asset could not be read.
    Io,
}

/// Core error type for the reverb engine
#[derive(Error, Debug)]
pub enum ReverbError {
    /// Parameter key not present in the source
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Parameter present but of a different kind
    #[error("Parameter {key} is not a {expected} parameter")]
    WrongParameterKind { key: String, expected: &'static str },

    /// Parameter holds NaN or infinity
    #[error("Parameter {key} is not finite: {value}")]
    NonFiniteParameter { key: String, value: f32 },

    /// Parameter outside its valid range
    #[error("{parameter} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        parameter: String,
        value: f32,
        min: f32,
        max: f32,
    },

    /// A mono-only stage was handed a multi-channel buffer
    #[error("{stage} expects {expected} channel(s), got {actual}")]
    InvalidChannelCount {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Buffers that must match in shape do not
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Mixer executed without a dry reference for this cycle
    #[error("Mixer executed before a dry buffer was loaded")]
    DryNotLoaded,

    /// Resampling backend failure
    #[error("Resampling error: {0}")]
    Resampling(String),

    /// Rebuilt IR channels have different lengths
    #[error("IR channel lengths differ: {lengths:?}")]
    ChannelLengthMismatch { lengths: Vec<usize> },

    /// Named IR is unknown to every source
    #[error("Impulse response not found: {0}")]
    IrNotFound(String),

    /// IR asset could not be decoded
    #[error("Failed to decode impulse response: {0}")]
    IrDecode(String),

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReverbError {
    /// Create an out-of-range error
    pub fn out_of_range(parameter: impl Into<String>, value: f32, min: f32, max: f32) -> Self {
        Self::OutOfRange {
            parameter: parameter.into(),
            value,
            min,
            max,
        }
    }

    /// Create a channel-count error for a mono-only stage
    pub fn not_mono(stage: &'static str, actual: usize) -> Self {
        Self::InvalidChannelCount {
            stage,
            expected: 1,
            actual,
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParameterNotFound(_)
            | Self::WrongParameterKind { .. }
            | Self::NonFiniteParameter { .. }
            | Self::InvalidChannelCount { .. }
            | Self::InvalidBuffer(_)
            | Self::DryNotLoaded
            | Self::InvalidConfig(_) => ErrorCategory::Configuration,
            Self::OutOfRange { .. } => ErrorCategory::Range,
            Self::Resampling(_) => ErrorCategory::Recoverable,
            Self::ChannelLengthMismatch { .. } => ErrorCategory::Consistency,
            Self::IrNotFound(_) | Self::IrDecode(_) | Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether the failure can be skipped without aborting a rebuild
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Recoverable
    }
}
