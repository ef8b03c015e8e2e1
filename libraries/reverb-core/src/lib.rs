//! Reverb Core
//!
//! Shared types, traits, and error handling for the convolution reverb engine.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Audio Types**: `SampleRate`, planar `AudioBuffer`, decoded `RawIr`
//! - **Parameters**: `ParameterSource`, `ParameterSnapshot` and the parameter registry
//! - **Logging**: the injected `LogSink` with `Fatal`..`App` severities
//! - **Error Handling**: Unified `ReverbError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use reverb_core::params::{ids, ParameterSnapshot, ParameterSource};
//! use reverb_core::types::{AudioBuffer, SampleRate};
//!
//! let params = ParameterSnapshot::defaults();
//! assert_eq!(params.float(ids::WET_RATIO).unwrap(), 0.5);
//!
//! let buffer = AudioBuffer::new(2, 512);
//! assert_eq!(buffer.num_channels(), 2);
//! assert_eq!(SampleRate::DVD_QUALITY.as_hz(), 48_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod log;
pub mod params;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorCategory, Result, ReverbError};
pub use log::{LogLevel, LogSink, MemorySink, SharedLogSink, TracingSink};
pub use params::{ParamValue, ParameterSnapshot, ParameterSource, ParameterSpec};
pub use traits::IrSource;
pub use types::{AudioBuffer, RawIr, SampleRate};
