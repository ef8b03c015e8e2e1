//! Processing stages
//!
//! Every stage implements [`Task`](crate::Task). Stages operate on
//! single-channel buffers and reject anything else.

mod convolution;
mod filter;
mod gain;
mod mixer;
mod pre_delay;
mod time_stretch;

pub use convolution::{Convolution, PartitionedConvolver, MIN_PARTITION_SIZE};
pub use filter::{BiquadCoefficients, Filter, FilterKind, FilterParams};
pub use gain::Gain;
pub use mixer::Mixer;
pub use pre_delay::PreDelay;
pub use time_stretch::{ResamplingQuality, TimeStretch};
