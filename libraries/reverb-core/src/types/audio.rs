/// Audio-related types
use crate::error::{Result, ReverbError};
use serde::{Deserialize, Serialize};

/// Sample rate in Hz
///
/// A rate of zero means "not yet known" (e.g. no IR loaded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// Common sample rates
    pub const CD_QUALITY: Self = Self(44_100);
    pub const DVD_QUALITY: Self = Self(48_000);
    pub const HIGH_RES_88: Self = Self(88_200);
    pub const HIGH_RES_96: Self = Self(96_000);

    /// Unknown rate
    pub const UNSET: Self = Self(0);

    /// Create a new sample rate
    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    /// Get the sample rate as Hz
    pub fn as_hz(&self) -> u32 {
        self.0
    }

    /// Get the sample rate as f64
    pub fn as_f64(&self) -> f64 {
        f64::from(self.0)
    }

    /// Whether the rate is still unknown
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Nyquist frequency in Hz
    pub fn nyquist(&self) -> f32 {
        self.0 as f32 / 2.0
    }
}

/// Planar audio buffer: one `Vec<f32>` per channel, all of equal length
///
/// Pipelines work on single-channel buffers; the engine holds one per channel
/// and reuses it across blocks so that steady-state processing does not allocate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a zeroed buffer
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            channels: vec![vec![0.0; num_samples]; num_channels],
        }
    }

    /// Create a single-channel buffer
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            channels: vec![samples],
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// Fails if the channels have different lengths.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(first) = channels.first() {
            let len = first.len();
            if channels.iter().any(|c| c.len() != len) {
                return Err(ReverbError::ChannelLengthMismatch {
                    lengths: channels.iter().map(Vec::len).collect(),
                });
            }
        }
        Ok(Self { channels })
    }

    /// Create an empty single-channel buffer with reserved capacity
    pub fn with_capacity(num_samples: usize) -> Self {
        Self {
            channels: vec![Vec::with_capacity(num_samples)],
        }
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// True when there are no samples
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Borrow a channel
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Mutably borrow a channel
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(index).map(Vec::as_mut_slice)
    }

    /// Samples of a single-channel buffer
    ///
    /// `stage` names the caller in the channel-count error.
    pub fn mono_samples(&self, stage: &'static str) -> Result<&[f32]> {
        match self.channels.as_slice() {
            [only] => Ok(only.as_slice()),
            other => Err(ReverbError::not_mono(stage, other.len())),
        }
    }

    /// Mutable samples of a single-channel buffer
    pub fn mono_samples_mut(&mut self, stage: &'static str) -> Result<&mut Vec<f32>> {
        match self.channels.as_mut_slice() {
            [only] => Ok(only),
            other => Err(ReverbError::not_mono(stage, other.len())),
        }
    }

    /// Replace the contents with a copy of `samples` as a single channel
    ///
    /// Reuses the existing allocation when it is large enough.
    pub fn load_mono(&mut self, samples: &[f32]) {
        self.channels.truncate(1);
        if self.channels.is_empty() {
            self.channels.push(Vec::with_capacity(samples.len()));
        }
        let channel = &mut self.channels[0];
        channel.clear();
        channel.extend_from_slice(samples);
    }

    /// Copy shape and contents from another buffer, reusing allocations
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        self.channels.resize_with(other.num_channels(), Vec::new);
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.clear();
            dst.extend_from_slice(src);
        }
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flatten() {
            *sample *= gain;
        }
    }

    /// Set every sample to zero
    pub fn silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Iterate over channels
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Consume the buffer, returning its channels
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Move the samples out, leaving this buffer empty
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Decoded impulse response as delivered by an `IrSource`
#[derive(Debug, Clone, PartialEq)]
pub struct RawIr {
    /// Native sample rate of the recording
    pub sample_rate: SampleRate,
    /// Per-channel samples
    pub channels: Vec<Vec<f32>>,
}

impl RawIr {
    /// Create a new raw IR
    pub fn new(sample_rate: SampleRate, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of the longest channel
    pub fn num_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate.is_unset() {
            return 0.0;
        }
        self.num_samples() as f32 / self.sample_rate.as_hz() as f32
    }

    /// Samples feeding engine channel `index`
    ///
    /// A mono IR feeds every channel; otherwise channel `index` is used as-is.
    pub fn channel_for(&self, index: usize) -> Option<&[f32]> {
        match self.channels.len() {
            0 => None,
            1 => Some(&self.channels[0]),
            _ => self.channels.get(index).map(Vec::as_slice),
        }
    }
}
