//! Impulse response asset sources
//!
//! [`WavFileSource`] decodes WAV files from disk. [`IrBank`] holds named IRs
//! in memory (for example WAV files embedded in the binary) and falls back to
//! disk for names it does not know.
//!
//! # Example
//!
//! ```rust,no_run
//! use reverb_core::IrSource;
//! use reverb_dsp::{IrBank, WavFileSource};
//!
//! let bank = IrBank::new().with_fallback(WavFileSource::with_root("/usr/share/impulses"));
//! let ir = bank.load("hall.wav").unwrap();
//! println!("{} channels @ {} Hz", ir.num_channels(), ir.sample_rate.as_hz());
//! ```

use reverb_core::{IrSource, RawIr, Result, ReverbError, SampleRate};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Decode a WAV stream into per-channel samples
pub fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<RawIr> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 {
        return Err(ReverbError::IrDecode("WAV has no channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ReverbError::IrDecode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ReverbError::IrDecode(e.to_string()))?
        }
    };

    if interleaved.is_empty() {
        return Err(ReverbError::IrDecode("WAV contains no samples".to_string()));
    }

    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(RawIr::new(SampleRate::new(spec.sample_rate), planar))
}

/// Loads WAV files from disk
#[derive(Debug, Clone, Default)]
pub struct WavFileSource {
    root: Option<PathBuf>,
}

impl WavFileSource {
    /// Resolve names as paths relative to the working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative names against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl IrSource for WavFileSource {
    fn load(&self, name: &str) -> Result<RawIr> {
        let path = self.resolve(name);
        if !path.exists() {
            return Err(ReverbError::IrNotFound(path.display().to_string()));
        }
        let reader =
            hound::WavReader::open(&path).map_err(|e| ReverbError::IrDecode(e.to_string()))?;
        decode_wav(reader)
    }
}

/// Named in-memory IRs with an optional disk fallback
#[derive(Debug, Clone, Default)]
pub struct IrBank {
    entries: HashMap<String, RawIr>,
    fallback: Option<WavFileSource>,
}

impl IrBank {
    /// Empty bank without fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve unknown names through `fallback`
    #[must_use]
    pub fn with_fallback(mut self, fallback: WavFileSource) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Register decoded samples under `name`
    pub fn insert(&mut self, name: impl Into<String>, ir: RawIr) {
        self.entries.insert(name.into(), ir);
    }

    /// Decode and register an embedded WAV file
    pub fn insert_wav_bytes(&mut self, name: impl Into<String>, bytes: &[u8]) -> Result<()> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| ReverbError::IrDecode(e.to_string()))?;
        self.insert(name, decode_wav(reader)?);
        Ok(())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether `name` is registered in memory
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of in-memory entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no IR is registered in memory
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IrSource for IrBank {
    fn load(&self, name: &str) -> Result<RawIr> {
        if let Some(ir) = self.entries.get(name) {
            return Ok(ir.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.load(name),
            None => Err(ReverbError::IrNotFound(name.to_string())),
        }
    }
}
