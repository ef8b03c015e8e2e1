//! Domain types shared by the DSP and engine crates

mod audio;

pub use audio::{AudioBuffer, RawIr, SampleRate};
