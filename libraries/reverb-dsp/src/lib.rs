//! Reverb DSP
//!
//! Stages and pipelines of the convolution reverb.
//!
//! Two pipelines run per audio channel:
//!
//! ```text
//! IrPipeline:   raw IR -> filter x4 -> time-stretch -> gain -> pre-delay -> prepared IR
//! MainPipeline: audio  -> convolution(prepared IR) -> dry/wet mix -> output gain
//! ```
//!
//! The IR pipeline is expensive and only runs when its parameters, its source
//! or the sample rate changed. The main pipeline runs on every block.
//!
//! # Example
//!
//! ```rust
//! use reverb_core::{AudioBuffer, MemorySink, ParameterSnapshot, RawIr, SampleRate};
//! use reverb_dsp::pipeline::{IrPipeline, MainPipeline};
//! use reverb_dsp::Task;
//! use std::sync::Arc;
//!
//! let params = ParameterSnapshot::defaults();
//! let log = Arc::new(MemorySink::new());
//!
//! let mut ir_pipeline = IrPipeline::new(0, log);
//! ir_pipeline.update_sample_rate(SampleRate::DVD_QUALITY);
//! ir_pipeline.load_ir(&RawIr::new(SampleRate::DVD_QUALITY, vec![vec![1.0, 0.5, 0.25]]), 10.0).unwrap();
//! ir_pipeline.update_params(&params, "").unwrap();
//! let ir = ir_pipeline.rebuild().unwrap();
//!
//! let mut main = MainPipeline::new(64);
//! main.load_ir(ir).unwrap();
//! main.update_params(&params, "").unwrap();
//!
//! let mut block = AudioBuffer::mono(vec![0.0; 64]);
//! main.exec(&mut block).unwrap();
//! ```

#![forbid(unsafe_code)]

pub mod ir_source;
pub mod pipeline;
pub mod stages;
pub mod task;

pub use ir_source::{IrBank, WavFileSource};
pub use stages::{
    Convolution, Filter, FilterKind, FilterParams, Gain, Mixer, PartitionedConvolver, PreDelay,
    ResamplingQuality, TimeStretch,
};
pub use task::{Task, TaskState};
