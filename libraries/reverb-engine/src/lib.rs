//! Reverb Engine
//!
//! Host-facing boundary of the convolution reverb: per-channel main
//! pipelines, IR rebuilds (inline or on a worker thread), and the
//! control-thread parameter store.
//!
//! # Example
//!
//! ```rust
//! use reverb_core::params::ids;
//! use reverb_core::{AudioBuffer, MemorySink, RawIr, SampleRate};
//! use reverb_dsp::IrBank;
//! use reverb_engine::{EngineConfig, ReverbEngine};
//! use std::sync::Arc;
//!
//! let mut bank = IrBank::new();
//! bank.insert("room", RawIr::new(SampleRate::DVD_QUALITY, vec![vec![1.0, 0.5, 0.25]]));
//!
//! let config = EngineConfig {
//!     default_ir: Some("room".to_string()),
//!     ..EngineConfig::default()
//! };
//! let mut engine = ReverbEngine::new(config, Arc::new(bank), MemorySink::shared()).unwrap();
//! engine.prepare(SampleRate::DVD_QUALITY, 256, 2).unwrap();
//!
//! engine.controls().set_float(ids::WET_RATIO, 0.3).unwrap();
//!
//! let mut block = AudioBuffer::new(2, 256);
//! engine.process_block(&mut block).unwrap();
//! assert!(engine.has_ir());
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod engine;
pub mod rebuild;
pub mod worker;

pub use config::{EngineConfig, RebuildMode};
pub use control::ControlHandle;
pub use engine::ReverbEngine;
pub use rebuild::{IrRebuilder, RebuildJob};
pub use worker::{PreparedIrSet, RebuildWorker};
