//! Per-channel pipelines
//!
//! ```text
//! IrPipeline:   filter00 -> filter01 -> filter02 -> filter03 -> time-stretch -> gain -> pre-delay
//! MainPipeline: dry copy -> convolution -> mixer(dry, wet) -> output gain
//! ```

mod ir;
mod main;
mod state;

pub use ir::{merge_channels, split_ir, IrPipeline, IrStage, IR_STAGES};
pub use main::MainPipeline;
pub use state::{PipelineEvent, PipelineState};
