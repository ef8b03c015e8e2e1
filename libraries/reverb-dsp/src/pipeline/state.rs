//! Pipeline state machine
//!
//! The IR pipeline's staleness is a tagged state driven by a reducer over
//! events, instead of boolean flags spread across stages.

/// IR pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Output matches the current source, parameters and sample rate
    Clean,
    /// Something changed since the last rebuild
    #[default]
    Dirty,
    /// A rebuild is in progress
    Running,
}

/// Inputs to the state reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// At least one stage reported changed parameters
    ParamsChanged,
    /// The processing rate changed
    SampleRateChanged,
    /// A new raw IR was loaded
    IrLoaded,
    RebuildStarted,
    RebuildFinished,
    /// The rebuild aborted; the previous output stays valid
    RebuildFailed,
}

impl PipelineState {
    /// Next state after `event`
    #[must_use]
    pub fn reduce(self, event: PipelineEvent) -> Self {
        match (self, event) {
            (
                _,
                PipelineEvent::ParamsChanged
                | PipelineEvent::SampleRateChanged
                | PipelineEvent::IrLoaded,
            ) => Self::Dirty,
            (Self::Dirty, PipelineEvent::RebuildStarted) => Self::Running,
            (Self::Running, PipelineEvent::RebuildFinished | PipelineEvent::RebuildFailed) => {
                Self::Clean
            }
            (state, _) => state,
        }
    }

    pub fn is_dirty(self) -> bool {
        self == Self::Dirty
    }
}
