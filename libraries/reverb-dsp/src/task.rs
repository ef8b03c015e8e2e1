//! Task contract shared by every stage and pipeline
//!
//! A task reads its parameters from a [`ParameterSource`], caches them, and
//! reports whether the fresh values differ from the cache. Transforms must be
//! idempotent for unchanged parameters and input, which is what lets the IR
//! pipeline skip rebuilds when nothing changed.

use reverb_core::{AudioBuffer, ParameterSource, Result, SampleRate};

/// A unit of DSP work
///
/// # Real-Time Constraints
/// Tasks that run inside the main pipeline must not allocate in `exec()`
/// once their buffers are sized.
pub trait Task: Send {
    /// Read this task's parameters for `block_id`
    ///
    /// Returns `true` when any cached value changed. Fails if a parameter is
    /// missing or of the wrong kind.
    fn update_params(&mut self, params: &dyn ParameterSource, block_id: &str) -> Result<bool>;

    /// Apply the transform in place
    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()>;

    /// Whether cached output is stale
    fn needs_to_run(&self) -> bool;

    /// Record a new processing rate, marking the task dirty if it changed
    fn update_sample_rate(&mut self, rate: SampleRate) -> bool;

    /// Task name (for logs and errors)
    fn name(&self) -> &'static str;
}

/// Sample rate plus dirty flag, embedded by every task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskState {
    sample_rate: SampleRate,
    must_exec: bool,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskState {
    /// Fresh state: rate unknown, dirty
    pub fn new() -> Self {
        Self {
            sample_rate: SampleRate::UNSET,
            must_exec: true,
        }
    }

    /// Cached processing rate
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Whether output is stale
    pub fn must_exec(&self) -> bool {
        self.must_exec
    }

    pub fn mark_dirty(&mut self) {
        self.must_exec = true;
    }

    pub fn mark_clean(&mut self) {
        self.must_exec = false;
    }

    /// Update the cached rate; marks dirty and returns `true` if it changed
    pub fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        if self.sample_rate == rate {
            return false;
        }
        self.sample_rate = rate;
        self.must_exec = true;
        true
    }

    /// Replace `cached` with `fresh` if they differ, marking dirty
    pub fn refresh<T: PartialEq>(&mut self, cached: &mut T, fresh: T) -> bool {
        if *cached == fresh {
            return false;
        }
        *cached = fresh;
        self.must_exec = true;
        true
    }
}
