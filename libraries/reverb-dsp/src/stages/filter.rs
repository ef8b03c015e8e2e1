/// Parametric IIR filter stages (low-shelf, peak, high-shelf)
///
/// The three kinds share one state machine (enable flag, rebuild on change)
/// and differ only in how coefficients are designed.
use crate::task::{Task, TaskState};
use reverb_core::params::{db_to_gain, ids, limits};
use reverb_core::{AudioBuffer, ParameterSource, Result, ReverbError, SampleRate};

/// Filter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Boosts/cuts below frequency
    LowShelf,
    /// Boosts/cuts around frequency with Q bandwidth
    Peak,
    /// Boosts/cuts above frequency
    HighShelf,
}

/// Cached filter parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Corner/center frequency in Hz
    pub frequency: f32,
    pub q: f32,
    /// Linear gain
    pub gain: f32,
    pub enabled: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            frequency: limits::FILTER_FREQ_DEFAULT,
            q: limits::FILTER_Q_DEFAULT,
            gain: 1.0,
            enabled: true,
        }
    }
}

impl FilterParams {
    /// Check the valid-range invariant at `sample_rate`
    ///
    /// Values are rejected, never clamped.
    pub fn validate(&self, sample_rate: SampleRate) -> Result<()> {
        let mut freq_max = limits::FILTER_FREQ_MAX;
        if !sample_rate.is_unset() {
            // Strictly below Nyquist
            freq_max = freq_max.min(sample_rate.nyquist() - 1.0);
        }
        if !(self.frequency > 0.0 && self.frequency <= freq_max) {
            return Err(ReverbError::out_of_range(
                "filter frequency",
                self.frequency,
                0.0,
                freq_max,
            ));
        }
        if !(limits::FILTER_Q_MIN..=limits::FILTER_Q_MAX).contains(&self.q) {
            return Err(ReverbError::out_of_range(
                "filter Q",
                self.q,
                limits::FILTER_Q_MIN,
                limits::FILTER_Q_MAX,
            ));
        }
        let gain_min = db_to_gain(limits::FILTER_GAIN_MIN_DB);
        let gain_max = db_to_gain(limits::FILTER_GAIN_MAX_DB);
        if !(gain_min..=gain_max).contains(&self.gain) {
            return Err(ReverbError::out_of_range(
                "filter gain",
                self.gain,
                gain_min,
                gain_max,
            ));
        }
        Ok(())
    }
}

/// Normalized biquad coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Pass-through filter
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design coefficients for `kind`
    ///
    /// Pure function of its inputs. Computed in f64 and normalized by a0.
    pub fn design(kind: FilterKind, sample_rate: SampleRate, params: &FilterParams) -> Self {
        let fs = sample_rate.as_f64();
        let a = f64::from(params.gain).sqrt();
        let q = f64::from(params.q);
        let omega = 2.0 * std::f64::consts::PI * f64::from(params.frequency) / fs;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::LowShelf => {
                let beta = sin_omega * a.sqrt() / q;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_omega + beta),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
                    a * ((a + 1.0) - (a - 1.0) * cos_omega - beta),
                    (a + 1.0) + (a - 1.0) * cos_omega + beta,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
                    (a + 1.0) + (a - 1.0) * cos_omega - beta,
                )
            }
            FilterKind::HighShelf => {
                let beta = sin_omega * a.sqrt() / q;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_omega + beta),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
                    a * ((a + 1.0) + (a - 1.0) * cos_omega - beta),
                    (a + 1.0) - (a - 1.0) * cos_omega + beta,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
                    (a + 1.0) - (a - 1.0) * cos_omega - beta,
                )
            }
            FilterKind::Peak => {
                let alpha = sin_omega / (2.0 * q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_omega,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_omega,
                    1.0 - alpha / a,
                )
            }
        };

        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }

    /// Run a direct form I biquad over `samples` from a zeroed state
    pub fn apply(&self, samples: &mut [f32]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0_f32, 0.0_f32, 0.0_f32, 0.0_f32);
        for sample in samples.iter_mut() {
            let x0 = *sample;
            let mut y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;

            // Flush denormals
            if y0.abs() < 1e-15 {
                y0 = 0.0;
            }

            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *sample = y0;
        }
    }
}

/// Parameter keys for one filter slot, built once per block id
#[derive(Debug, Clone, Default)]
struct FilterKeys {
    block_id: String,
    frequency: String,
    q: String,
    gain: String,
    enabled: String,
}

impl FilterKeys {
    fn for_block(block_id: &str) -> Self {
        Self {
            block_id: block_id.to_string(),
            frequency: ids::key(block_id, ids::FREQ_SUFFIX),
            q: ids::key(block_id, ids::Q_SUFFIX),
            gain: ids::key(block_id, ids::GAIN_SUFFIX),
            enabled: ids::key(block_id, ids::ENABLED_SUFFIX),
        }
    }
}

/// Parametric filter stage
///
/// # Example
///
/// ```rust
/// use reverb_core::{AudioBuffer, SampleRate};
/// use reverb_dsp::{Filter, FilterParams, Task};
///
/// let mut filter = Filter::peak();
/// filter.update_sample_rate(SampleRate::DVD_QUALITY);
/// filter.set_params(FilterParams { frequency: 2_000.0, q: 2.0, gain: 2.0, enabled: true });
///
/// let mut ir = AudioBuffer::mono(vec![1.0, 0.0, 0.0, 0.0]);
/// filter.exec(&mut ir).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Filter {
    kind: FilterKind,
    params: FilterParams,
    coefficients: BiquadCoefficients,
    keys: FilterKeys,
    state: TaskState,
}

impl Filter {
    /// Create a filter of the given kind with default parameters
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            params: FilterParams::default(),
            coefficients: BiquadCoefficients::IDENTITY,
            keys: FilterKeys::default(),
            state: TaskState::new(),
        }
    }

    pub fn low_shelf() -> Self {
        Self::new(FilterKind::LowShelf)
    }

    pub fn peak() -> Self {
        Self::new(FilterKind::Peak)
    }

    pub fn high_shelf() -> Self {
        Self::new(FilterKind::HighShelf)
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Cached parameters
    pub fn params(&self) -> FilterParams {
        self.params
    }

    /// Set parameters directly, bypassing the parameter source
    pub fn set_params(&mut self, params: FilterParams) -> bool {
        self.state.refresh(&mut self.params, params)
    }

    pub fn is_enabled(&self) -> bool {
        self.params.enabled
    }

    /// Coefficients from the last successful rebuild
    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }

    /// Validate the cached parameters and redesign the coefficients
    pub fn rebuild(&mut self) -> Result<BiquadCoefficients> {
        let sample_rate = self.state.sample_rate();
        if sample_rate.is_unset() {
            return Err(ReverbError::InvalidConfig(
                "filter executed before a sample rate was set".to_string(),
            ));
        }
        self.params.validate(sample_rate)?;
        self.coefficients = BiquadCoefficients::design(self.kind, sample_rate, &self.params);
        Ok(self.coefficients)
    }
}

impl Task for Filter {
    fn update_params(&mut self, params: &dyn ParameterSource, block_id: &str) -> Result<bool> {
        if self.keys.block_id != block_id || self.keys.frequency.is_empty() {
            self.keys = FilterKeys::for_block(block_id);
        }
        let fresh = FilterParams {
            frequency: params.float(&self.keys.frequency)?,
            q: params.float(&self.keys.q)?,
            gain: params.float(&self.keys.gain)?,
            enabled: params.flag(&self.keys.enabled)?,
        };
        Ok(self.set_params(fresh))
    }

    fn exec(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let samples = buffer.mono_samples_mut(self.name())?;
        if !self.params.enabled {
            self.state.mark_clean();
            return Ok(());
        }
        self.rebuild()?;
        self.coefficients.apply(samples);
        self.state.mark_clean();
        Ok(())
    }

    fn needs_to_run(&self) -> bool {
        self.state.must_exec()
    }

    fn update_sample_rate(&mut self, rate: SampleRate) -> bool {
        self.state.update_sample_rate(rate)
    }

    fn name(&self) -> &'static str {
        match self.kind {
            FilterKind::LowShelf => "LowShelfFilter",
            FilterKind::Peak => "PeakFilter",
            FilterKind::HighShelf => "HighShelfFilter",
        }
    }
}
