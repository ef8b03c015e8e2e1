//! Property-based tests for the DSP stages
//!
//! These tests use proptest to verify invariants across many random inputs.

use proptest::prelude::*;
use reverb_core::params::{db_to_gain, limits};
use reverb_core::{AudioBuffer, SampleRate};
use reverb_dsp::{Filter, FilterKind, FilterParams, Gain, Mixer, PreDelay, Task};

// Helper: Check if buffer contains only finite values
fn all_finite(buffer: &AudioBuffer) -> bool {
    buffer.channels().flatten().all(|s| s.is_finite())
}

fn filter_kind() -> impl Strategy<Value = FilterKind> {
    prop_oneof![
        Just(FilterKind::LowShelf),
        Just(FilterKind::Peak),
        Just(FilterKind::HighShelf),
    ]
}

proptest! {
    /// Property: rebuilding with identical inputs yields identical output
    #[test]
    fn filter_is_deterministic(
        kind in filter_kind(),
        frequency in 20.0f32..20_000.0,
        q in limits::FILTER_Q_MIN..20.0f32,
        gain_db in limits::FILTER_GAIN_MIN_DB..limits::FILTER_GAIN_MAX_DB,
        samples in prop::collection::vec(-1.0f32..1.0, 16..512)
    ) {
        let mut filter = Filter::new(kind);
        filter.update_sample_rate(SampleRate::new(48_000));
        filter.set_params(FilterParams { frequency, q, gain: db_to_gain(gain_db), enabled: true });

        let first_coefficients = filter.rebuild().unwrap();
        let second_coefficients = filter.rebuild().unwrap();
        prop_assert_eq!(first_coefficients, second_coefficients);

        let mut first = AudioBuffer::mono(samples.clone());
        let mut second = AudioBuffer::mono(samples);
        filter.exec(&mut first).unwrap();
        filter.exec(&mut second).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(all_finite(&first), "filter produced NaN or Inf");
    }

    /// Property: gain scales every sample
    #[test]
    fn gain_scales_constant_buffer(
        value in -1.0f32..1.0,
        factor in 0.0f32..4.0,
        len in 1usize..2048
    ) {
        let mut gain = Gain::with_gain(factor);
        let mut buffer = AudioBuffer::mono(vec![value; len]);
        gain.exec(&mut buffer).unwrap();

        for &sample in buffer.channel(0).unwrap() {
            prop_assert!((sample - factor * value).abs() < 1e-6);
        }
    }

    /// Property: the mixer interpolates linearly per sample
    #[test]
    fn mixer_interpolates(
        ratio in 0.0f32..=1.0,
        pairs in prop::collection::vec((-1.0f32..1.0, -1.0f32..1.0), 1..512)
    ) {
        let dry = AudioBuffer::mono(pairs.iter().map(|p| p.0).collect());
        let wet_samples: Vec<f32> = pairs.iter().map(|p| p.1).collect();
        let mut wet = AudioBuffer::mono(wet_samples.clone());

        Mixer::with_wet_ratio(ratio).blend(&dry, &mut wet).unwrap();

        for (i, &out) in wet.channel(0).unwrap().iter().enumerate() {
            let expected = (1.0 - ratio) * pairs[i].0 + ratio * wet_samples[i];
            prop_assert!((out - expected).abs() < 1e-6);
        }
    }

    /// Property: pre-delay prepends ceil(sr * d / 1000) zeros and keeps the IR verbatim
    #[test]
    fn pre_delay_prepends_exact_zeros(
        rate in prop::sample::select(vec![22_050u32, 44_100, 48_000, 88_200, 96_000]),
        delay_ms in 0.0f32..=1000.0,
        samples in prop::collection::vec(-1.0f32..1.0, 1..256)
    ) {
        let mut stage = PreDelay::new();
        stage.update_sample_rate(SampleRate::new(rate));
        stage.set_delay_ms(delay_ms);

        let mut buffer = AudioBuffer::mono(samples.clone());
        stage.exec(&mut buffer).unwrap();

        let added = (f64::from(rate) * f64::from(delay_ms) / 1000.0).ceil() as usize;
        let out = buffer.channel(0).unwrap();
        prop_assert_eq!(out.len(), samples.len() + added);
        prop_assert!(out[..added].iter().all(|&s| s == 0.0));
        prop_assert_eq!(&out[added..], samples.as_slice());
    }

    /// Property: pre-delay beyond the maximum fails and leaves the buffer intact
    #[test]
    fn pre_delay_over_maximum_fails(
        delay_ms in 1000.001f32..10_000.0,
        samples in prop::collection::vec(-1.0f32..1.0, 1..64)
    ) {
        let mut stage = PreDelay::new();
        stage.update_sample_rate(SampleRate::new(48_000));
        stage.set_delay_ms(delay_ms);

        let mut buffer = AudioBuffer::mono(samples.clone());
        prop_assert!(stage.exec(&mut buffer).is_err());
        prop_assert_eq!(buffer.channel(0).unwrap(), samples.as_slice());
    }
}
