//! Convolution stage tests
//!
//! Stream continuity against direct convolution, the unit-impulse identity,
//! and real-time performance of block processing.

use reverb_core::AudioBuffer;
use reverb_dsp::{Convolution, PartitionedConvolver, Task};
use std::f32::consts::PI;
use std::time::Instant;

/// Generate a mono sine wave
fn generate_sine_wave(frequency: f32, sample_rate: u32, num_frames: usize) -> Vec<f32> {
    (0..num_frames)
        .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Exponentially decaying IR
fn decaying_ir(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (-(i as f32) / (len as f32 / 6.0)).exp() * if i % 2 == 0 { 1.0 } else { -0.7 })
        .collect()
}

fn direct_convolution(signal: &[f32], ir: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; signal.len()];
    for (n, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0_f64;
        for (k, &h) in ir.iter().enumerate().take(n + 1) {
            acc += f64::from(h) * f64::from(signal[n - k]);
        }
        *slot = acc as f32;
    }
    out
}

#[test]
fn test_step_convolved_with_step() {
    // Step input halfway through the block, step IR halfway through the IR
    let block = 1764;
    let ir_len = 1000;
    let signal: Vec<f32> = (0..block).map(|i| if i < block / 2 { 0.0 } else { 1.0 }).collect();
    let ir: Vec<f32> = (0..ir_len).map(|i| if i < ir_len / 2 { 0.0 } else { 1.0 }).collect();

    let mut convolution = Convolution::new(block);
    convolution.load_ir(AudioBuffer::mono(ir.clone())).unwrap();

    let mut audio = AudioBuffer::mono(signal.clone());
    convolution.exec(&mut audio).unwrap();

    let expected = direct_convolution(&signal, &ir);
    assert!(expected[block - 1] > 300.0);
    for (a, b) in audio.channel(0).unwrap().iter().zip(&expected) {
        assert!((a - b).abs() <= 1e-3 * b.abs().max(1.0), "{a} vs {b}");
    }
}

#[test]
fn test_stream_continuity_with_varying_block_sizes() {
    let signal = generate_sine_wave(440.0, 48_000, 12_000);
    let ir = decaying_ir(2_500);
    let expected = direct_convolution(&signal, &ir);

    let mut convolution = Convolution::new(256);
    convolution.load_ir(AudioBuffer::mono(ir)).unwrap();

    let mut output = Vec::with_capacity(signal.len());
    let mut position = 0;
    let sizes = [256, 255, 1, 512, 100, 256, 3000];
    let mut index = 0;
    while position < signal.len() {
        let end = (position + sizes[index % sizes.len()]).min(signal.len());
        let mut block = AudioBuffer::mono(signal[position..end].to_vec());
        convolution.exec(&mut block).unwrap();
        output.extend_from_slice(block.channel(0).unwrap());
        position = end;
        index += 1;
    }

    assert_eq!(output.len(), expected.len());
    let max_error = output
        .iter()
        .zip(&expected)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);
    let peak = expected.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    assert!(max_error < 1e-4 * peak.max(10.0), "max error {max_error}, peak {peak}");
}

#[test]
fn test_unit_impulse_identity_over_many_blocks() {
    let mut convolution = Convolution::new(512);
    convolution.load_ir(AudioBuffer::mono(vec![1.0])).unwrap();

    for block_index in 0..20 {
        let input = generate_sine_wave(1_000.0 + block_index as f32, 44_100, 512);
        let mut block = AudioBuffer::mono(input.clone());
        convolution.exec(&mut block).unwrap();
        for (a, b) in block.channel(0).unwrap().iter().zip(&input) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn test_swapping_ir_keeps_stream_running() {
    let mut convolution = Convolution::new(128);
    convolution.load_ir(AudioBuffer::mono(decaying_ir(1_000))).unwrap();

    let mut block = AudioBuffer::mono(generate_sine_wave(300.0, 48_000, 128));
    convolution.exec(&mut block).unwrap();

    let previous = convolution.install(PartitionedConvolver::new(&[0.5], 128).unwrap());
    assert_eq!(previous.map(|c| c.ir_len()), Some(1_000));

    let input = generate_sine_wave(300.0, 48_000, 128);
    let mut block = AudioBuffer::mono(input.clone());
    convolution.exec(&mut block).unwrap();
    for (a, b) in block.channel(0).unwrap().iter().zip(&input) {
        assert!((a - 0.5 * b).abs() < 1e-5);
    }
}

#[test]
fn benchmark_long_ir_block_processing() {
    // 2 s IR at 48 kHz, 512-sample blocks (10.7 ms budget per block)
    let ir = decaying_ir(96_000);
    let mut convolver = PartitionedConvolver::new(&ir, 512).unwrap();

    let mut buffer = generate_sine_wave(1_000.0, 48_000, 512);
    for _ in 0..5 {
        convolver.process(&mut buffer);
    }

    let iterations = 50;
    let start = Instant::now();
    for _ in 0..iterations {
        let mut buffer = generate_sine_wave(1_000.0, 48_000, 512);
        convolver.process(&mut buffer);
    }
    let avg = start.elapsed() / iterations;
    println!("2s IR, 512-sample block: {:?} per block", avg);

    // Generous bound: debug builds are far slower than release
    assert!(avg.as_millis() < 200, "block took {:?}", avg);
}
