//! Synthetic receive-channel signal source.
//!
//! Each DDC carries the same test tone at a configurable offset from its
//! center, buried in Gaussian noise. The per-DDC phase accumulator is the
//! load-bearing part: producers request short buffers hundreds of times per
//! second, and without persistent phase the tone would jump at every buffer
//! boundary.

use std::f64::consts::TAU;

use num_complex::Complex64;
use rand_distr::{Distribution, Normal};

/// Per-DDC complex tone generator with additive Gaussian noise.
pub struct SignalGenerator {
    tone_hz: f64,
    noise: Option<Normal<f64>>,
    phase: Vec<f64>,
}

impl SignalGenerator {
    /// Create a generator with one phase accumulator per possible DDC.
    ///
    /// A zero, negative, or non-finite `noise_level` disables the noise
    /// term entirely.
    pub fn new(tone_hz: f64, noise_level: f64, max_ddcs: usize) -> Self {
        let noise = if noise_level > 0.0 {
            Normal::new(0.0, noise_level).ok()
        } else {
            None
        };
        Self {
            tone_hz,
            noise,
            phase: vec![0.0; max_ddcs],
        }
    }

    /// Fill `out` with unit-amplitude tone samples for one DDC, phase
    /// continuous with every previous call for the same DDC.
    ///
    /// The accumulator is kept reduced modulo 2π so precision does not decay
    /// over hours of streaming.
    pub fn generate_into(&mut self, out: &mut [Complex64], ddc: usize, sample_rate: u32) {
        let step = TAU * self.tone_hz / sample_rate as f64;
        let mut phase = self.phase[ddc];

        for s in out.iter_mut() {
            *s = Complex64::new(phase.cos(), phase.sin());
            phase = (phase + step).rem_euclid(TAU);
        }
        self.phase[ddc] = phase;

        if let Some(normal) = self.noise {
            let mut rng = rand::thread_rng();
            for s in out.iter_mut() {
                s.re += normal.sample(&mut rng);
                s.im += normal.sample(&mut rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_unit_amplitude_tone() {
        let mut gen = SignalGenerator::new(1000.0, 0.0, 1);
        let mut buf = vec![Complex64::default(); 4800];
        gen.generate_into(&mut buf, 0, 48_000);

        for s in &buf {
            assert!((s.norm() - 1.0).abs() < 1e-9);
        }

        // RMS of the I component of a unit complex exponential is 1/sqrt(2).
        let rms = (buf.iter().map(|s| s.re * s.re).sum::<f64>() / buf.len() as f64).sqrt();
        assert!(
            (rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.01,
            "RMS {rms}"
        );
    }

    #[test]
    fn phase_continuous_across_buffers() {
        let tone = 1000.0;
        let rate = 48_000u32;
        let step = TAU * tone / rate as f64;

        let mut gen = SignalGenerator::new(tone, 0.0, 1);
        let mut joined = Vec::new();
        for _ in 0..20 {
            let mut buf = vec![Complex64::default(); 63];
            gen.generate_into(&mut buf, 0, rate);
            joined.extend(buf);
        }

        for pair in joined.windows(2) {
            let jump = (pair[1] * pair[0].conj()).arg();
            assert!(
                (jump - step).abs() < 1e-9,
                "phase jump {jump} differs from step {step}"
            );
        }
    }

    #[test]
    fn ddcs_have_independent_phase() {
        let mut gen = SignalGenerator::new(1000.0, 0.0, 2);
        let mut a = vec![Complex64::default(); 16];
        gen.generate_into(&mut a, 0, 48_000);

        // DDC 1 has not advanced yet, so it starts at phase zero again.
        let mut b = vec![Complex64::default(); 16];
        gen.generate_into(&mut b, 1, 48_000);
        assert!((b[0].re - 1.0).abs() < 1e-12);
        assert!(b[0].im.abs() < 1e-12);
    }

    #[test]
    fn noise_spreads_the_samples() {
        let mut gen = SignalGenerator::new(0.0, 0.1, 1);
        let mut buf = vec![Complex64::default(); 1024];
        gen.generate_into(&mut buf, 0, 48_000);

        // Zero tone frequency gives a DC of 1.0 + noise on I.
        let mean = buf.iter().map(|s| s.re).sum::<f64>() / buf.len() as f64;
        let var = buf.iter().map(|s| (s.re - mean).powi(2)).sum::<f64>() / buf.len() as f64;
        assert!((mean - 1.0).abs() < 0.05);
        assert!(var > 1e-4, "noise variance {var} unexpectedly small");
    }
}
