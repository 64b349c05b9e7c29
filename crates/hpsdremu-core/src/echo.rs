//! TX-to-RX echo loopback.
//!
//! In echo mode the host's transmitted IQ is captured while PTT is held,
//! committed on release, and then replayed endlessly on the receive path,
//! shifted from the TX frequency to wherever the DDC is tuned and
//! attenuated by 80 dB. This gives a host application a full round-trip
//! check of its TX chain without any RF.

use std::collections::HashMap;
use std::f64::consts::TAU;

use num_complex::Complex64;

/// Playback attenuation in dB.
const ATTENUATION_DB: f64 = 80.0;

/// Longest recording kept, in seconds.
const MAX_DURATION_SECS: f64 = 10.0;

/// Records TX IQ during PTT and replays the last committed burst on RX.
///
/// The frequency-shift oscillator keeps one phase accumulator per
/// `(tx_freq, rx_freq)` pair so playback stays phase continuous across
/// arbitrarily many reads. The map is cleared whenever a new burst is
/// committed, which bounds it while the host sweeps frequencies.
pub struct EchoBuffer {
    attenuation: f64,
    max_samples: usize,
    scratch: Vec<Complex64>,
    scratch_freq: u32,
    playback: Vec<Complex64>,
    playback_freq: u32,
    cursor: usize,
    shift_phase: HashMap<(u32, u32), f64>,
}

impl EchoBuffer {
    /// Create an empty buffer sized for the given recording sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            attenuation: 10f64.powf(-ATTENUATION_DB / 20.0),
            max_samples: (sample_rate as f64 * MAX_DURATION_SECS) as usize,
            scratch: Vec::new(),
            scratch_freq: 0,
            playback: Vec::new(),
            playback_freq: 0,
            cursor: 0,
            shift_phase: HashMap::new(),
        }
    }

    /// Append TX samples to the in-progress burst.
    ///
    /// The first record of a burst tags it with the TX frequency; the tag
    /// sticks even if the host retunes mid-burst. Recording stops growing
    /// once the burst reaches the duration cap.
    pub fn record(&mut self, samples: &[Complex64], tx_freq: u32) {
        if samples.is_empty() {
            return;
        }
        if self.scratch.is_empty() {
            self.scratch_freq = tx_freq;
            tracing::info!(tx_freq, "echo recording started");
        }
        let room = self.max_samples.saturating_sub(self.scratch.len());
        self.scratch.extend_from_slice(&samples[..samples.len().min(room)]);
    }

    /// Commit the in-progress burst on PTT release.
    ///
    /// The burst becomes the playback loop, the read cursor resets to its
    /// first sample, and the shift-phase map is evicted. A burst recorded
    /// with no known TX frequency is discarded.
    pub fn commit(&mut self) {
        if self.scratch.is_empty() {
            return;
        }
        if self.scratch_freq == 0 {
            tracing::debug!("discarding echo burst with unknown TX frequency");
            self.scratch.clear();
            return;
        }
        self.playback = std::mem::take(&mut self.scratch);
        self.playback_freq = self.scratch_freq;
        self.cursor = 0;
        self.shift_phase.clear();
        tracing::info!(
            samples = self.playback.len(),
            tx_freq = self.playback_freq,
            "echo burst committed"
        );
    }

    /// Whether a committed burst is available for playback.
    pub fn has_playback(&self) -> bool {
        !self.playback.is_empty()
    }

    /// Fill `out` with the next playback samples for a DDC tuned to
    /// `rx_freq`, or silence when nothing is committed.
    ///
    /// Samples are shifted by `tx_freq - rx_freq` using the persistent
    /// per-pair phase accumulator and attenuated by 80 dB. An echo whose
    /// offset falls outside the DDC passband (half the sample rate) yields
    /// silence without consuming playback samples.
    pub fn read_into(&mut self, out: &mut [Complex64], rx_freq: u32, sample_rate: u32) {
        if self.playback.is_empty() {
            out.fill(Complex64::new(0.0, 0.0));
            return;
        }

        let offset_hz = self.playback_freq as f64 - rx_freq as f64;
        if offset_hz.abs() > sample_rate as f64 / 2.0 {
            out.fill(Complex64::new(0.0, 0.0));
            return;
        }

        let len = self.playback.len();
        for s in out.iter_mut() {
            *s = self.playback[self.cursor];
            self.cursor = (self.cursor + 1) % len;
        }

        if offset_hz != 0.0 {
            let step = TAU * offset_hz / sample_rate as f64;
            let phase = self
                .shift_phase
                .entry((self.playback_freq, rx_freq))
                .or_insert(0.0);
            for s in out.iter_mut() {
                *s *= Complex64::new(phase.cos(), phase.sin());
                *phase = (*phase + step).rem_euclid(TAU);
            }
        }

        for s in out.iter_mut() {
            *s *= self.attenuation;
        }
    }
}
