//! Shared mutable radio state.
//!
//! [`RadioState`] is the one entity mutated concurrently: command handlers
//! write it, frame producers read it. Every field is an independent atomic,
//! so readers observe the latest committed value of each field without any
//! locking and no cross-field transaction is ever needed.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::hw::HardwareKind;

/// Sample rates a DDC can run at, paired with their Protocol 1 rate codes.
pub const SAMPLE_RATES: [(u32, u8); 4] = [(48_000, 0), (96_000, 1), (192_000, 2), (384_000, 3)];

/// Number of RX frequency slots carried in state.
///
/// Protocol 2 high-priority commands address twelve receivers regardless of
/// the board; slots beyond `max_ddcs` are accepted and ignored.
pub const RX_SLOTS: usize = 12;

/// Default VFO frequency for TX and every RX slot, in Hz.
pub const DEFAULT_FREQ_HZ: u32 = 7_100_000;

/// The Protocol 1 telemetry addresses, in rotation order.
pub const CTRL_ADDRS: [u8; 4] = [0x00, 0x08, 0x10, 0x18];

/// Look up the Protocol 1 code for a sample rate, if the rate is valid.
pub fn rate_to_code(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().find(|(r, _)| *r == rate).map(|(_, c)| *c)
}

/// Look up the sample rate for a Protocol 1 rate code.
pub fn code_to_rate(code: u8) -> Option<u32> {
    SAMPLE_RATES.iter().find(|(_, c)| *c == code).map(|(r, _)| *r)
}

/// Host-mutable radio state shared between command handlers and producers.
pub struct RadioState {
    hw: HardwareKind,
    sample_rate_hz: AtomicU32,
    n_active_ddc: AtomicU8,
    tx_freq_hz: AtomicU32,
    rx_freq_hz: [AtomicU32; RX_SLOTS],
    running: AtomicBool,
    ptt: AtomicBool,
    tx_drive_level: AtomicU8,
    seq_out: AtomicU32,
    ctrl_rotor: AtomicU8,
}

impl RadioState {
    /// Create state for a board at the protocol's default sample rate.
    pub fn new(hw: HardwareKind, sample_rate_hz: u32) -> Self {
        Self {
            hw,
            sample_rate_hz: AtomicU32::new(sample_rate_hz),
            n_active_ddc: AtomicU8::new(1),
            tx_freq_hz: AtomicU32::new(DEFAULT_FREQ_HZ),
            rx_freq_hz: std::array::from_fn(|_| AtomicU32::new(DEFAULT_FREQ_HZ)),
            running: AtomicBool::new(false),
            ptt: AtomicBool::new(false),
            tx_drive_level: AtomicU8::new(0),
            seq_out: AtomicU32::new(0),
            ctrl_rotor: AtomicU8::new(0),
        }
    }

    /// The board this state belongs to.
    pub fn hw(&self) -> HardwareKind {
        self.hw
    }

    /// Current DDC sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate_hz.load(Ordering::Relaxed)
    }

    /// Apply a commanded sample rate. Rates outside the supported set are
    /// rejected with a warning and leave the current rate in place.
    pub fn set_sample_rate(&self, rate: u32) {
        if rate_to_code(rate).is_none() {
            tracing::warn!(rate, "ignoring unsupported sample rate");
            return;
        }
        if self.sample_rate_hz.swap(rate, Ordering::Relaxed) != rate {
            tracing::info!(rate, "sample rate changed");
        }
    }

    /// Number of currently active DDCs (1..=max_ddcs).
    pub fn n_active_ddc(&self) -> u8 {
        self.n_active_ddc.load(Ordering::Relaxed)
    }

    /// Apply a commanded DDC count, clamped into `1..=max_ddcs` with a
    /// warning when the host asks for more than the board has.
    pub fn set_n_active_ddc(&self, n: u8) {
        let max = self.hw.max_ddcs();
        let clamped = n.clamp(1, max);
        if clamped != n {
            tracing::warn!(requested = n, max, "DDC count clamped into range");
        }
        if self.n_active_ddc.swap(clamped, Ordering::Relaxed) != clamped {
            tracing::info!(nddc = clamped, "active DDC count changed");
        }
    }

    /// TX VFO frequency in Hz.
    pub fn tx_freq(&self) -> u32 {
        self.tx_freq_hz.load(Ordering::Relaxed)
    }

    /// Set the TX VFO frequency.
    pub fn set_tx_freq(&self, freq: u32) {
        if self.tx_freq_hz.swap(freq, Ordering::Relaxed) != freq {
            tracing::info!(freq, "TX frequency changed");
        }
    }

    /// RX frequency for a DDC slot. Out-of-range slots read as the default.
    pub fn rx_freq(&self, ddc: usize) -> u32 {
        self.rx_freq_hz
            .get(ddc)
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(DEFAULT_FREQ_HZ)
    }

    /// Set the RX frequency of a DDC slot. Slots beyond [`RX_SLOTS`] are
    /// accepted and ignored.
    pub fn set_rx_freq(&self, ddc: usize, freq: u32) {
        if let Some(slot) = self.rx_freq_hz.get(ddc) {
            if slot.swap(freq, Ordering::Relaxed) != freq {
                tracing::info!(ddc, freq, "RX frequency changed");
            }
        }
    }

    /// Whether the stream producer is running.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Set the run flag. A rising edge resets the outbound sequence number,
    /// so every stream start begins at sequence 0.
    pub fn set_running(&self, running: bool) -> bool {
        let was = self.running.swap(running, Ordering::Relaxed);
        if running && !was {
            self.seq_out.store(0, Ordering::Relaxed);
        }
        was
    }

    /// Whether the host is holding PTT.
    pub fn ptt(&self) -> bool {
        self.ptt.load(Ordering::Relaxed)
    }

    /// Set PTT. Returns the previous value so callers can act on edges.
    pub fn set_ptt(&self, ptt: bool) -> bool {
        self.ptt.swap(ptt, Ordering::Relaxed)
    }

    /// Commanded TX drive level.
    pub fn tx_drive(&self) -> u8 {
        self.tx_drive_level.load(Ordering::Relaxed)
    }

    /// Set the TX drive level.
    pub fn set_tx_drive(&self, drive: u8) {
        if self.tx_drive_level.swap(drive, Ordering::Relaxed) != drive {
            tracing::info!(drive, "TX drive changed");
        }
    }

    /// Take the next outbound sequence number, wrapping mod 2^32.
    pub fn next_seq(&self) -> u32 {
        self.seq_out.fetch_add(1, Ordering::Relaxed)
    }

    /// Take the next telemetry address, rotating through [`CTRL_ADDRS`].
    pub fn next_ctrl_addr(&self) -> u8 {
        let idx = self.ctrl_rotor.fetch_add(1, Ordering::Relaxed);
        CTRL_ADDRS[idx as usize % CTRL_ADDRS.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RadioState {
        RadioState::new(HardwareKind::Hermes, 48_000)
    }

    #[test]
    fn rate_code_mapping() {
        assert_eq!(rate_to_code(48_000), Some(0));
        assert_eq!(rate_to_code(96_000), Some(1));
        assert_eq!(rate_to_code(192_000), Some(2));
        assert_eq!(rate_to_code(384_000), Some(3));
        assert_eq!(rate_to_code(44_100), None);

        for (rate, code) in SAMPLE_RATES {
            assert_eq!(code_to_rate(code), Some(rate));
        }
        assert_eq!(code_to_rate(4), None);
    }

    #[test]
    fn defaults() {
        let s = state();
        assert_eq!(s.sample_rate(), 48_000);
        assert_eq!(s.n_active_ddc(), 1);
        assert_eq!(s.tx_freq(), DEFAULT_FREQ_HZ);
        assert_eq!(s.rx_freq(0), DEFAULT_FREQ_HZ);
        assert!(!s.running());
        assert!(!s.ptt());
        assert_eq!(s.tx_drive(), 0);
    }

    #[test]
    fn invalid_sample_rate_is_rejected() {
        let s = state();
        s.set_sample_rate(192_000);
        s.set_sample_rate(50_000);
        assert_eq!(s.sample_rate(), 192_000);
    }

    #[test]
    fn ddc_count_clamped() {
        let s = state(); // Hermes: 4 DDCs
        s.set_n_active_ddc(3);
        assert_eq!(s.n_active_ddc(), 3);
        s.set_n_active_ddc(7);
        assert_eq!(s.n_active_ddc(), 4);
        s.set_n_active_ddc(0);
        assert_eq!(s.n_active_ddc(), 1);
    }

    #[test]
    fn rx_slots_beyond_range_ignored() {
        let s = state();
        s.set_rx_freq(11, 14_074_000);
        assert_eq!(s.rx_freq(11), 14_074_000);
        s.set_rx_freq(12, 14_074_000); // no slot, silently ignored
        assert_eq!(s.rx_freq(12), DEFAULT_FREQ_HZ);
    }

    #[test]
    fn seq_resets_on_stream_start() {
        let s = state();
        s.set_running(true);
        assert_eq!(s.next_seq(), 0);
        assert_eq!(s.next_seq(), 1);
        s.set_running(false);
        s.set_running(true);
        assert_eq!(s.next_seq(), 0, "stream start resets the sequence");
        // Setting running while already running must not reset.
        s.next_seq();
        s.set_running(true);
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn seq_wraps() {
        let s = state();
        s.seq_out.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(s.next_seq(), u32::MAX);
        assert_eq!(s.next_seq(), 0);
    }

    #[test]
    fn ctrl_rotor_cycles_in_order() {
        let s = state();
        let seen: Vec<u8> = (0..8).map(|_| s.next_ctrl_addr()).collect();
        assert_eq!(seen, [0x00, 0x08, 0x10, 0x18, 0x00, 0x08, 0x10, 0x18]);
    }

    #[test]
    fn ptt_reports_previous_value() {
        let s = state();
        assert!(!s.set_ptt(true));
        assert!(s.set_ptt(true));
        assert!(s.set_ptt(false));
    }
}
