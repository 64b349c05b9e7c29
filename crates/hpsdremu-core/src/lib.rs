//! hpsdremu-core: shared domain types for the OpenHPSDR emulator.
//!
//! This crate holds everything both protocol servers need: the board
//! catalog, the immutable startup configuration, the host-mutable radio
//! state, the IQ wire codec, the synthetic signal source, and the echo
//! loopback buffer. The protocol crates depend on it without knowing about
//! each other.
//!
//! # Key types
//!
//! - [`HardwareKind`] -- the emulated board and its DDC count
//! - [`RadioConfig`] / [`RadioState`] -- immutable vs. host-mutable radio state
//! - [`SignalGenerator`] -- phase-continuous per-DDC test tone + noise
//! - [`EchoBuffer`] -- PTT-gated TX capture replayed on RX
//! - [`Error`] / [`Result`] -- error handling

pub mod codec;
pub mod config;
pub mod echo;
pub mod error;
pub mod hw;
pub mod signal;
pub mod state;

// Re-export key types at crate root for ergonomic `use hpsdremu_core::*`.
pub use config::{RadioConfig, FIRMWARE_VERSION, MERCURY_VERSIONS, METIS_VERSION, PENNY_VERSION};
pub use echo::EchoBuffer;
pub use error::{Error, Result};
pub use hw::HardwareKind;
pub use signal::SignalGenerator;
pub use state::RadioState;
