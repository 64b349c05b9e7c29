//! hpsdremu-protocol1: the legacy OpenHPSDR "Protocol 1" (Metis) server.
//!
//! Protocol 1 multiplexes everything over a single UDP port: discovery,
//! start/stop, host control words, and the radio's data stream of
//! 1032-byte packets carrying interleaved multi-DDC IQ, mic audio, and
//! rotating telemetry responses.
//!
//! - [`frame`] -- byte-exact wire layout: discovery replies, control-word
//!   decode, sub-frame and packet assembly.
//! - [`server`] -- the single-socket state machine and timer-driven
//!   packet producer.

pub mod frame;
pub mod server;

pub use server::Protocol1Server;
