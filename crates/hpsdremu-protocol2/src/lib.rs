//! hpsdremu-protocol2: the modern OpenHPSDR "Protocol 2" server.
//!
//! Protocol 2 replaces Protocol 1's single multiplexed socket with a port
//! per concern: discovery and general configuration, RX-specific and
//! TX-specific setup, a high-priority run/PTT/frequency channel, and the
//! host's TX audio and TX IQ streams. The radio answers with per-DDC
//! sequence-numbered 1444-byte IQ packets, a 10 Hz high-priority status
//! stream, and 48 kHz mic silence, each from its own source port.
//!
//! - [`frame`] -- byte-exact packet layouts and command decoding.
//! - [`server`] -- socket binding, per-port dispatch, and the stream tasks.

pub mod frame;
pub mod server;

pub use server::{PortPlan, Protocol2Server};
