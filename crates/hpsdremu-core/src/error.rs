//! Error types for the emulator workspace.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Startup (configuration, socket bind)
//! and runtime (datagram decode, I/O) failures are all captured here.

/// The error type for all emulator operations.
///
/// Startup errors (`Config`, `Bind`) are fatal and terminate the process;
/// runtime errors (`MalformedDatagram`, `Io`) are recovered locally by the
/// protocol servers and never close a socket.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid startup configuration: unknown radio kind, malformed MAC
    /// address, or a board/protocol pairing the hardware does not support.
    #[error("configuration error: {0}")]
    Config(String),

    /// A UDP socket could not be bound at startup.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        /// The local address that failed to bind.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// An inbound datagram was too short, carried an unknown magic, or an
    /// unrecognized command. Logged at debug by the servers and dropped.
    #[error("malformed datagram: {0}")]
    MalformedDatagram(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
