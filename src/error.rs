//! Typed errors for the control plane
//!
//! Each layer reports its own failure kind. None of these are fatal: the
//! runtime turns command errors into `COMMAND_ERROR` events, logs variable
//! errors at debug level, and maps protocol and cookie errors to an empty
//! result for the caller.

use std::io;
use thiserror::Error;

/// Failure to turn a line into a runnable command
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    /// No handler registered under this name
    #[error("unknown command: {name}")]
    Unknown {
        name: String,
        /// The expanded line, reported back in the error event
        line: String,
    },
}

/// Rejected variable write
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VariableError {
    #[error("variable '{0}' is read-only")]
    ReadOnly(String),

    #[error("invalid variable name: {0:?}")]
    InvalidName(String),
}

/// Malformed traffic on one of the binary or NUL-delimited protocols
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("short read: expected {expected} bytes")]
    ShortRead { expected: usize },

    #[error("unknown message type {0}")]
    UnknownType(i32),

    #[error("invalid payload size {0}")]
    InvalidSize(i32),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure of a single round-trip to the cookie daemon
#[derive(Debug, Error)]
pub enum CookieError {
    #[error("no cookie daemon socket configured")]
    NoSocket,

    #[error("failed to connect to cookie daemon: {0}")]
    Connect(#[source] nix::Error),

    #[error("failed to send request: {0}")]
    Send(#[source] nix::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),

    #[error("daemon did not answer in time")]
    Timeout,

    #[error("daemon closed the connection")]
    HangUp,

    #[error("failed to read response: {0}")]
    Read(#[source] nix::Error),
}
