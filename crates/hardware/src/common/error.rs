//! Simulator error taxonomy.
//!
//! Four error classes cover every failure the simulator can report:
//! 1. **Config:** Unrecognized option values or arithmetic incompatibility
//!    between options. Always fatal at startup.
//! 2. **Protocol:** An unreachable coherence state/message combination or a
//!    directory allocation that cannot find a victim. Indicates an
//!    implementation bug; fatal.
//! 3. **Length:** A send/receive length mismatch on the user networks.
//! 4. **State:** The clock-skew server heard from a thread that is not
//!    running or initializing. Fatal.
//!
//! None of these is locally recoverable; callers propagate them out of the
//! dispatch loop and exit.

use thiserror::Error;

/// Error type for every fallible simulator operation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Unrecognized option value or arithmetically incompatible options.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreachable coherence state/message combination; an implementation bug.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload length does not match what the receiver committed to.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    Length {
        /// Length the caller committed to.
        expected: u32,
        /// Length actually observed.
        actual: u32,
    },

    /// A clock-skew barrier report arrived from a non-running thread.
    #[error("state error: {0}")]
    State(String),
}

impl SimError {
    /// Shorthand for a [`SimError::Protocol`] with a formatted message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Shorthand for a [`SimError::Config`] with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
