//! Error types for the Brink Modbus engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport, poll and write paths.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port could not be opened, or the link dropped and could
    /// not be re-established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A register read failed after the retry budget was spent.
    #[error("Read of register {address} failed: {reason}")]
    Read { address: u16, reason: String },

    /// A register write failed at the transport level.
    #[error("Write to register {address} failed: {reason}")]
    Write { address: u16, reason: String },

    /// Value rejected before any bus traffic happened.
    #[error("Value {value} for '{key}' is outside the allowed range {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: i16,
        min: i16,
        max: i16,
    },

    /// Key does not exist in the register catalog.
    #[error("Unknown register '{0}'")]
    UnknownRegister(String),

    /// Write attempted on a register that does not accept writes.
    #[error("Register '{0}' is not writable")]
    NotWritable(&'static str),

    /// Configuration or setup error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a connection error from any error type.
    pub fn connection<E: std::fmt::Display>(e: E) -> Self {
        Error::Connection(e.to_string())
    }

    /// Create a read error for the given register address.
    pub fn read<E: std::fmt::Display>(address: u16, e: E) -> Self {
        Error::Read {
            address,
            reason: e.to_string(),
        }
    }

    /// Create a write error for the given register address.
    pub fn write<E: std::fmt::Display>(address: u16, e: E) -> Self {
        Error::Write {
            address,
            reason: e.to_string(),
        }
    }

    /// Create a configuration error from any error type.
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Error::Config(e.to_string())
    }
}
