//! OBD-II Error Types

use crate::mode::Mode;
use thiserror::Error;

/// Errors that can occur during OBD-II communication
///
/// Negative (`7F`) and `NO DATA` replies are not errors: they arrive as
/// [`Response`](crate::Response) variants and decode to absent values.
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for the adapter prompt
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// The adapter returned a prompt with nothing before it
    #[error("Retrieved no response from the adapter")]
    EmptyResponse,

    /// An AT command was not acknowledged
    #[error("Command {command} unsuccessful, response: {response:?}")]
    CommandFailed { command: String, response: String },

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The adapter reported an internal or bus error
    #[error("Adapter error: {0}")]
    AdapterError(String),

    /// Vehicle not connected
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,

    /// The adapter has not completed initialization, or failed during it
    #[error("Adapter is not ready for OBD requests (state: {0})")]
    NotReady(String),

    /// The session transport was already closed
    #[error("Session is closed")]
    SessionClosed,

    /// A single-line request produced several response lines
    #[error("Expected a single response line, got {0}")]
    UnexpectedLineCount(usize),

    /// PID code not present in the registry
    #[error("Invalid PID: {0}")]
    InvalidPid(String),

    /// PID known, but not legal in the requested mode
    #[error("PID {pid:02x} is not allowed in mode {mode}")]
    ModeMismatch { pid: u8, mode: Mode },

    /// A decoded byte matches no entry of an enumeration table
    #[error("Unknown {table} code {code:02X}")]
    UnknownEnumCode { table: &'static str, code: u8 },
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
