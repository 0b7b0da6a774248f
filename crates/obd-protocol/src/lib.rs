//! OBD-II Protocol Implementation
//!
//! This crate provides async serial communication with ELM327-compatible
//! OBD-II adapters: prompt framing, AT command execution, request encoding,
//! the PID registry and value decoders for J1979 services 01, 02, 03, 04
//! and 09.

mod adapter;
mod client;
mod codec;
pub mod decode;
mod error;
mod fault;
pub mod mock;
mod mode;
mod pid;
mod protocol;
mod status;
mod transport;

pub use adapter::{AdapterState, Elm327};
pub use client::ObdClient;
pub use codec::{parse_hex_bytes, parse_reply, Request, Response, ResponseBody};
pub use error::ObdError;
pub use fault::{faults, Fault};
pub use mode::Mode;
pub use pid::Pid;
pub use protocol::ObdProtocol;
pub use status::{
    EcuCompatibility, FuelStatus, FuelSystemStatus, MonitorStatus, Readiness, SecondaryAirStatus,
};
pub use transport::{
    available_ports, open_serial, split_lines, Framer, PortConfiguration, BAUD_RATE,
    DEFAULT_TIMEOUT_MS,
};

/// Result alias for OBD operations
pub type Result<T> = std::result::Result<T, ObdError>;
