//! Request encoding and response classification
//!
//! Pure functions between the wire text and [`Response`] values; the
//! exchange itself lives in [`ObdClient`](crate::ObdClient).

use crate::error::ObdError;
use crate::mode::Mode;
use crate::pid::Pid;
use tracing::{debug, warn};

/// Line the adapter prints when no ECU answered
const NO_DATA: &str = "NO DATA";

/// First byte of a negative response
const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Progress line printed while the adapter searches bus protocols
const SEARCHING: &str = "SEARCHING";

/// Adapter-generated error lines that end the exchange
const ADAPTER_ERRORS: [&str; 7] = [
    "?",
    "ERROR",
    "BUS ERROR",
    "CAN ERROR",
    "STOPPED",
    "BUFFER FULL",
    "FB ERROR",
];

/// A single OBD-II request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Service mode
    pub mode: Mode,
    /// Requested parameter
    pub pid: Pid,
    /// Extra parameter bytes appended after the PID
    pub params: Vec<u8>,
}

impl Request {
    /// Build a request, rejecting PIDs that are not legal in `mode`
    pub fn new(mode: Mode, pid: Pid, params: &[u8]) -> Result<Self, ObdError> {
        pid.ensure_mode(mode)?;
        Ok(Self {
            mode,
            pid,
            params: params.to_vec(),
        })
    }

    /// Request line: mode, PID and params as zero-padded hex, no separators
    pub fn encode(&self) -> String {
        let mut line = self.mode.hex();
        line.push_str(&self.pid.hex());
        for byte in &self.params {
            line.push_str(&format!("{byte:02x}"));
        }
        line
    }
}

/// What a response line carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Positive reply; `None` when the line held no bytes past the header
    Data(Option<Vec<u8>>),
    /// The adapter reported `NO DATA`
    NoData,
    /// Negative response, kept as the raw `7F` line
    Negative(String),
}

/// One classified response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Mode the request was sent in
    pub mode: Mode,
    /// Echoed PID; `None` for modes without a PID echo
    pub pid: Option<Pid>,
    /// Payload classification
    pub body: ResponseBody,
}

impl Response {
    /// Positive response with data bytes
    pub fn data(mode: Mode, pid: Option<Pid>, bytes: Vec<u8>) -> Self {
        let bytes = if bytes.is_empty() { None } else { Some(bytes) };
        Self {
            mode,
            pid,
            body: ResponseBody::Data(bytes),
        }
    }

    /// `NO DATA` response
    pub fn no_data(mode: Mode, pid: Pid) -> Self {
        Self {
            mode,
            pid: Some(pid),
            body: ResponseBody::NoData,
        }
    }

    /// Negative (`7F`) response
    pub fn negative(mode: Mode, pid: Pid, line: impl Into<String>) -> Self {
        Self {
            mode,
            pid: Some(pid),
            body: ResponseBody::Negative(line.into()),
        }
    }

    /// Whether the ECU refused the request
    pub fn is_error(&self) -> bool {
        matches!(self.body, ResponseBody::Negative(_))
    }

    /// Whether the adapter reported `NO DATA`
    pub fn is_no_data(&self) -> bool {
        matches!(self.body, ResponseBody::NoData)
    }

    /// Data bytes, when the reply is positive and carried any
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Data(Some(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Reason byte of a negative response, if present
    pub fn negative_reason(&self) -> Option<u8> {
        match &self.body {
            ResponseBody::Negative(line) => parse_hex_bytes(line).ok()?.get(2).copied(),
            _ => None,
        }
    }
}

/// Classify the lines of one reply to `request`.
///
/// Stops at the first `NO DATA` or `7F` line; adapters emit at most one
/// per request.
pub fn parse_reply(request: &Request, lines: &[String]) -> Result<Vec<Response>, ObdError> {
    let mode = request.mode;
    let mut responses = Vec::with_capacity(lines.len());

    for line in lines {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with(SEARCHING) {
            continue;
        }
        if upper == NO_DATA {
            debug!("No data for {} in mode {}", request.pid, mode);
            responses.push(Response::no_data(mode, request.pid));
            return Ok(responses);
        }
        check_adapter_error(&upper)?;

        let bytes = parse_hex_bytes(line)?;
        if bytes.first() == Some(&NEGATIVE_RESPONSE) {
            warn!("Error response for {} in mode {}: {}", request.pid, mode, line);
            responses.push(Response::negative(mode, request.pid, line.as_str()));
            return Ok(responses);
        }

        let response = if mode.echoes_pid() {
            let echoed = bytes
                .get(1)
                .ok_or_else(|| ObdError::InvalidResponse(format!("missing PID echo: {line}")))?;
            let pid = Pid::parse(&format!("{echoed:02x}"), mode)?;
            if pid != request.pid {
                return Err(ObdError::InvalidResponse(format!(
                    "reply for {} to a request for {}",
                    pid, request.pid
                )));
            }
            Response::data(mode, Some(pid), bytes[2..].to_vec())
        } else {
            let data = bytes.get(1..).map(<[u8]>::to_vec).unwrap_or_default();
            Response::data(mode, None, data)
        };
        responses.push(response);
    }

    Ok(responses)
}

/// Parse a line of hex bytes, spaced (`41 05 37`) or compact (`410537`)
pub fn parse_hex_bytes(line: &str) -> Result<Vec<u8>, ObdError> {
    let digits: String = line.split_whitespace().collect();
    let invalid = || ObdError::InvalidResponse(format!("not a hex byte line: {line:?}"));

    if digits.is_empty() || digits.len() % 2 != 0 || !line.split_whitespace().all(|t| t.len() % 2 == 0) {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

fn check_adapter_error(upper: &str) -> Result<(), ObdError> {
    if upper.starts_with("UNABLE TO CONNECT") {
        return Err(ObdError::VehicleNotConnected);
    }
    let bus_init_failed = upper.starts_with("BUS INIT") && upper.contains("ERROR");
    if bus_init_failed || ADAPTER_ERRORS.contains(&upper) {
        return Err(ObdError::AdapterError(upper.to_string()));
    }
    Ok(())
}
