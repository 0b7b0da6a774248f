//! Serial transport and prompt framing
//!
//! The ELM327 answers every command with zero or more CR-terminated lines
//! followed by the `>` prompt. [`Framer`] turns that character stream into
//! one reply per command.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, trace};

/// Default timeout for OBD commands
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Adapter-mandated line speed (ELM327 data sheet, do not change)
pub const BAUD_RATE: u32 = 38400;

/// Prompt printed by the adapter when it is ready for the next command
const PROMPT: u8 = b'>';

const READ_CHUNK: usize = 64;

/// Where the adapter lives and how long to wait for each reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfiguration {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Per-command deadline in milliseconds
    pub command_timeout_ms: u64,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            device: String::new(),
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl PortConfiguration {
    /// Create a configuration for `device` with the default timeout
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Per-command deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// List the serial device names present on this machine
pub fn available_ports() -> Result<Vec<String>, ObdError> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|port| port.port_name).collect())
}

/// Open the adapter's serial port with the fixed ELM327 line settings
pub fn open_serial(config: &PortConfiguration) -> Result<SerialStream, ObdError> {
    if config.device.trim().is_empty() {
        return Err(ObdError::SerialError("no serial device configured".to_string()));
    }
    info!("Opening serial port {} at {} baud", config.device, BAUD_RATE);

    let port = tokio_serial::new(&config.device, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::Hardware)
        .timeout(config.timeout())
        .open_native_async()?;
    Ok(port)
}

/// Command/reply framing over an async byte stream
pub struct Framer<T> {
    io: T,
    timeout: Duration,
    last_command: Option<String>,
}

impl<T> Framer<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            io,
            timeout,
            last_command: None,
        }
    }

    /// Per-call deadline length
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write the concatenated command parts followed by CR/LF
    pub async fn send(&mut self, parts: &[&str]) -> Result<(), ObdError> {
        let command = parts.concat();
        debug!("Sending {:?}", command);

        let mut line = Vec::with_capacity(command.len() + 2);
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(b"\r\n");
        self.io.write_all(&line).await?;
        self.io.flush().await?;

        self.last_command = Some(command);
        Ok(())
    }

    /// Read until the adapter prompt, returning the text before it.
    ///
    /// A command echo at the start of the reply is removed; a reply with
    /// nothing besides the echo is [`ObdError::EmptyResponse`].
    pub async fn read_until_prompt(&mut self) -> Result<String, ObdError> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer: Vec<u8> = Vec::with_capacity(256);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = tokio::time::timeout_at(deadline, self.io.read(&mut chunk))
                .await
                .map_err(|_| ObdError::Timeout(self.timeout.as_millis() as u64))??;
            if read == 0 {
                return Err(ObdError::SerialError(
                    "adapter closed the connection before the prompt".to_string(),
                ));
            }
            trace!("Received chunk {:?}", String::from_utf8_lossy(&chunk[..read]));
            buffer.extend_from_slice(&chunk[..read]);

            if buffer.last() == Some(&PROMPT) {
                buffer.pop();
                break;
            }
        }

        let text = self.strip_echo(String::from_utf8_lossy(&buffer).into_owned());
        if text.trim().is_empty() {
            return Err(ObdError::EmptyResponse);
        }
        Ok(text)
    }

    /// Read one reply and split it into trimmed, non-empty lines
    pub async fn read_lines(&mut self) -> Result<Vec<String>, ObdError> {
        let text = self.read_until_prompt().await?;
        let lines = split_lines(&text);
        debug!("Received response: {:?}", lines);
        Ok(lines)
    }

    /// Close the write half of the transport
    pub async fn shutdown(&mut self) -> Result<(), ObdError> {
        self.io.shutdown().await?;
        Ok(())
    }

    fn strip_echo(&self, text: String) -> String {
        let Some(command) = self.last_command.as_deref() else {
            return text;
        };
        let body = text.trim_start();
        match body.get(..command.len()) {
            Some(prefix) if !command.is_empty() && prefix.eq_ignore_ascii_case(command) => {
                trace!("Stripping echo of {:?}", command);
                body[command.len()..].to_string()
            }
            _ => text,
        }
    }
}

/// Split adapter output on CR/LF, trimming and dropping blank lines
pub fn split_lines(text: &str) -> Vec<String> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
