//! ELM327 AT command execution

use crate::error::ObdError;
use crate::protocol::ObdProtocol;
use crate::transport::Framer;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

const RESPONSE_OK: &str = "OK";

/// Configuration progress of the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Nothing sent yet
    Uninitialized,
    /// Reset acknowledged
    Initialized,
    /// Echo and line termination configured, OBD requests accepted
    Ready,
    /// An AT exchange failed; the adapter must be reopened
    Failed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Uninitialized => "uninitialized",
            AdapterState::Initialized => "initialized",
            AdapterState::Ready => "ready",
            AdapterState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// AT command layer on top of the prompt framer
pub struct Elm327<T> {
    framer: Framer<T>,
    state: AdapterState,
    echo_configured: bool,
    line_termination_configured: bool,
}

impl<T> Elm327<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport with the given per-command timeout
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            framer: Framer::new(io, timeout),
            state: AdapterState::Uninitialized,
            echo_configured: false,
            line_termination_configured: false,
        }
    }

    /// Current configuration state
    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Mutable access to the framer for OBD exchanges
    pub(crate) fn framer(&mut self) -> &mut Framer<T> {
        &mut self.framer
    }

    /// Send `AT<cmd>` and return the first line of the reply
    pub async fn at(&mut self, command: &str) -> Result<String, ObdError> {
        info!("AT command {}", command);
        let lines = self.exchange(command).await?;
        lines.into_iter().next().ok_or_else(|| {
            self.state = AdapterState::Failed;
            ObdError::CommandFailed {
                command: format!("AT{command}"),
                response: String::new(),
            }
        })
    }

    /// `ATZ`: reset the adapter
    pub async fn reset(&mut self) -> Result<(), ObdError> {
        self.ensure_not_failed()?;
        // with echo on the first line is the command itself, stripped by the framer;
        // what remains is the device identification
        let identification = self.at("Z").await?;
        debug!("Adapter identified as {:?}", identification);
        if identification == "?" {
            self.state = AdapterState::Failed;
            return Err(ObdError::CommandFailed {
                command: "ATZ".to_string(),
                response: identification,
            });
        }

        self.state = AdapterState::Initialized;
        self.echo_configured = false;
        self.line_termination_configured = false;
        Ok(())
    }

    /// `ATE0`/`ATE1`: switch command echo
    pub async fn set_echo(&mut self, on: bool) -> Result<(), ObdError> {
        debug!("Setting echo {}", on);
        self.ensure_initialized()?;
        self.expect_ok(&format!("E{}", flag(on))).await?;
        self.echo_configured = true;
        self.promote();
        Ok(())
    }

    /// `ATL0`/`ATL1`: switch line feeds after carriage returns
    pub async fn set_line_termination(&mut self, on: bool) -> Result<(), ObdError> {
        debug!("Setting line termination {}", on);
        self.ensure_initialized()?;
        self.expect_ok(&format!("L{}", flag(on))).await?;
        self.line_termination_configured = true;
        self.promote();
        Ok(())
    }

    /// `ATSPn`: pin the vehicle bus protocol
    pub async fn select_protocol(&mut self, protocol: ObdProtocol) -> Result<(), ObdError> {
        info!("Setting OBD protocol to {:?}", protocol);
        self.ensure_initialized()?;
        self.expect_ok(protocol.at_command()).await
    }

    /// Fail unless OBD requests may be sent
    pub fn ensure_ready(&self) -> Result<(), ObdError> {
        match self.state {
            AdapterState::Ready => Ok(()),
            other => Err(ObdError::NotReady(other.to_string())),
        }
    }

    /// Mark the adapter unusable after a failed OBD exchange
    pub(crate) fn mark_failed(&mut self) {
        warn!("Adapter marked failed in state {}", self.state);
        self.state = AdapterState::Failed;
    }

    /// Close the transport
    pub async fn shutdown(&mut self) -> Result<(), ObdError> {
        self.framer.shutdown().await
    }

    async fn exchange(&mut self, command: &str) -> Result<Vec<String>, ObdError> {
        let result = async {
            self.framer.send(&["AT", command]).await?;
            self.framer.read_lines().await
        }
        .await;
        if result.is_err() {
            self.state = AdapterState::Failed;
        }
        result
    }

    async fn expect_ok(&mut self, command: &str) -> Result<(), ObdError> {
        let lines = self.exchange(command).await?;
        match lines.last() {
            Some(last) if last.eq_ignore_ascii_case(RESPONSE_OK) => Ok(()),
            _ => {
                warn!("AT{} not acknowledged: {:?}", command, lines);
                self.state = AdapterState::Failed;
                Err(ObdError::CommandFailed {
                    command: format!("AT{command}"),
                    response: lines.join(" "),
                })
            }
        }
    }

    fn promote(&mut self) {
        if self.echo_configured && self.line_termination_configured {
            self.state = AdapterState::Ready;
        }
    }

    fn ensure_not_failed(&self) -> Result<(), ObdError> {
        match self.state {
            AdapterState::Failed => Err(ObdError::NotReady(self.state.to_string())),
            _ => Ok(()),
        }
    }

    fn ensure_initialized(&self) -> Result<(), ObdError> {
        match self.state {
            AdapterState::Initialized | AdapterState::Ready => Ok(()),
            other => Err(ObdError::NotReady(other.to_string())),
        }
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}
