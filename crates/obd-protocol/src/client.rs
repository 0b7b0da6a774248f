//! OBD-II Client for ELM327 Adapters
//!
//! Provides async serial communication with OBD-II adapters. One request is
//! outstanding at a time; every call takes `&mut self`.

use crate::adapter::{AdapterState, Elm327};
use crate::codec::{parse_reply, Request, Response};
use crate::error::ObdError;
use crate::mode::Mode;
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use crate::transport::{open_serial, PortConfiguration};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use tracing::{debug, info};

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient<T = SerialStream> {
    adapter: Elm327<T>,
    protocol: Option<ObdProtocol>,
}

impl ObdClient<SerialStream> {
    /// Open the configured serial port.
    ///
    /// The adapter still needs [`ObdClient::initialize`].
    pub fn open(config: &PortConfiguration) -> Result<Self, ObdError> {
        info!("Creating OBD client for device: {}", config.device);
        let port = open_serial(config)?;
        Ok(Self::new(port, config.timeout()))
    }
}

impl<T> ObdClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a client over any async byte stream
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            adapter: Elm327::new(io, timeout),
            protocol: None,
        }
    }

    /// Pin a bus protocol during [`ObdClient::initialize`]
    pub fn with_protocol(mut self, protocol: ObdProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Initialize the ELM327 adapter.
    ///
    /// Resets twice, then turns echo and line feeds off. Both resets must
    /// succeed.
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        info!("Initializing OBD adapter");
        self.adapter.reset().await?;
        self.adapter.reset().await?;
        self.adapter.set_echo(false).await?;
        self.adapter.set_line_termination(false).await?;
        if let Some(protocol) = self.protocol {
            self.adapter.select_protocol(protocol).await?;
        }
        info!("OBD adapter initialized successfully");
        Ok(())
    }

    /// AT command layer
    pub fn adapter(&mut self) -> &mut Elm327<T> {
        &mut self.adapter
    }

    /// Current adapter state
    pub fn state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Protocol pinned at initialization, if any
    pub fn protocol(&self) -> Option<ObdProtocol> {
        self.protocol
    }

    /// Send a request and classify every line of the reply
    pub async fn ask(
        &mut self,
        mode: Mode,
        pid: Pid,
        params: &[u8],
    ) -> Result<Vec<Response>, ObdError> {
        debug!("ask(mode={}, pid={}, params={:02x?})", mode, pid, params);
        let request = Request::new(mode, pid, params)?;
        self.adapter.ensure_ready()?;

        let result = async {
            let framer = self.adapter.framer();
            framer.send(&[&request.encode()]).await?;
            let lines = framer.read_lines().await?;
            parse_reply(&request, &lines)
        }
        .await;
        // a late or unparsed reply would be read as the answer to the next request
        if result.is_err() {
            self.adapter.mark_failed();
        }
        result
    }

    /// Send a request whose reply is a single line
    pub async fn ask_one_line(
        &mut self,
        mode: Mode,
        pid: Pid,
        params: &[u8],
    ) -> Result<Option<Response>, ObdError> {
        let mut responses = self.ask(mode, pid, params).await?;
        match responses.len() {
            0 | 1 => Ok(responses.pop()),
            count => Err(ObdError::UnexpectedLineCount(count)),
        }
    }

    /// Close the transport
    pub async fn disconnect(&mut self) -> Result<(), ObdError> {
        info!("Disconnecting OBD client");
        self.adapter.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ResponseBody;
    use crate::mock::MockAdapter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn ready_client(mock: MockAdapter) -> ObdClient<tokio::io::DuplexStream> {
        let mut client = ObdClient::new(mock.spawn(), Duration::from_millis(500));
        client.initialize().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let client = ready_client(MockAdapter::new()).await;
        assert_eq!(client.state(), AdapterState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_with_protocol() {
        let mut client = ObdClient::new(MockAdapter::new().spawn(), Duration::from_millis(500))
            .with_protocol(ObdProtocol::Iso15765_4Can11bit500);
        client.initialize().await.unwrap();
        assert_eq!(client.protocol(), Some(ObdProtocol::Iso15765_4Can11bit500));
    }

    #[tokio::test]
    async fn test_ask_before_initialize() {
        let mut client = ObdClient::new(MockAdapter::new().spawn(), Duration::from_millis(500));
        let err = client.ask(Mode::CurrentData, Pid::ENGINE_LOAD, &[]).await.unwrap_err();
        assert!(matches!(err, ObdError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_ask_one_line() {
        let mut client = ready_client(MockAdapter::new().with_response("0105", "41 05 37")).await;
        let response = client
            .ask_one_line(Mode::CurrentData, Pid::ENGINE_COOLANT_TEMPERATURE, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.bytes(), Some(&[0x37][..]));
    }

    #[tokio::test]
    async fn test_negative_response_is_returned() {
        let mut client = ready_client(MockAdapter::new().with_response("0131", "7F 01 12")).await;
        let response = client
            .ask_one_line(Mode::CurrentData, Pid::DISTANCE_SINCE_CODES_CLEARED, &[])
            .await
            .unwrap()
            .unwrap();
        assert!(response.is_error());
        assert_eq!(response.body, ResponseBody::Negative("7F 01 12".to_string()));
    }

    #[tokio::test]
    async fn test_unscripted_pid_is_no_data() {
        let mut client = ready_client(MockAdapter::new()).await;
        let response = client
            .ask_one_line(Mode::CurrentData, Pid::FUEL_RATE, &[])
            .await
            .unwrap()
            .unwrap();
        assert!(response.is_no_data());
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn test_multi_line_reply_is_rejected_for_single_line_ask() {
        let mock = MockAdapter::new().with_response("0104", "41 04 20\r41 04 21");
        let mut client = ready_client(mock).await;
        let err = client
            .ask_one_line(Mode::CurrentData, Pid::ENGINE_LOAD, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::UnexpectedLineCount(2)));
    }

    #[tokio::test]
    async fn test_mode_mismatch_is_not_sent() {
        let mut client = ready_client(MockAdapter::new()).await;
        let err = client
            .ask(Mode::FreezeFrameData, Pid::ECU_COMPATIBILITY, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::ModeMismatch { .. }));
        assert_eq!(client.state(), AdapterState::Ready);
    }

    /// Answers each CR-terminated command with the next raw reply
    fn scripted(replies: Vec<&'static str>) -> tokio::io::DuplexStream {
        let (client, mut adapter) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            let mut byte = [0u8; 1];
            while let Ok(1) = adapter.read(&mut byte).await {
                if byte[0] != b'\r' {
                    continue;
                }
                let Some(reply) = replies.next() else { break };
                if adapter.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        client
    }

    #[tokio::test]
    async fn test_second_reset_must_succeed() {
        let io = scripted(vec![
            "ATZ\r\n\r\nELM327 v1.5\r\n\r\n>",
            "ATZ\r\n?\r\n\r\n>",
        ]);
        let mut client = ObdClient::new(io, Duration::from_millis(500));
        match client.initialize().await.unwrap_err() {
            ObdError::CommandFailed { command, response } => {
                assert_eq!(command, "ATZ");
                assert_eq!(response, "?");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(client.state(), AdapterState::Failed);
    }

    #[tokio::test]
    async fn test_second_reset_without_reply_fails() {
        let io = scripted(vec![
            "ATZ\r\n\r\nELM327 v1.5\r\n\r\n>",
            "ATZ\r\n\r\n>",
        ]);
        let mut client = ObdClient::new(io, Duration::from_millis(500));
        let err = client.initialize().await.unwrap_err();
        assert!(matches!(err, ObdError::EmptyResponse));
        assert_eq!(client.state(), AdapterState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_not_read_by_next_request() {
        let mock = MockAdapter::new()
            .with_response("0300", "43 01 33 00 00 00 00")
            .with_delay("0300", Duration::from_millis(300));
        let mut client = ObdClient::new(mock.spawn(), Duration::from_millis(100));
        client.initialize().await.unwrap();

        let err = client.ask(Mode::Diagnostic, Pid::DIAGNOSTIC_CODES, &[]).await.unwrap_err();
        assert!(matches!(err, ObdError::Timeout(100)));
        assert_eq!(client.state(), AdapterState::Failed);

        let err = client
            .ask(Mode::ClearTroubleCodes, Pid::CLEAR_TROUBLE_CODES, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_adapter_error_fails_adapter() {
        let mut client = ready_client(MockAdapter::new().with_response("0104", "CAN ERROR")).await;
        let err = client.ask(Mode::CurrentData, Pid::ENGINE_LOAD, &[]).await.unwrap_err();
        assert!(matches!(err, ObdError::AdapterError(_)));
        assert_eq!(client.state(), AdapterState::Failed);
    }
}
