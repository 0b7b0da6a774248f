//! Scripted ELM327 stand-in
//!
//! Serves one side of an in-memory duplex stream the way an adapter serves
//! its serial line: optional command echo, CR (or CR LF) line endings and a
//! `>` prompt after every reply. Used by tests and demos without hardware.

use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, trace};

const IDENTIFICATION: &str = "ELM327 v1.5";

/// A mock adapter answering from a command → reply table
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    responses: HashMap<String, String>,
    delays: HashMap<String, Duration>,
}

#[derive(Debug)]
struct LineSettings {
    echo: bool,
    line_feeds: bool,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            echo: true,
            line_feeds: true,
        }
    }
}

impl MockAdapter {
    /// Adapter that acknowledges the standard AT commands and answers
    /// `NO DATA` to every OBD request
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply to `command`; lines of a multi-line reply are
    /// separated by `\r`
    pub fn with_response(mut self, command: &str, reply: &str) -> Self {
        self.responses.insert(normalize(command), reply.to_string());
        self
    }

    /// Hold the reply to `command` back for `delay`
    pub fn with_delay(mut self, command: &str, delay: Duration) -> Self {
        self.delays.insert(normalize(command), delay);
        self
    }

    /// Start serving on a background task and return the client end
    pub fn spawn(self) -> DuplexStream {
        let (client, adapter) = duplex(4096);
        tokio::spawn(self.serve(adapter));
        client
    }

    async fn serve(self, mut io: DuplexStream) {
        let mut settings = LineSettings::default();
        let mut command = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match io.read(&mut byte).await {
                Ok(0) | Err(_) => break,
                Ok(_) => match byte[0] {
                    b'\r' => {
                        let received = String::from_utf8_lossy(&command).trim().to_string();
                        command.clear();
                        if received.is_empty() {
                            continue;
                        }
                        let output = self.answer(&received, &mut settings);
                        if let Some(delay) = self.delays.get(&normalize(&received)) {
                            tokio::time::sleep(*delay).await;
                        }
                        trace!("Mock adapter TX {:?}", output);
                        if io.write_all(output.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    b'\n' => {}
                    other => command.push(other),
                },
            }
        }
        debug!("Mock adapter stopped");
    }

    fn answer(&self, received: &str, settings: &mut LineSettings) -> String {
        let key = normalize(received);
        debug!("Mock adapter RX {}", key);

        // echo reflects the settings in force before the command runs
        let echo = settings.echo;
        let default_reply = match key.as_str() {
            "ATZ" => {
                *settings = LineSettings::default();
                format!("\r{IDENTIFICATION}")
            }
            "ATI" => IDENTIFICATION.to_string(),
            "ATE0" | "ATE1" => {
                settings.echo = key.ends_with('1');
                "OK".to_string()
            }
            "ATL0" | "ATL1" => {
                settings.line_feeds = key.ends_with('1');
                "OK".to_string()
            }
            k if k.starts_with("ATSP") => "OK".to_string(),
            k if k.starts_with("AT") => "?".to_string(),
            _ => "NO DATA".to_string(),
        };
        let reply = self.responses.get(&key).cloned().unwrap_or(default_reply);

        let eol = if settings.line_feeds { "\r\n" } else { "\r" };
        let mut output = String::new();
        if echo {
            output.push_str(received);
            output.push_str(eol);
        }
        for line in reply.split('\r') {
            output.push_str(line);
            output.push_str(eol);
        }
        output.push_str(eol);
        output.push('>');
        output
    }
}

fn normalize(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<String>()
        .to_ascii_uppercase()
}
