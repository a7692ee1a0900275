//! The two channels a tool server can be reached over.
//!
//! Stdio servers are spawned as a child process and exchange one JSON
//! message per line on stdin/stdout. SSE servers are already running: the
//! client GETs the event stream, the server's first `endpoint` event names
//! the URL to POST messages to, and every later `message` event carries a
//! JSON-RPC payload.

use std::process::Stdio;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::endpoint::TransportConfig;
use crate::error::{Error, Result};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum incoming message size (1MB).
/// Sized for large tool outputs (article bodies, search results).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// A connected channel to one server.
pub(crate) enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

impl Transport {
    pub(crate) async fn connect(config: &TransportConfig) -> Result<Self> {
        match config {
            TransportConfig::Stdio { command, args, env } => Ok(Self::Stdio(
                StdioTransport::spawn(command, args, env.iter())?,
            )),
            TransportConfig::Sse { url } => Ok(Self::Sse(SseTransport::connect(url).await?)),
        }
    }

    /// Write one JSON message to the server.
    pub(crate) async fn send(&self, payload: String) -> Result<()> {
        match self {
            Self::Stdio(t) => t.send(payload).await,
            Self::Sse(t) => t.send(payload).await,
        }
    }

    /// Read the next JSON message from the server.
    pub(crate) async fn recv(&self) -> Result<String> {
        match self {
            Self::Stdio(t) => t.recv().await,
            Self::Sse(t) => t.recv().await,
        }
    }

    /// Tear the channel down; the transport cannot be used afterwards.
    pub(crate) async fn close(&self) {
        match self {
            Self::Stdio(t) => t.close().await,
            Self::Sse(t) => t.close(),
        }
    }
}

/// Child process speaking line-delimited JSON on its standard streams.
pub(crate) struct StdioTransport {
    process: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
}

impl StdioTransport {
    fn spawn<'e>(
        command: &str,
        args: &[String],
        env: impl Iterator<Item = (&'e String, &'e String)>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            process: Mutex::new(process),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    async fn send(&self, payload: String) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<String> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();

        let bytes_read = stdout.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(Error::ChannelClosed);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(Error::TooLarge {
                size: line.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }

        Ok(line)
    }

    async fn close(&self) {
        let mut process = self.process.lock().await;
        let _ = process.kill().await;
    }
}

/// HTTP channel: POST to send, server-sent events to receive.
pub(crate) struct SseTransport {
    http: reqwest::Client,
    post_url: Url,
    incoming: Mutex<mpsc::Receiver<String>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    async fn connect(url: &str) -> Result<Self> {
        let stream_url = Url::parse(url).map_err(|e| Error::Connect(e.to_string()))?;
        let http = reqwest::Client::new();

        let response = http
            .get(stream_url.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Connect(format!(
                "event stream returned {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream().eventsource();

        // The server's first event names where to POST our messages.
        let post_target = loop {
            let event = timeout(DEFAULT_TIMEOUT, stream.next())
                .await
                .map_err(|_| Error::Timeout(DEFAULT_TIMEOUT))?
                .ok_or(Error::ChannelClosed)?
                .map_err(|e| Error::Stream(e.to_string()))?;
            if event.event == "endpoint" {
                break event.data;
            }
        };
        let post_url = resolve_endpoint(&stream_url, &post_target)?;

        let (tx, rx) = mpsc::channel(32);
        let reader = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) if event.event == "message" => {
                        if tx.send(event.data).await.is_err() {
                            break;
                        }
                    }
                    Ok(event) => {
                        tracing::trace!(event = %event.event, "ignoring event");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "event stream ended");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            http,
            post_url,
            incoming: Mutex::new(rx),
            reader,
        })
    }

    async fn send(&self, payload: String) -> Result<()> {
        let response = self
            .http
            .post(self.post_url.clone())
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Stream(format!(
                "message post returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn recv(&self) -> Result<String> {
        let message = self
            .incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ChannelClosed)?;

        if message.len() > MAX_MESSAGE_SIZE {
            return Err(Error::TooLarge {
                size: message.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }

        Ok(message)
    }

    fn close(&self) {
        self.reader.abort();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Resolve the POST target from the `endpoint` event against the stream URL
/// (servers send either a relative path or an absolute URL).
fn resolve_endpoint(stream_url: &Url, target: &str) -> Result<Url> {
    stream_url
        .join(target)
        .map_err(|e| Error::Protocol(format!("bad endpoint '{target}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_resolution_relative_and_absolute() {
        let base = Url::parse("http://localhost:8000/sse").unwrap();

        let relative = resolve_endpoint(&base, "/messages/?session_id=abc").unwrap();
        assert_eq!(
            relative.as_str(),
            "http://localhost:8000/messages/?session_id=abc"
        );

        let absolute = resolve_endpoint(&base, "http://other:9000/messages").unwrap();
        assert_eq!(absolute.as_str(), "http://other:9000/messages");
    }
}
