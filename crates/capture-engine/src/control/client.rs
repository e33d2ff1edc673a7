//! Websocket client for the recorder control protocol.

use std::time::Duration;

use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures_util::{SinkExt, StreamExt};
use reelcast_common::config::RemoteRecorderConfig;
use reelcast_common::error::{ReelError, ReelResult};
use serde_json::Value;

use super::protocol::{self, ServerFrame};
use super::RecorderControl;

/// An identified session with the recorder.
pub struct WebSocketRecorderClient {
    stream: WebSocketStream<ConnectStream>,
    request_timeout: Duration,
    next_request_id: u64,
    closed: bool,
}

impl WebSocketRecorderClient {
    /// Connect, complete the Hello/Identify handshake, and return a ready client.
    pub async fn connect(config: &RemoteRecorderConfig) -> ReelResult<Self> {
        let url = format!("ws://{}:{}", config.host, config.port);
        tracing::debug!(%url, "Connecting to recorder control socket");

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let (stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ReelError::protocol(format!(
                    "timed out after {}s connecting to {url}",
                    config.connect_timeout_secs
                ))
            })?
            .map_err(|e| ReelError::protocol(format!("failed to connect to {url}: {e}")))?;

        let mut client = Self {
            stream,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            next_request_id: 1,
            closed: false,
        };

        tokio::time::timeout(connect_timeout, client.identify(config.password.as_deref()))
            .await
            .map_err(|_| ReelError::protocol("timed out during handshake"))??;

        tracing::info!(%url, "Connected to recorder");
        Ok(client)
    }

    async fn identify(&mut self, password: Option<&str>) -> ReelResult<()> {
        let hello = match self.next_frame().await? {
            ServerFrame::Hello(hello) => hello,
            other => {
                return Err(ReelError::protocol(format!(
                    "expected Hello, received {other:?}"
                )))
            }
        };

        if hello.rpc_version < protocol::RPC_VERSION {
            return Err(ReelError::protocol(format!(
                "recorder speaks rpc version {}, need {}",
                hello.rpc_version,
                protocol::RPC_VERSION
            )));
        }

        let authentication = match (&hello.authentication, password) {
            (Some(challenge), Some(password)) => {
                Some(protocol::auth_response(password, challenge))
            }
            (Some(_), None) => {
                return Err(ReelError::config(format!(
                    "recorder requires a password; set {} or backend.password",
                    reelcast_common::config::RECORDER_PASSWORD_ENV
                )));
            }
            (None, _) => None,
        };

        self.send(protocol::identify_frame(authentication)).await?;

        match self.next_frame().await {
            Ok(ServerFrame::Identified {
                negotiated_rpc_version,
            }) => {
                tracing::debug!(
                    negotiated_rpc_version,
                    server_version = ?hello.obs_web_socket_version,
                    "Identified with recorder"
                );
                Ok(())
            }
            Ok(other) => Err(ReelError::protocol(format!(
                "expected Identified, received {other:?}"
            ))),
            // The recorder closes the socket on bad credentials.
            Err(e) => Err(ReelError::protocol(format!(
                "identification rejected (check the recorder password): {e}"
            ))),
        }
    }

    async fn send(&mut self, frame: Value) -> ReelResult<()> {
        self.stream
            .send(Message::text(frame.to_string()))
            .await
            .map_err(|e| ReelError::protocol(format!("send failed: {e}")))
    }

    /// Read frames until one decodes, skipping pings and binary noise.
    async fn next_frame(&mut self) -> ReelResult<ServerFrame> {
        loop {
            let message = self
                .stream
                .next()
                .await
                .ok_or_else(|| ReelError::protocol("connection closed by recorder"))?
                .map_err(|e| ReelError::protocol(format!("receive failed: {e}")))?;

            match message {
                Message::Text(text) => return protocol::parse_frame(text.as_str()),
                Message::Close(frame) => {
                    self.closed = true;
                    return Err(ReelError::protocol(format!(
                        "connection closed by recorder: {}",
                        frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "no reason".to_string())
                    )));
                }
                _ => continue,
            }
        }
    }

    async fn await_response(&mut self, request_id: &str) -> ReelResult<Value> {
        loop {
            match self.next_frame().await? {
                ServerFrame::RequestResponse(response) if response.request_id == request_id => {
                    return response.into_result();
                }
                ServerFrame::RequestResponse(response) => {
                    tracing::debug!(
                        request_id = %response.request_id,
                        "Ignoring response to an earlier request"
                    );
                }
                ServerFrame::Event | ServerFrame::Unknown(_) => {}
                other => {
                    tracing::debug!(frame = ?other, "Ignoring unexpected frame");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl RecorderControl for WebSocketRecorderClient {
    async fn request(&mut self, request_type: &str, data: Option<Value>) -> ReelResult<Value> {
        if self.closed {
            return Err(ReelError::protocol("connection already closed"));
        }

        let request_id = self.next_request_id.to_string();
        self.next_request_id += 1;

        tracing::debug!(request_type, %request_id, "Recorder request");
        self.send(protocol::request_frame(request_type, &request_id, data))
            .await?;

        let timeout = self.request_timeout;
        tokio::time::timeout(timeout, self.await_response(&request_id))
            .await
            .map_err(|_| {
                ReelError::protocol(format!(
                    "{request_type} timed out after {}s",
                    timeout.as_secs()
                ))
            })?
    }

    async fn close(&mut self) -> ReelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ReelError::protocol(format!("close failed: {e}")))
    }
}
