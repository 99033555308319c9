//! Client for the Availability Protocol.
//!
//! Used by the CLI to talk to a running server. Push notifications that
//! arrive while a call is waiting for its response are queued and handed
//! out by [`RpcClient::next_message`].

use crate::protocol::{Request, Response};
use crate::ServerMessage;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Connection closed by server")]
    Closed,
}

enum Frame {
    Response(Response),
    Push(ServerMessage),
}

pub struct RpcClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    pushed: VecDeque<ServerMessage>,
}

impl RpcClient {
    /// Connects to `url` (e.g. `ws://127.0.0.1:7440`).
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await?;
        debug!("Connected to {}", url);
        Ok(Self {
            ws,
            next_id: 1,
            pushed: VecDeque::new(),
        })
    }

    /// Sends a request and waits for its result.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request::new(id, method, params);
        self.ws
            .send(Message::Text(serde_json::to_string(&request)?))
            .await?;

        loop {
            match self.read_frame().await? {
                Frame::Push(msg) => self.pushed.push_back(msg),
                Frame::Response(resp) if resp.id == Some(Value::from(id)) => {
                    if let Some(err) = resp.error {
                        return Err(ClientError::Rpc {
                            code: err.code,
                            message: err.message,
                        });
                    }
                    return Ok(resp.result.unwrap_or(Value::Null));
                }
                Frame::Response(resp) => {
                    debug!("Ignoring response for id {:?}", resp.id);
                }
            }
        }
    }

    /// Returns the next push message, waiting if none is queued.
    pub async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        if let Some(msg) = self.pushed.pop_front() {
            return Ok(msg);
        }

        loop {
            if let Frame::Push(msg) = self.read_frame().await? {
                return Ok(msg);
            }
        }
    }

    /// Sends a close frame.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        loop {
            let msg = match self.ws.next().await {
                Some(msg) => msg?,
                None => return Err(ClientError::Closed),
            };

            match msg {
                Message::Text(text) => {
                    let value: Value = serde_json::from_str(&text)?;
                    if value.get("jsonrpc").is_some() {
                        return Ok(Frame::Response(serde_json::from_value(value)?));
                    }
                    return Ok(Frame::Push(serde_json::from_value(value)?));
                }
                Message::Ping(data) => self.ws.send(Message::Pong(data)).await?,
                Message::Close(_) => return Err(ClientError::Closed),
                _ => {}
            }
        }
    }
}
