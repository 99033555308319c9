//! WebSocket server implementation.
//!
//! Accepts client connections, routes JSON-RPC requests to handlers and
//! forwards push notifications queued by the broadcaster.

use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::handlers::{
    handle_history, handle_info, handle_professional_get, handle_professional_list,
    handle_recent, handle_register, handle_slot_add, handle_slot_list, handle_slot_remove,
    handle_slot_update, handle_status_set, handle_subscribe, handle_unsubscribe, AppState,
};
use crate::protocol::{Request, Response};
use crate::registry::ConnectionId;
use crate::ticker::ScheduleTicker;
use crate::{ServerMessage, WelcomePayload};
use avail_store::{AvailabilityStore, FeedError};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Receiver;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Change feed error: {0}")]
    Feed(#[from] FeedError),
}

/// The availability WebSocket server.
pub struct AvailServer {
    config: ServerConfig,
    state: AppState,
}

impl AvailServer {
    /// Creates a new server that owns the given store.
    pub fn new(store: AvailabilityStore, config: ServerConfig) -> Self {
        Self::new_with_shared(Arc::new(store), config)
    }

    /// Creates a server around an already shared store.
    pub fn new_with_shared(store: Arc<AvailabilityStore>, config: ServerConfig) -> Self {
        Self {
            config,
            state: AppState::new(store),
        }
    }

    /// Returns the shared state (store and connection registry).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Binds the configured address and serves forever.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        self.run_on(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// Starts the broadcaster (and the schedule ticker, when enabled), then
    /// accepts connections forever. Fails if the store's change stream was
    /// already taken.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        let changes = self.state.store.take_changes()?;
        let broadcaster = Broadcaster::new(self.state.registry.clone());
        tokio::spawn(broadcaster.run(changes));

        if self.config.schedule_tick_secs > 0 {
            let ticker = ScheduleTicker::new(
                self.state.store.clone(),
                Duration::from_secs(self.config.schedule_tick_secs),
            );
            tokio::spawn(ticker.run());
        }

        info!(
            "Availability server listening on ws://{}",
            listener.local_addr()?
        );

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handles a single WebSocket connection.
///
/// Whatever way the session ends, the connection is removed from the
/// registry afterwards.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: AppState,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    let (connection, outbound) = state.registry.connect().await;
    info!("WebSocket connection established with {} as {}", addr, connection);

    let result = run_session(ws_stream, addr, connection, outbound, &state).await;

    let dropped = state.registry.drop_connection(connection).await;
    info!(
        "Connection closed: {} ({} subscriptions released)",
        addr, dropped
    );
    result
}

async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    addr: SocketAddr,
    connection: ConnectionId,
    mut outbound: Receiver<String>,
    state: &AppState,
) -> Result<(), ServerError> {
    let (mut write, mut read) = ws_stream.split();

    let welcome = ServerMessage::Welcome(WelcomePayload {
        connection_id: connection.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        last_sequence: state.store.last_sequence(),
    });
    write
        .send(Message::Text(serde_json::to_string(&welcome)?))
        .await?;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = process_message(&text, state, connection).await {
                            let json = serde_json::to_string(&response)?;
                            write.send(Message::Text(json)).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Message error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                }
            }

            notification = outbound.recv() => {
                match notification {
                    Some(json) => write.send(Message::Text(json)).await?,
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Missing params are read as an empty object, so methods whose params
/// all have defaults can be called without any.
fn parse_params<T: DeserializeOwned>(id: &Option<Value>, params: Value) -> Result<T, Response> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| Response::invalid_params(id.clone(), e.to_string()))
}

/// Processes a JSON-RPC message and returns the response to send.
///
/// A request without an id is a notification: it is executed, but no
/// response is sent. Messages that do not parse as a request are always
/// answered.
pub(crate) async fn process_message(
    text: &str,
    state: &AppState,
    connection: ConnectionId,
) -> Option<Response> {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => return Some(Response::parse_error()),
    };

    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return Some(Response::invalid_request(id, "jsonrpc must be \"2.0\""));
    }

    let notification = id.is_none();
    let method = request.method.as_str();
    debug!("{} -> {}", connection, method);

    macro_rules! with_params {
        ($handler:expr) => {
            match parse_params(&id, request.params) {
                Ok(params) => $handler(params).await,
                Err(response) => response,
            }
        };
    }

    let response = match method {
        "server.info" => handle_info(state, id).await,

        "professional.register" => with_params!(|p| handle_register(state, id.clone(), p)),
        "professional.get" | "status.get" => {
            with_params!(|p| handle_professional_get(state, id.clone(), p))
        }
        "professional.list" => handle_professional_list(state, id).await,

        "status.set" => with_params!(|p| handle_status_set(state, id.clone(), p)),
        "status.history" => with_params!(|p| handle_history(state, id.clone(), p)),
        "status.recent" => with_params!(|p| handle_recent(state, id.clone(), p)),

        "subscribe" => with_params!(|p| handle_subscribe(state, connection, id.clone(), p)),
        "unsubscribe" => with_params!(|p| handle_unsubscribe(state, connection, id.clone(), p)),

        "schedule.add" => with_params!(|p| handle_slot_add(state, id.clone(), p)),
        "schedule.update" => with_params!(|p| handle_slot_update(state, id.clone(), p)),
        "schedule.remove" => with_params!(|p| handle_slot_remove(state, id.clone(), p)),
        "schedule.list" => with_params!(|p| handle_slot_list(state, id.clone(), p)),

        _ => Response::method_not_found(id, method),
    };

    if notification {
        debug!("{} notification {} handled", connection, method);
        return None;
    }
    Some(response)
}
