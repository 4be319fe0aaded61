//! WebSocket head subscription
//!
//! Connects to a chain's WebSocket endpoint, subscribes to `newHeads`, and
//! exposes the announcements as a pull-based stream. Connection loss
//! terminates the stream with a connectivity error; the live subscriber
//! reconnects by calling `connect` again and receives only heads announced
//! after the reconnection.

use crate::error::ClientError;
use alloy_primitives::B256;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// A new-head announcement: block number plus hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub number: u64,
    pub hash: B256,
}

/// Pull-based sequence of head announcements for one connection.
#[async_trait]
pub trait HeadStream: Send {
    /// Wait for the next announcement. Errors are terminal for this
    /// stream; the caller reconnects through the connector.
    async fn next_head(&mut self) -> Result<Head, ClientError>;
}

/// Factory for head streams; one fresh stream per (re)connection.
#[async_trait]
pub trait HeadConnector: Send + Sync {
    type Stream: HeadStream;

    async fn connect(&self) -> Result<Self::Stream, ClientError>;
}

/// `newHeads` subscription over tokio-tungstenite.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl HeadConnector for WsConnector {
    type Stream = WsHeadStream;

    async fn connect(&self) -> Result<WsHeadStream, ClientError> {
        let (mut ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connectivity(format!("ws connect failed: {}", e)))?;

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"]
        });
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| ClientError::Connectivity(format!("ws subscribe failed: {}", e)))?;

        info!(url = %self.url, "subscribed to newHeads");
        Ok(WsHeadStream { ws })
    }
}

pub struct WsHeadStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl HeadStream for WsHeadStream {
    async fn next_head(&mut self) -> Result<Head, ClientError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(head) = parse_head_message(&text)? {
                        return Ok(head);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.ws
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| ClientError::Connectivity(format!("ws pong failed: {}", e)))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(ClientError::Connectivity(format!(
                        "ws closed by server: {:?}",
                        frame
                    )));
                }
                Some(Ok(_)) => {} // Binary, Pong, Frame
                Some(Err(e)) => {
                    return Err(ClientError::Connectivity(format!("ws read failed: {}", e)));
                }
                None => {
                    return Err(ClientError::Connectivity("ws stream ended".into()));
                }
            }
        }
    }
}

/// Parse one WebSocket text message.
///
/// Returns `Ok(None)` for the subscription confirmation and anything else
/// that is not a head notification. The notification shape is:
/// `{ "method": "eth_subscription", "params": { "result": { "number": "0x..", "hash": "0x.." } } }`
fn parse_head_message(text: &str) -> Result<Option<Head>, ClientError> {
    let msg: Value = serde_json::from_str(text)
        .map_err(|e| ClientError::Rpc(format!("ws message is not JSON: {}", e)))?;

    if let Some(error) = msg.get("error") {
        return Err(ClientError::Rpc(format!("subscription error: {}", error)));
    }

    let Some(result) = msg.get("params").and_then(|p| p.get("result")) else {
        debug!("ignoring non-notification ws message");
        return Ok(None);
    };

    let number_str = result
        .get("number")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Rpc("head notification missing 'number'".into()))?;
    let number_str = number_str.strip_prefix("0x").unwrap_or(number_str);
    let number = u64::from_str_radix(number_str, 16)
        .map_err(|e| ClientError::Rpc(format!("bad head number {:?}: {}", number_str, e)))?;

    let hash_str = result
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Rpc("head notification missing 'hash'".into()))?;
    let hash: B256 = hash_str
        .parse()
        .map_err(|e| ClientError::Rpc(format!("bad head hash {:?}: {}", hash_str, e)))?;

    Ok(Some(Head { number, hash }))
}
