//! Command relay over WebSocket.
//!
//! The relay does the platform-side framing and decompression and forwards
//! each room command as one JSON text frame.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};
use crate::feed::{EventFeed, FeedCommand, FeedConnector};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `{room_id}`-templated relay URLs
#[derive(Debug, Clone)]
pub struct RelayConnector {
    url_template: String,
}

impl RelayConnector {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
        }
    }

    pub fn url_for(&self, room_id: u64) -> String {
        self.url_template
            .replace("{room_id}", &room_id.to_string())
    }
}

#[async_trait]
impl FeedConnector for RelayConnector {
    async fn connect(&self, room_id: u64) -> Result<Box<dyn EventFeed>> {
        let url = self.url_for(room_id);
        debug!("Connecting to relay: {}", url);

        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| WatchError::Feed(format!("failed to connect to {}: {}", url, e)))?;
        info!(room_id, "relay connected, response: {:?}", response.status());

        Ok(Box::new(RelayFeed { stream }))
    }
}

/// One room's command stream from the relay
pub struct RelayFeed {
    stream: WsStream,
}

#[async_trait]
impl EventFeed for RelayFeed {
    async fn next_command(&mut self) -> Option<FeedCommand> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match FeedCommand::parse(text.as_str()) {
                    Ok(command) => return Some(command),
                    Err(e) => debug!("Skipping undecodable frame: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    info!("Relay close frame received: {:?}", frame);
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    warn!("Received unexpected binary message: {} bytes", data.len());
                }
                // ping/pong are answered by tungstenite
                Ok(_) => {}
                Err(e) => {
                    warn!("Relay error: {}", e);
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Relay close failed: {}", e);
        }
    }
}
