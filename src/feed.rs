//! Room event feed.
//!
//! The feed delivers already-decoded room commands as JSON objects of the
//! form `{ "cmd": "...", "data": { ... } }`. Only two commands matter to the
//! monitor:
//! - `POPULARITY_RED_POCKET_START`: a red packet was dropped in the room
//! - `POPULARITY_RED_POCKET_WINNER_LIST`: the draw for a lot has finished

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WatchError};

/// A red packet drop
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedPocketStart {
    /// Declared total value of the packet
    pub total_price: u64,
    pub lot_id: u64,
    /// Claim window in seconds
    pub last_time: u64,
    /// Absolute removal deadline, epoch seconds
    pub remove_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Winner {
    #[serde(alias = "account_id")]
    pub uid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WinnerList {
    #[serde(default)]
    pub winner_info: Vec<Winner>,
}

impl WinnerList {
    pub fn ids(&self) -> Vec<u64> {
        self.winner_info.iter().map(|w| w.uid).collect()
    }
}

/// A decoded room command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    RedPocketStart(RedPocketStart),
    WinnerList(WinnerList),
    /// Any other command (for forward compatibility)
    Other { cmd: String },
}

impl FeedCommand {
    /// Parse one JSON command
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| WatchError::Decode(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let cmd = value
            .get("cmd")
            .and_then(|c| c.as_str())
            .ok_or_else(|| WatchError::Decode("command has no cmd field".to_string()))?;
        // Some commands carry a ":"-separated version suffix
        let name = cmd.split(':').next().unwrap_or(cmd);

        match name {
            "POPULARITY_RED_POCKET_START" | "RED_POCKET_START" => {
                let data = Self::data(&value)?;
                Ok(FeedCommand::RedPocketStart(
                    serde_json::from_value(data).map_err(|e| WatchError::Decode(e.to_string()))?,
                ))
            }
            "POPULARITY_RED_POCKET_WINNER_LIST" | "WINNER_LIST" => {
                let data = Self::data(&value)?;
                Ok(FeedCommand::WinnerList(
                    serde_json::from_value(data).map_err(|e| WatchError::Decode(e.to_string()))?,
                ))
            }
            _ => Ok(FeedCommand::Other {
                cmd: name.to_string(),
            }),
        }
    }

    fn data(value: &Value) -> Result<Value> {
        value
            .get("data")
            .cloned()
            .ok_or_else(|| WatchError::Decode("command has no data field".to_string()))
    }
}

/// One open subscription to a room's commands
#[async_trait]
pub trait EventFeed: Send {
    /// Next command, or `None` once the feed has ended
    async fn next_command(&mut self) -> Option<FeedCommand>;

    /// Close the underlying connection
    async fn close(&mut self);
}

/// Opens event feeds for rooms
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, room_id: u64) -> Result<Box<dyn EventFeed>>;
}
