//! redpocket-watch: an unattended agent that watches live rooms for red
//! packet events and claims them with a pool of accounts.
//!
//! Each watched room gets a [`RoomMonitor`] that reacts to the room's event
//! feed, fans draws out across the [`AccountPool`], and tears itself down
//! after a period of inactivity.

pub mod account;
pub mod api;
pub mod claim;
pub mod clock;
pub mod config;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod feed;
pub mod heartbeat;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod relay;

#[cfg(test)]
mod testing;

pub use account::{Account, Operation, Request, Response};
pub use config::Config;
pub use discovery::{DiscoveryResult, RoomDiscoveryLoop};
pub use error::{Result, WatchError};
pub use monitor::{MonitorPhase, MonitorReport, RoomMonitor};
pub use pool::AccountPool;
