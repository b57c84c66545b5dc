//! Web heartbeat loops.
//!
//! While a room is armed every account keeps sending heartbeats for it, each
//! account on its own schedule. The server answers with the interval it wants
//! until the next beat; on failure the configured fallback is used.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::account::Account;
use crate::config::HeartbeatConfig;
use crate::pool::AccountPool;

/// The set of heartbeat loops belonging to one monitor
#[derive(Debug, Default)]
pub struct HeartbeatLoops {
    token: CancellationToken,
    tasks: JoinSet<u64>,
    started: bool,
}

impl HeartbeatLoops {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.token.is_cancelled()
    }

    /// Start one loop per account; does nothing if already started.
    /// Returns whether loops were started by this call.
    pub fn start(&mut self, pool: &AccountPool, room_id: u64, config: &HeartbeatConfig) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        for account in pool.iter() {
            self.tasks.spawn(beat(
                Arc::clone(account),
                room_id,
                config.clone(),
                self.token.clone(),
            )
            .in_current_span());
        }
        true
    }

    /// Cancel every loop and wait for them to exit; returns total beats sent
    pub async fn stop(&mut self) -> u64 {
        self.token.cancel();
        let mut beats = 0;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(count) => beats += count,
                Err(e) => warn!("heartbeat task failed: {}", e),
            }
        }
        beats
    }
}

async fn beat(
    account: Arc<Account>,
    room_id: u64,
    config: HeartbeatConfig,
    token: CancellationToken,
) -> u64 {
    let mut interval = config.initial_interval_secs;
    let mut beats = 0;
    while !token.is_cancelled() {
        interval = account
            .heartbeat(interval, room_id)
            .await
            .unwrap_or(config.fallback_interval_secs)
            .max(1);
        beats += 1;
        debug!(account_id = account.id(), room_id, "web heartbeat, next in {}s", interval);

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }
    beats
}
