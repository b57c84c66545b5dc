//! Per-room red packet monitor.
//!
//! A monitor opens the room's event feed and stays connected for a keep-alive
//! window. A qualifying red packet arms it: heartbeats start, a delayed draw
//! is scheduled for every account, and the window is pushed out past the
//! packet's removal time. When the window expires the monitor stops its
//! heartbeats, undoes follows it may have caused, and closes the feed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::account::Request;
use crate::api::RoomRef;
use crate::claim::{delayed_fan_out, jitter_delay, ClaimOutcome, ClaimTicket};
use crate::clock::{clamped_millis, Clock, SystemClock};
use crate::config::{HeartbeatConfig, MonitorConfig};
use crate::error::Result;
use crate::feed::{EventFeed, FeedCommand, FeedConnector, RedPocketStart, WinnerList};
use crate::heartbeat::HeartbeatLoops;
use crate::pool::AccountPool;

/// Lifecycle of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    /// Connected, no draw pending
    Watching,
    /// At least one draw is scheduled
    Armed,
    Closing,
    Closed,
}

/// Summary of one monitor's lifetime
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub room: RoomRef,
    /// Red packets above the price limit
    pub qualifying_events: u32,
    /// Outcomes of every draw that fired, one entry per account per draw
    pub outcomes: Vec<ClaimOutcome>,
    pub has_claimed: bool,
    /// Accounts whose follow of the owner was reverted
    pub unfollowed: Vec<u64>,
    /// Pool accounts seen in winner lists
    pub winners: Vec<u64>,
    pub heartbeats: u64,
    pub phase: MonitorPhase,
}

/// Inactivity window after a packet: time until its removal plus `close_after_ms`
pub fn keep_alive_window(remove_deadline_secs: u64, now_secs: u64, close_after_ms: u64) -> Duration {
    let remaining_ms = (i128::from(remove_deadline_secs) - i128::from(now_secs)) * 1000;
    clamped_millis(remaining_ms + i128::from(close_after_ms))
}

/// Deadline `window` from now, capped where `Instant` would overflow
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Watches one room for red packets
pub struct RoomMonitor {
    room: RoomRef,
    pool: Arc<AccountPool>,
    config: MonitorConfig,
    heartbeat_config: HeartbeatConfig,
    clock: Arc<dyn Clock>,
    phase: MonitorPhase,
    has_claimed: bool,
    /// Removal deadline of the latest packet, epoch seconds (0 = none yet)
    remove_deadline: u64,
    qualifying_events: u32,
    heartbeats: HeartbeatLoops,
    draws: JoinSet<Vec<ClaimOutcome>>,
    outcomes: Vec<ClaimOutcome>,
    winners: Vec<u64>,
}

impl RoomMonitor {
    /// Create a new monitor with default settings
    pub fn new(room: RoomRef, pool: Arc<AccountPool>) -> Self {
        Self {
            room,
            pool,
            config: MonitorConfig::default(),
            heartbeat_config: HeartbeatConfig::default(),
            clock: Arc::new(SystemClock),
            phase: MonitorPhase::Idle,
            has_claimed: false,
            remove_deadline: 0,
            qualifying_events: 0,
            heartbeats: HeartbeatLoops::new(),
            draws: JoinSet::new(),
            outcomes: Vec::new(),
            winners: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat_config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_total_price_limit(mut self, limit: u64) -> Self {
        self.config.total_price_limit = limit;
        self
    }

    /// Base draw delay in seconds
    pub fn set_draw_delay(mut self, secs: u64) -> Self {
        self.config.draw_delay_secs = secs;
        self
    }

    pub fn room(&self) -> RoomRef {
        self.room
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// Watch the room until the inactivity window runs out.
    ///
    /// Fails only if the feed cannot be opened.
    pub async fn run(self, connector: &dyn FeedConnector) -> Result<MonitorReport> {
        let span = info_span!("room", room_id = self.room.room_id, owner_id = self.room.owner_id);
        self.watch(connector).instrument(span).await
    }

    async fn watch(mut self, connector: &dyn FeedConnector) -> Result<MonitorReport> {
        let window = Duration::from_millis(self.config.close_after_ms);
        let inactivity = tokio::time::sleep(window);
        tokio::pin!(inactivity);
        info!("will disconnect in {}ms", window.as_millis());

        let mut feed = connector.connect(self.room.room_id).await?;
        self.phase = MonitorPhase::Watching;

        let mut feed_open = true;
        loop {
            tokio::select! {
                _ = &mut inactivity => break,
                command = feed.next_command(), if feed_open => match command {
                    Some(command) => {
                        if let Some(window) = self.handle(command) {
                            inactivity.as_mut().reset(deadline_after(window));
                            info!("will disconnect in {}ms", window.as_millis());
                        }
                    }
                    None => {
                        warn!("event feed ended, waiting out the inactivity window");
                        feed_open = false;
                    }
                },
                Some(joined) = self.draws.join_next(), if !self.draws.is_empty() => {
                    self.collect_draw(joined);
                    if self.draws.is_empty() {
                        self.phase = MonitorPhase::Watching;
                    }
                }
            }
        }

        self.close(feed.as_mut()).await
    }

    /// Apply one command; returns the new inactivity window if it was re-armed
    fn handle(&mut self, command: FeedCommand) -> Option<Duration> {
        match command {
            FeedCommand::RedPocketStart(event) => self.on_red_pocket(event),
            FeedCommand::WinnerList(list) => {
                self.on_winner_list(&list);
                None
            }
            FeedCommand::Other { cmd } => {
                trace!("ignoring {}", cmd);
                None
            }
        }
    }

    fn on_red_pocket(&mut self, event: RedPocketStart) -> Option<Duration> {
        if event.total_price <= self.config.total_price_limit {
            debug!(
                lot_id = event.lot_id,
                "red packet {} <= {}, ignored", event.total_price, self.config.total_price_limit
            );
            return None;
        }
        info!(
            lot_id = event.lot_id,
            total_price = event.total_price,
            last_time = event.last_time,
            remove_time = event.remove_time,
            "red packet"
        );

        self.has_claimed = true;
        self.qualifying_events += 1;
        self.phase = MonitorPhase::Armed;
        if self
            .heartbeats
            .start(&self.pool, self.room.room_id, &self.heartbeat_config)
        {
            info!("web heartbeat started for {} account(s)", self.pool.len());
        }

        let now = self.clock.now_secs();
        let delay = jitter_delay(
            self.config.draw_delay_secs,
            event.last_time,
            self.remove_deadline,
            now,
        );
        let ticket = ClaimTicket {
            lot_id: event.lot_id,
            room_id: self.room.room_id,
            owner_id: self.room.owner_id,
        };
        self.draws
            .spawn(delayed_fan_out(Arc::clone(&self.pool), ticket, delay).in_current_span());
        info!(lot_id = event.lot_id, "draw in {}ms", delay.as_millis());

        self.remove_deadline = event.remove_time;
        Some(keep_alive_window(
            self.remove_deadline,
            now,
            self.config.close_after_ms,
        ))
    }

    fn on_winner_list(&mut self, list: &WinnerList) {
        match self.pool.find_winner(&list.ids()) {
            Some(account_id) => {
                info!(account_id, "red packet won");
                self.winners.push(account_id);
            }
            None => info!("no pool account among {} winner(s)", list.winner_info.len()),
        }
    }

    async fn close(mut self, feed: &mut dyn EventFeed) -> Result<MonitorReport> {
        self.phase = MonitorPhase::Closing;
        let heartbeats = self.heartbeats.stop().await;

        while let Some(joined) = self.draws.join_next().await {
            self.collect_draw(joined);
        }

        let unfollowed = self.revert_follows().await;
        feed.close().await;
        self.phase = MonitorPhase::Closed;
        info!(
            qualifying_events = self.qualifying_events,
            draws = self.outcomes.len(),
            "disconnected"
        );

        Ok(MonitorReport {
            room: self.room,
            qualifying_events: self.qualifying_events,
            outcomes: self.outcomes,
            has_claimed: self.has_claimed,
            unfollowed,
            winners: self.winners,
            heartbeats,
            phase: self.phase,
        })
    }

    fn collect_draw(&mut self, joined: std::result::Result<Vec<ClaimOutcome>, JoinError>) {
        match joined {
            Ok(outcomes) => self.outcomes.extend(outcomes),
            Err(e) => warn!("draw task failed: {}", e),
        }
    }

    /// Unfollow the owner for every account that did not follow it before
    async fn revert_follows(&self) -> Vec<u64> {
        if !self.has_claimed {
            return Vec::new();
        }
        let owner_id = self.room.owner_id;
        let reverts = self.pool.iter().filter_map(|account| {
            match account.cached_follows(owner_id) {
                Some(false) => {
                    if account.is_degraded(&Request::ListFollowed) {
                        warn!(
                            account_id = account.id(),
                            "follow list warm-up had failed, unfollowing anyway"
                        );
                    }
                    Some(async move {
                        account.set_follow(owner_id, false).await.then_some(account.id())
                    })
                }
                Some(true) => None,
                None => {
                    warn!(account_id = account.id(), "follow list not cached, keeping follow");
                    None
                }
            }
        });
        join_all(reverts).await.into_iter().flatten().collect()
    }
}
