use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::api::RoomRef;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::feed::FeedConnector;
use crate::monitor::RoomMonitor;
use crate::pool::AccountPool;
use crate::registry::RoomRegistry;

/// Result of the discovery loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryResult {
    /// Single pass finished and every monitor it started has closed
    Completed {
        /// Number of scans performed
        scans: u32,
        /// Number of monitors started
        monitors: u32,
    },
    /// Shutdown was requested
    Shutdown { scans: u32, monitors: u32 },
}

/// Lists live rooms and starts one monitor per newly seen room
pub struct RoomDiscoveryLoop {
    config: Arc<Config>,
    announcer: Account,
    pool: Arc<AccountPool>,
    connector: Arc<dyn FeedConnector>,
    registry: Arc<RoomRegistry>,
    clock: Arc<dyn Clock>,
    monitors: JoinSet<()>,
}

impl RoomDiscoveryLoop {
    /// Create a new discovery loop; `announcer` lists areas and rooms
    pub fn new(
        config: Config,
        announcer: Account,
        pool: Arc<AccountPool>,
        connector: Arc<dyn FeedConnector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            announcer,
            pool,
            connector,
            registry: RoomRegistry::new_shared(),
            clock: Arc::new(SystemClock),
            monitors: JoinSet::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get a reference to the registry of watched rooms
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Scan, then keep rescanning if configured, until done or shut down
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> DiscoveryResult {
        let mut scans = 0;
        let mut monitors = 0;

        match self.config.discovery.rescan_interval_secs {
            None => {
                scans += 1;
                monitors += self.scan().await;
                loop {
                    tokio::select! {
                        joined = self.monitors.join_next() => {
                            if joined.is_none() {
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            self.monitors.abort_all();
                            return DiscoveryResult::Shutdown { scans, monitors };
                        }
                    }
                }
                info!("All monitors closed after {} scan(s)", scans);
                DiscoveryResult::Completed { scans, monitors }
            }
            Some(secs) => {
                let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            scans += 1;
                            monitors += self.scan().await;
                        }
                        Some(_) = self.monitors.join_next(), if !self.monitors.is_empty() => {}
                        _ = shutdown_rx.recv() => {
                            self.monitors.abort_all();
                            return DiscoveryResult::Shutdown { scans, monitors };
                        }
                    }
                }
            }
        }
    }

    /// One pass over the room lists; returns the number of monitors started
    pub async fn scan(&mut self) -> u32 {
        let discovery = &self.config.discovery;
        let areas = match discovery.focus_room {
            Some(room_id) => match self.announcer.room_area(room_id).await {
                Some(area) => vec![(area.parent_area_id, area.area_id)],
                None => {
                    warn!(room_id, "could not resolve focus room area, scanning all areas");
                    self.all_areas().await
                }
            },
            None => self.all_areas().await,
        };
        info!("Scanning {} area(s)", areas.len());

        let mut started = 0;
        for (parent_area_id, area_id) in areas {
            for page in 1..=self.config.discovery.pages {
                let rooms = self
                    .announcer
                    .list_rooms_in_area(parent_area_id, area_id, page)
                    .await;
                debug!(parent_area_id, area_id, page, "{} room(s)", rooms.len());
                for room in rooms {
                    if self.registry.try_insert(room.room_id).await {
                        self.spawn_monitor(room);
                        started += 1;
                    }
                }
            }
        }
        info!(
            "Scan started {} monitor(s), watching {} room(s)",
            started,
            self.registry.len().await
        );
        started
    }

    async fn all_areas(&self) -> Vec<(u64, u64)> {
        self.announcer
            .list_areas(self.config.discovery.source_id)
            .await
            .into_iter()
            .map(|parent_area_id| (parent_area_id, 0))
            .collect()
    }

    fn spawn_monitor(&mut self, room: RoomRef) {
        let monitor = RoomMonitor::new(room, Arc::clone(&self.pool))
            .with_config(self.config.monitor.clone())
            .with_heartbeat(self.config.heartbeat.clone())
            .with_clock(Arc::clone(&self.clock));
        let connector = Arc::clone(&self.connector);
        let registry = Arc::clone(&self.registry);

        self.monitors.spawn(async move {
            match monitor.run(connector.as_ref()).await {
                Ok(report) => info!(
                    room_id = room.room_id,
                    draws = report.outcomes.len(),
                    unfollowed = report.unfollowed.len(),
                    "monitor finished"
                ),
                Err(e) => error!(room_id = room.room_id, "monitor failed: {}", e),
            }
            registry.remove(room.room_id).await;
        });
    }
}
