//! In-memory collaborators shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::account::{Operation, Request};
use crate::api::{AreaRef, BagItem, LiveApi, RoomRef};
use crate::clock::Clock;
use crate::error::{Result, WatchError};
use crate::feed::{EventFeed, FeedCommand, FeedConnector};

/// Mock API that records every request with the (virtual) time it was made
pub struct MockApi {
    followed: Mutex<Vec<u64>>,
    failing: Mutex<HashSet<Operation>>,
    panicking: HashSet<Operation>,
    areas: Vec<u64>,
    rooms: HashMap<(u64, u32), Vec<RoomRef>>,
    room_areas: HashMap<u64, AreaRef>,
    heartbeat_interval: u64,
    log: Mutex<Vec<(Instant, Request)>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            followed: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: HashSet::new(),
            areas: Vec::new(),
            rooms: HashMap::new(),
            room_areas: HashMap::new(),
            heartbeat_interval: 60,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_followed(self, ids: Vec<u64>) -> Self {
        *self.followed.lock() = ids;
        self
    }

    pub fn failing(self, operation: Operation) -> Self {
        self.failing.lock().insert(operation);
        self
    }

    /// Panic inside calls to `operation`, after recording them
    pub fn panicking(mut self, operation: Operation) -> Self {
        self.panicking.insert(operation);
        self
    }

    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval = secs;
        self
    }

    pub fn with_areas(mut self, areas: Vec<u64>) -> Self {
        self.areas = areas;
        self
    }

    /// Rooms listed for `parent_area_id` on `page`
    pub fn with_rooms(mut self, parent_area_id: u64, page: u32, rooms: Vec<RoomRef>) -> Self {
        self.rooms.insert((parent_area_id, page), rooms);
        self
    }

    pub fn with_room_area(mut self, room_id: u64, area: AreaRef) -> Self {
        self.room_areas.insert(room_id, area);
        self
    }

    pub fn set_followed(&self, ids: Vec<u64>) {
        *self.followed.lock() = ids;
    }

    pub fn set_failing(&self, operation: Operation, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(operation);
        } else {
            set.remove(&operation);
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn timed_requests(&self) -> Vec<(Instant, Request)> {
        self.log.lock().clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(_, r)| r.operation() == operation)
            .count()
    }

    fn record(&self, request: Request) -> Result<()> {
        let operation = request.operation();
        self.log.lock().push((Instant::now(), request));
        if self.panicking.contains(&operation) {
            panic!("{:?} panicked", operation);
        }
        if self.failing.lock().contains(&operation) {
            return Err(WatchError::Api {
                code: -1,
                message: format!("{:?} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LiveApi for MockApi {
    async fn list_areas(&self, source_id: u32) -> Result<Vec<u64>> {
        self.record(Request::ListAreas { source_id })?;
        Ok(self.areas.clone())
    }

    async fn list_rooms_in_area(
        &self,
        parent_area_id: u64,
        area_id: u64,
        page: u32,
    ) -> Result<Vec<RoomRef>> {
        self.record(Request::ListRoomsInArea {
            parent_area_id,
            area_id,
            page,
        })?;
        Ok(self
            .rooms
            .get(&(parent_area_id, page))
            .cloned()
            .unwrap_or_default())
    }

    async fn room_area(&self, room_id: u64) -> Result<AreaRef> {
        self.record(Request::RoomArea { room_id })?;
        self.room_areas.get(&room_id).copied().ok_or(WatchError::Api {
            code: 19002001,
            message: "room not found".to_string(),
        })
    }

    async fn list_followed(&self) -> Result<Vec<u64>> {
        self.record(Request::ListFollowed)?;
        Ok(self.followed.lock().clone())
    }

    async fn list_bag_contents(&self) -> Result<Vec<BagItem>> {
        self.record(Request::ListBagContents)?;
        Ok(vec![BagItem {
            gift_name: "coin".to_string(),
            corner_mark: "7d".to_string(),
            count: 1,
        }])
    }

    async fn claim_reward(&self, lot_id: u64, room_id: u64, owner_id: u64) -> Result<()> {
        self.record(Request::ClaimReward {
            lot_id,
            room_id,
            owner_id,
        })
    }

    async fn set_follow(&self, target_id: u64, follow: bool) -> Result<()> {
        self.record(Request::SetFollow { target_id, follow })
    }

    async fn heartbeat(&self, interval_secs: u64, room_id: u64) -> Result<u64> {
        self.record(Request::Heartbeat {
            interval_secs,
            room_id,
        })?;
        Ok(self.heartbeat_interval)
    }
}

/// Feed fed from an in-process channel
pub struct ChannelFeed {
    rx: mpsc::Receiver<FeedCommand>,
    closed: Arc<AtomicBool>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<FeedCommand>) -> Self {
        Self {
            rx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once [`EventFeed::close`] has been called
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl EventFeed for ChannelFeed {
    async fn next_command(&mut self) -> Option<FeedCommand> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

/// Connector handing out pre-registered channel feeds
#[derive(Default)]
pub struct ChannelConnector {
    pending: Mutex<HashMap<u64, ChannelFeed>>,
    closed: Mutex<HashMap<u64, Arc<AtomicBool>>>,
}

impl ChannelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room; commands sent on the returned sender reach its feed
    pub fn register(&self, room_id: u64, buffer: usize) -> mpsc::Sender<FeedCommand> {
        let (tx, rx) = mpsc::channel(buffer);
        let feed = ChannelFeed::new(rx);
        self.closed.lock().insert(room_id, feed.closed_flag());
        self.pending.lock().insert(room_id, feed);
        tx
    }

    /// Whether the feed handed out for `room_id` has been closed
    pub fn is_closed(&self, room_id: u64) -> bool {
        self.closed
            .lock()
            .get(&room_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FeedConnector for ChannelConnector {
    async fn connect(&self, room_id: u64) -> Result<Box<dyn EventFeed>> {
        let feed = self.pending.lock().remove(&room_id);
        match feed {
            Some(feed) => Ok(Box::new(feed)),
            None => Err(WatchError::Feed(format!("no feed registered for room {room_id}"))),
        }
    }
}

/// A manually driven clock
#[derive(Debug, Default)]
pub struct FixedClock {
    secs: AtomicU64,
}

impl FixedClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(100);
        clock.advance(5);
        assert_eq!(clock.now_secs(), 105);
        clock.set(7);
        assert_eq!(clock.now_secs(), 7);
    }

    #[tokio::test]
    async fn test_channel_connector() {
        let connector = ChannelConnector::new();
        let tx = connector.register(1, 4);

        assert!(matches!(connector.connect(2).await, Err(WatchError::Feed(_))));

        let mut feed = connector.connect(1).await.unwrap();
        tx.send(FeedCommand::Other { cmd: "X".to_string() }).await.unwrap();
        assert_eq!(
            feed.next_command().await,
            Some(FeedCommand::Other { cmd: "X".to_string() })
        );

        assert!(!connector.is_closed(1));
        feed.close().await;
        assert!(connector.is_closed(1));
        assert_eq!(feed.next_command().await, None);
    }
}
