use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Room ids currently being watched, shared between discovery and monitors
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashSet<u64>>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an Arc-wrapped registry for sharing between tasks
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Mark `room_id` as watched; false if it already was
    pub async fn try_insert(&self, room_id: u64) -> bool {
        self.rooms.write().await.insert(room_id)
    }

    /// Forget `room_id` once its monitor has finished
    pub async fn remove(&self, room_id: u64) {
        self.rooms.write().await.remove(&room_id);
    }

    pub async fn contains(&self, room_id: u64) -> bool {
        self.rooms.read().await.contains(&room_id)
    }

    /// Number of rooms being watched
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
