//! One authenticated identity and its memoized API results.
//!
//! Every remote operation goes through [`Account::call`], which never fails:
//! API and transport errors are logged and replaced by an empty/false
//! [`Response`], so callers in the monitor only ever branch on data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::{AreaRef, BagItem, HttpLiveApi, LiveApi, RoomRef};
use crate::config::ApiConfig;
use crate::credential::Credential;
use crate::error::Result;

/// Tag identifying one of the fixed remote operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListAreas,
    ListRoomsInArea,
    RoomArea,
    ListFollowed,
    ListBagContents,
    ClaimReward,
    SetFollow,
    Heartbeat,
}

/// A remote operation together with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListAreas {
        source_id: u32,
    },
    ListRoomsInArea {
        parent_area_id: u64,
        area_id: u64,
        page: u32,
    },
    RoomArea {
        room_id: u64,
    },
    ListFollowed,
    ListBagContents,
    ClaimReward {
        lot_id: u64,
        room_id: u64,
        owner_id: u64,
    },
    SetFollow {
        target_id: u64,
        follow: bool,
    },
    Heartbeat {
        interval_secs: u64,
        room_id: u64,
    },
}

/// Cache key: operation tag plus the canonical JSON encoding of the arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: Operation,
    pub args: String,
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::ListAreas { .. } => Operation::ListAreas,
            Request::ListRoomsInArea { .. } => Operation::ListRoomsInArea,
            Request::RoomArea { .. } => Operation::RoomArea,
            Request::ListFollowed => Operation::ListFollowed,
            Request::ListBagContents => Operation::ListBagContents,
            Request::ClaimReward { .. } => Operation::ClaimReward,
            Request::SetFollow { .. } => Operation::SetFollow,
            Request::Heartbeat { .. } => Operation::Heartbeat,
        }
    }

    /// Positional arguments as a JSON array, e.g. `[7,100,200]`
    pub fn encoded_args(&self) -> String {
        let args = match *self {
            Request::ListAreas { source_id } => json!([source_id]),
            Request::ListRoomsInArea {
                parent_area_id,
                area_id,
                page,
            } => json!([parent_area_id, area_id, page]),
            Request::RoomArea { room_id } => json!([room_id]),
            Request::ListFollowed | Request::ListBagContents => json!([]),
            Request::ClaimReward {
                lot_id,
                room_id,
                owner_id,
            } => json!([lot_id, room_id, owner_id]),
            Request::SetFollow { target_id, follow } => json!([target_id, follow]),
            Request::Heartbeat {
                interval_secs,
                room_id,
            } => json!([interval_secs, room_id]),
        };
        args.to_string()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            operation: self.operation(),
            args: self.encoded_args(),
        }
    }
}

/// Result of a remote operation, already degraded on failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Areas(Vec<u64>),
    Rooms(Vec<RoomRef>),
    Area(Option<AreaRef>),
    Followed(Vec<u64>),
    Bag(Vec<BagItem>),
    Claimed(bool),
    FollowSet(bool),
    /// Next heartbeat interval; `None` when the heartbeat failed
    NextInterval(Option<u64>),
}

impl Response {
    /// The sentinel returned when `operation` fails
    pub fn empty(operation: Operation) -> Self {
        match operation {
            Operation::ListAreas => Response::Areas(Vec::new()),
            Operation::ListRoomsInArea => Response::Rooms(Vec::new()),
            Operation::RoomArea => Response::Area(None),
            Operation::ListFollowed => Response::Followed(Vec::new()),
            Operation::ListBagContents => Response::Bag(Vec::new()),
            Operation::ClaimReward => Response::Claimed(false),
            Operation::SetFollow => Response::FollowSet(false),
            Operation::Heartbeat => Response::NextInterval(None),
        }
    }
}

/// An authenticated identity participating in claims
pub struct Account {
    id: u64,
    api: Arc<dyn LiveApi>,
    cache: RwLock<HashMap<CacheKey, Response>>,
    /// Entries stored after a failed warm-up
    degraded: RwLock<HashSet<CacheKey>>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl Account {
    pub fn new(id: u64, api: Arc<dyn LiveApi>) -> Self {
        Self {
            id,
            api,
            cache: RwLock::new(HashMap::new()),
            degraded: RwLock::new(HashSet::new()),
        }
    }

    /// Build an account backed by the HTTP API from a session cookie
    pub fn from_cookie(config: &ApiConfig, cookie: &str) -> Result<Self> {
        let credential = Credential::parse(cookie);
        let id = credential.account_id()?;
        let api = HttpLiveApi::new(config, &credential)?;
        Ok(Self::new(id, Arc::new(api)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run one remote operation; failures are logged and degrade to
    /// [`Response::empty`]
    pub async fn call(&self, request: &Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    account_id = self.id,
                    operation = ?request.operation(),
                    "{}",
                    e
                );
                Response::empty(request.operation())
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Response> {
        let api = &self.api;
        let response = match *request {
            Request::ListAreas { source_id } => Response::Areas(api.list_areas(source_id).await?),
            Request::ListRoomsInArea {
                parent_area_id,
                area_id,
                page,
            } => Response::Rooms(
                api.list_rooms_in_area(parent_area_id, area_id, page)
                    .await?,
            ),
            Request::RoomArea { room_id } => Response::Area(Some(api.room_area(room_id).await?)),
            Request::ListFollowed => Response::Followed(api.list_followed().await?),
            Request::ListBagContents => Response::Bag(api.list_bag_contents().await?),
            Request::ClaimReward {
                lot_id,
                room_id,
                owner_id,
            } => {
                api.claim_reward(lot_id, room_id, owner_id).await?;
                Response::Claimed(true)
            }
            Request::SetFollow { target_id, follow } => {
                api.set_follow(target_id, follow).await?;
                Response::FollowSet(true)
            }
            Request::Heartbeat {
                interval_secs,
                room_id,
            } => Response::NextInterval(Some(api.heartbeat(interval_secs, room_id).await?)),
        };
        Ok(response)
    }

    /// Previously stored result for `request`; never triggers a fetch
    pub fn cached(&self, request: &Request) -> Option<Response> {
        self.cache.read().get(&request.cache_key()).cloned()
    }

    /// Run `request` and store its result, replacing any earlier entry.
    ///
    /// A failed call stores the empty result and marks the entry degraded.
    pub async fn warm_cache(&self, request: Request) -> &Self {
        let key = request.cache_key();
        let response = match self.dispatch(&request).await {
            Ok(response) => {
                debug!(
                    account_id = self.id,
                    operation = ?request.operation(),
                    "cached {}",
                    request.encoded_args()
                );
                self.degraded.write().remove(&key);
                response
            }
            Err(e) => {
                warn!(
                    account_id = self.id,
                    operation = ?request.operation(),
                    "warm-up failed, caching an empty result: {}",
                    e
                );
                self.degraded.write().insert(key.clone());
                Response::empty(request.operation())
            }
        };
        self.cache.write().insert(key, response);
        self
    }

    /// Whether the cached entry for `request` came from a failed warm-up
    pub fn is_degraded(&self, request: &Request) -> bool {
        self.degraded.read().contains(&request.cache_key())
    }

    /// Whether the cached follow list contains `target_id`;
    /// `None` if the follow list was never cached
    pub fn cached_follows(&self, target_id: u64) -> Option<bool> {
        match self.cached(&Request::ListFollowed)? {
            Response::Followed(ids) => Some(ids.contains(&target_id)),
            _ => None,
        }
    }

    pub async fn list_areas(&self, source_id: u32) -> Vec<u64> {
        match self.call(&Request::ListAreas { source_id }).await {
            Response::Areas(ids) => ids,
            _ => Vec::new(),
        }
    }

    pub async fn list_rooms_in_area(
        &self,
        parent_area_id: u64,
        area_id: u64,
        page: u32,
    ) -> Vec<RoomRef> {
        let request = Request::ListRoomsInArea {
            parent_area_id,
            area_id,
            page,
        };
        match self.call(&request).await {
            Response::Rooms(rooms) => rooms,
            _ => Vec::new(),
        }
    }

    pub async fn room_area(&self, room_id: u64) -> Option<AreaRef> {
        match self.call(&Request::RoomArea { room_id }).await {
            Response::Area(area) => area,
            _ => None,
        }
    }

    pub async fn list_bag_contents(&self) -> Vec<BagItem> {
        match self.call(&Request::ListBagContents).await {
            Response::Bag(items) => items,
            _ => Vec::new(),
        }
    }

    pub async fn claim_reward(&self, lot_id: u64, room_id: u64, owner_id: u64) -> bool {
        let request = Request::ClaimReward {
            lot_id,
            room_id,
            owner_id,
        };
        matches!(self.call(&request).await, Response::Claimed(true))
    }

    pub async fn set_follow(&self, target_id: u64, follow: bool) -> bool {
        let request = Request::SetFollow { target_id, follow };
        matches!(self.call(&request).await, Response::FollowSet(true))
    }

    pub async fn heartbeat(&self, interval_secs: u64, room_id: u64) -> Option<u64> {
        let request = Request::Heartbeat {
            interval_secs,
            room_id,
        };
        match self.call(&request).await {
            Response::NextInterval(next) => next,
            _ => None,
        }
    }
}
