//! Platform HTTP API.
//!
//! Every endpoint answers with the same envelope:
//! `{ "code": 0, "message": "...", "data": { ... } }`. A non-zero code is
//! reported as [`WatchError::Api`]; callers above the [`Account`] boundary
//! never see these errors.
//!
//! [`Account`]: crate::account::Account

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::credential::Credential;
use crate::error::{Result, WatchError};

/// A live room and the account that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomRef {
    pub room_id: u64,
    pub owner_id: u64,
}

/// A parent area / sub-area pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRef {
    pub parent_area_id: u64,
    pub area_id: u64,
}

/// One stack of gifts in an account's bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagItem {
    pub gift_name: String,
    pub corner_mark: String,
    pub count: u64,
}

/// The remote operations the watcher depends on (real client or mock)
#[async_trait]
pub trait LiveApi: Send + Sync {
    /// Parent area ids listed under `source_id`
    async fn list_areas(&self, source_id: u32) -> Result<Vec<u64>>;

    /// Live rooms on one page of a (sub-)area listing; `area_id` 0 means all
    async fn list_rooms_in_area(
        &self,
        parent_area_id: u64,
        area_id: u64,
        page: u32,
    ) -> Result<Vec<RoomRef>>;

    /// Area a room is currently streaming in
    async fn room_area(&self, room_id: u64) -> Result<AreaRef>;

    /// Ids of accounts the session follows
    async fn list_followed(&self) -> Result<Vec<u64>>;

    async fn list_bag_contents(&self) -> Result<Vec<BagItem>>;

    async fn claim_reward(&self, lot_id: u64, room_id: u64, owner_id: u64) -> Result<()>;

    async fn set_follow(&self, target_id: u64, follow: bool) -> Result<()>;

    /// Send one web heartbeat, returning the next interval hint in seconds
    async fn heartbeat(&self, interval_secs: u64, room_id: u64) -> Result<u64>;
}

/// The payload stays untyped until the code has been checked, so error
/// replies with a placeholder `data` still surface as [`WatchError::Api`].
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default, alias = "msg")]
    message: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn check(self) -> Result<Value> {
        if self.code == 0 {
            Ok(self.data)
        } else {
            Err(WatchError::Api {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Typed payload, `None` when the reply carries no data
    fn decode<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.check()? {
            Value::Null => Ok(None),
            data => serde_json::from_value(data)
                .map(Some)
                .map_err(|e| WatchError::Decode(e.to_string())),
        }
    }

    fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        self.decode()?
            .ok_or_else(|| WatchError::Decode("response has no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AreaListData {
    data: Vec<AreaEntry>,
}

#[derive(Debug, Deserialize)]
struct AreaEntry {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RoomListData {
    #[serde(default)]
    list: Vec<RoomEntry>,
}

#[derive(Debug, Deserialize)]
struct RoomEntry {
    roomid: u64,
    uid: u64,
}

#[derive(Debug, Deserialize)]
struct RoomInfoData {
    room_info: AreaRef,
}

#[derive(Debug, Deserialize)]
struct FollowData {
    #[serde(default)]
    list: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
struct BagData {
    #[serde(default)]
    list: Option<Vec<BagEntry>>,
}

#[derive(Debug, Deserialize)]
struct BagEntry {
    gift_name: String,
    #[serde(default)]
    corner_mark: String,
    gift_num: u64,
}

#[derive(Debug, Deserialize)]
struct HeartbeatData {
    next_interval: u64,
}

const RED_POCKET_SPM_ID: &str = "444.8.red_envelope.extract";
const NO_QUERY: [(&str, &str); 0] = [];

/// Production implementation of [`LiveApi`] backed by reqwest
pub struct HttpLiveApi {
    client: Client,
    config: ApiConfig,
    csrf: String,
}

impl HttpLiveApi {
    /// Build a client that sends `credential` with every request
    pub fn new(config: &ApiConfig, credential: &Credential) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !credential.header_value().is_empty() {
            let cookie = HeaderValue::from_str(credential.header_value())
                .map_err(|e| WatchError::Credential(e.to_string()))?;
            headers.insert(COOKIE, cookie);
        }
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| WatchError::Config(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            csrf: credential.csrf().to_string(),
        })
    }

    async fn get<Q>(&self, url: &str, query: &Q) -> Result<Envelope>
    where
        Q: Serialize + ?Sized,
    {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_form<F>(&self, url: &str, form: &F) -> Result<Envelope>
    where
        F: Serialize + ?Sized,
    {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Heartbeat payload: `base64("{interval}|{room_id}|1|0")`
pub fn encode_heartbeat(interval_secs: u64, room_id: u64) -> String {
    STANDARD.encode(format!("{interval_secs}|{room_id}|1|0"))
}

#[async_trait]
impl LiveApi for HttpLiveApi {
    async fn list_areas(&self, source_id: u32) -> Result<Vec<u64>> {
        let url = format!(
            "{}/xlive/web-interface/v1/index/getWebAreaList",
            self.config.live_base
        );
        let data: AreaListData = self.get(&url, &[("source_id", source_id)]).await?.into_data()?;
        Ok(data.data.into_iter().map(|area| area.id).collect())
    }

    async fn list_rooms_in_area(
        &self,
        parent_area_id: u64,
        area_id: u64,
        page: u32,
    ) -> Result<Vec<RoomRef>> {
        let url = format!(
            "{}/xlive/web-interface/v1/second/getList",
            self.config.live_base
        );
        let query = [
            ("platform", "web".to_string()),
            ("parent_area_id", parent_area_id.to_string()),
            ("area_id", area_id.to_string()),
            ("page", page.to_string()),
        ];
        let data: RoomListData = self.get(&url, &query).await?.into_data()?;
        Ok(data
            .list
            .into_iter()
            .map(|room| RoomRef {
                room_id: room.roomid,
                owner_id: room.uid,
            })
            .collect())
    }

    async fn room_area(&self, room_id: u64) -> Result<AreaRef> {
        let url = format!(
            "{}/xlive/web-room/v1/index/getInfoByRoom",
            self.config.live_base
        );
        let data: RoomInfoData = self.get(&url, &[("room_id", room_id)]).await?.into_data()?;
        Ok(data.room_info)
    }

    async fn list_followed(&self) -> Result<Vec<u64>> {
        let url = format!("{}/feed/v1/feed/get_attention_list", self.config.vc_base);
        let data: Option<FollowData> = self.get(&url, &NO_QUERY).await?.decode()?;
        Ok(data.and_then(|d| d.list).unwrap_or_default())
    }

    async fn list_bag_contents(&self) -> Result<Vec<BagItem>> {
        let url = format!("{}/xlive/web-room/v1/gift/bag_list", self.config.live_base);
        let data: Option<BagData> = self.get(&url, &NO_QUERY).await?.decode()?;
        Ok(data
            .and_then(|d| d.list)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| BagItem {
                gift_name: entry.gift_name,
                corner_mark: entry.corner_mark,
                count: entry.gift_num,
            })
            .collect())
    }

    async fn claim_reward(&self, lot_id: u64, room_id: u64, owner_id: u64) -> Result<()> {
        let url = format!(
            "{}/xlive/lottery-interface/v1/popularityRedPocket/RedPocketDraw",
            self.config.live_base
        );
        let form = [
            ("lot_id", lot_id.to_string()),
            ("csrf", self.csrf.clone()),
            ("csrf_token", self.csrf.clone()),
            ("visit_id", String::new()),
            ("jump_from", String::new()),
            ("session_id", String::new()),
            ("room_id", room_id.to_string()),
            ("ruid", owner_id.to_string()),
            ("spm_id", RED_POCKET_SPM_ID.to_string()),
        ];
        self.post_form(&url, &form).await?.check()?;
        Ok(())
    }

    async fn set_follow(&self, target_id: u64, follow: bool) -> Result<()> {
        let url = format!("{}/x/relation/modify", self.config.relation_base);
        let act = if follow { 1 } else { 2 };
        let form = [
            ("fid", target_id.to_string()),
            ("act", act.to_string()),
            ("re_src", "0".to_string()),
            ("csrf", self.csrf.clone()),
        ];
        self.post_form(&url, &form).await?.check()?;
        Ok(())
    }

    async fn heartbeat(&self, interval_secs: u64, room_id: u64) -> Result<u64> {
        let url = format!(
            "{}/xlive/rdata-interface/v1/heartbeat/webHeartBeat",
            self.config.trace_base
        );
        let query = [
            ("hb", encode_heartbeat(interval_secs, room_id)),
            ("pf", "web".to_string()),
        ];
        let data: HeartbeatData = self.get(&url, &query).await?.into_data()?;
        Ok(data.next_interval)
    }
}
