use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Red packet monitor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Events whose total price does not exceed this value are ignored
    #[serde(default)]
    pub total_price_limit: u64,
    /// Base delay before drawing, folded into the claim window
    #[serde(default = "default_draw_delay_secs")]
    pub draw_delay_secs: u64,
    /// How long a room stays connected after its last qualifying event
    #[serde(default = "default_close_after_ms")]
    pub close_after_ms: u64,
}

fn default_draw_delay_secs() -> u64 {
    100
}

fn default_close_after_ms() -> u64 {
    3 * 60 * 1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            total_price_limit: 0,
            draw_delay_secs: default_draw_delay_secs(),
            close_after_ms: default_close_after_ms(),
        }
    }
}

/// Web heartbeat intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval hint sent with the first heartbeat
    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: u64,
    /// Interval used when a heartbeat call fails
    #[serde(default = "default_fallback_interval_secs")]
    pub fallback_interval_secs: u64,
}

fn default_initial_interval_secs() -> u64 {
    6
}

fn default_fallback_interval_secs() -> u64 {
    60
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: default_initial_interval_secs(),
            fallback_interval_secs: default_fallback_interval_secs(),
        }
    }
}

/// Room discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Area list source id
    #[serde(default = "default_source_id")]
    pub source_id: u32,
    /// Number of room list pages scanned per area
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// Rescan period; a single pass when unset
    #[serde(default)]
    pub rescan_interval_secs: Option<u64>,
    /// Only scan the sub-area this room belongs to
    #[serde(default)]
    pub focus_room: Option<u64>,
}

fn default_source_id() -> u32 {
    1
}

fn default_pages() -> u32 {
    1
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source_id: default_source_id(),
            pages: default_pages(),
            rescan_interval_secs: None,
            focus_room: None,
        }
    }
}

/// Platform endpoints and HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_live_base")]
    pub live_base: String,
    #[serde(default = "default_vc_base")]
    pub vc_base: String,
    #[serde(default = "default_relation_base")]
    pub relation_base: String,
    #[serde(default = "default_trace_base")]
    pub trace_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_live_base() -> String {
    "https://api.live.bilibili.com".to_string()
}

fn default_vc_base() -> String {
    "https://api.vc.bilibili.com".to_string()
}

fn default_relation_base() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_trace_base() -> String {
    "https://live-trace.bilibili.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:96.0) Gecko/20100101 Firefox/96.0".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            live_base: default_live_base(),
            vc_base: default_vc_base(),
            relation_base: default_relation_base(),
            trace_base: default_trace_base(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Command relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL template; `{room_id}` is substituted per room
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:9000/room/{room_id}".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
        }
    }
}

/// Main configuration for the watcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session cookies of the claiming accounts
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Cookie for the client that lists areas and rooms (empty = anonymous)
    #[serde(default)]
    pub announce_cookie: String,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Command-line overrides, applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub total_price_limit: Option<u64>,
    pub draw_delay_secs: Option<u64>,
    pub close_after_ms: Option<u64>,
    pub pages: Option<u32>,
    pub rescan_interval_secs: Option<u64>,
    pub focus_room: Option<u64>,
    pub relay_url: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::WatchError::Config(e.to_string()))?;
        toml::from_str(&content).map_err(|e| crate::error::WatchError::Config(e.to_string()))
    }

    /// Default config location: `<config_dir>/redpocket-watch/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("redpocket-watch").join("config.toml"))
    }

    /// Merge CLI arguments into this configuration
    /// CLI arguments take precedence over config file values
    pub fn merge_cli_args(&mut self, cli: CliOverrides) {
        if let Some(limit) = cli.total_price_limit {
            self.monitor.total_price_limit = limit;
        }
        if let Some(delay) = cli.draw_delay_secs {
            self.monitor.draw_delay_secs = delay;
        }
        if let Some(ms) = cli.close_after_ms {
            self.monitor.close_after_ms = ms;
        }
        if let Some(pages) = cli.pages {
            self.discovery.pages = pages;
        }
        if cli.rescan_interval_secs.is_some() {
            self.discovery.rescan_interval_secs = cli.rescan_interval_secs;
        }
        if cli.focus_room.is_some() {
            self.discovery.focus_room = cli.focus_room;
        }
        if let Some(url) = cli.relay_url {
            self.feed.relay_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.accounts.is_empty());
        assert_eq!(config.monitor.total_price_limit, 0);
        assert_eq!(config.monitor.draw_delay_secs, 100);
        assert_eq!(config.monitor.close_after_ms, 180_000);
        assert_eq!(config.heartbeat.initial_interval_secs, 6);
        assert_eq!(config.heartbeat.fallback_interval_secs, 60);
        assert_eq!(config.discovery.pages, 1);
        assert!(config.discovery.rescan_interval_secs.is_none());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
accounts = ["DedeUserID=1; bili_jct=abc", "DedeUserID=2; bili_jct=def"]

[monitor]
total_price_limit = 500

[discovery]
pages = 3
rescan_interval_secs = 600
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.monitor.total_price_limit, 500);
        assert_eq!(config.monitor.draw_delay_secs, 100);
        assert_eq!(config.discovery.pages, 3);
        assert_eq!(config.discovery.rescan_interval_secs, Some(600));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"accounts = 7").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::WatchError::Config(_)));
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let mut config = Config::default();
        config.merge_cli_args(CliOverrides {
            total_price_limit: Some(1000),
            draw_delay_secs: Some(30),
            relay_url: Some("ws://relay/{room_id}".to_string()),
            ..CliOverrides::default()
        });

        assert_eq!(config.monitor.total_price_limit, 1000);
        assert_eq!(config.monitor.draw_delay_secs, 30);
        assert_eq!(config.monitor.close_after_ms, 180_000);
        assert_eq!(config.feed.relay_url, "ws://relay/{room_id}");
    }
}
