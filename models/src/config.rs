use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_DEBOUNCE_SECONDS: u64 = 5;
pub const DEFAULT_NOTIFY_TIMEOUT_SECONDS: u64 = 60;
pub const MAX_NOTIFY_TIMEOUT_SECONDS: u64 = 120;
pub const MIN_BATCH_SLEEP_SECONDS: u64 = 300;
pub const MIN_LIST_DELAY_MS: u64 = 1000;

fn default_true() -> bool {
    true
}

fn default_debounce() -> u64 {
    DEFAULT_DEBOUNCE_SECONDS
}

fn default_rclone_wait() -> u64 {
    15
}

fn default_retention_days() -> u32 {
    7
}

fn default_listen_port() -> u16 {
    8448
}

fn default_webhook_path() -> String {
    "/drive-webhook".to_string()
}

fn default_personal_drive_name() -> String {
    "My Drive".to_string()
}

fn default_rate_limit_qps() -> u32 {
    5
}

fn default_list_delay() -> u64 {
    MIN_LIST_DELAY_MS
}

fn default_batch_sleep() -> u64 {
    MIN_BATCH_SLEEP_SECONDS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub rclone: Vec<RefreshEndpoint>,
    #[serde(default)]
    pub symedia: NotifyConfig,
    #[serde(default, rename = "path_mapping")]
    pub mapping: Vec<MappingRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_true")]
    pub log_save_enabled: bool,
    #[serde(default)]
    pub log_dir: String,
    #[serde(default = "default_debounce")]
    pub debounce_seconds: u64,
    #[serde(default = "default_rclone_wait")]
    pub rclone_wait_seconds: u64,
    #[serde(default = "default_retention_days")]
    pub log_retention_days: u32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        AdvancedConfig {
            log_save_enabled: true,
            log_dir: String::new(),
            debounce_seconds: default_debounce(),
            rclone_wait_seconds: default_rclone_wait(),
            log_retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Domain only, e.g. https://mydomain.com
    #[serde(default)]
    pub public_url: String,
    /// Path only, e.g. /drive-webhook
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_port: default_listen_port(),
            public_url: String::new(),
            webhook_path: default_webhook_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_rate_limit_qps")]
    pub rate_limit_qps: u32,
    #[serde(default = "default_personal_drive_name")]
    pub personal_drive_name: String,
    #[serde(default)]
    pub target_drive_ids: Vec<String>,
    #[serde(default)]
    pub target_drive_remarks: BTreeMap<String, String>,
    /// Milliseconds between enumeration pages, min 1000.
    #[serde(default = "default_list_delay")]
    pub list_delay: u64,
    /// Seconds slept every 1000 enumerated items, min 300.
    #[serde(default = "default_batch_sleep")]
    pub batch_sleep_interval: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        GoogleConfig {
            rate_limit_qps: default_rate_limit_qps(),
            personal_drive_name: default_personal_drive_name(),
            target_drive_ids: Vec::new(),
            target_drive_remarks: BTreeMap::new(),
            list_delay: default_list_delay(),
            batch_sleep_interval: default_batch_sleep(),
        }
    }
}

/// One downstream VFS cache endpoint with its own rewrite rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub mapping: Vec<MappingRule>,
}

/// Media-indexer webhook endpoint with a templated JSON body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub endpoint: String,
    /// Send events whose path matched no rewrite rule with the original path.
    #[serde(default)]
    pub notify_unmatched: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body_template: BTreeMap<String, Value>,
    #[serde(default)]
    pub timeout: u64,
}

/// Ordered rewrite rule; the first matching regex wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub regex: String,
    pub replacement: String,
}

/// Per-day trigger counters, persisted in their own file and rolled over at
/// the day boundary (today into history, today reset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(default)]
    pub today_completed: u64,
    #[serde(default)]
    pub history_completed: u64,
    #[serde(default)]
    pub last_reset_date: String,
}

impl TaskStats {
    /// Fold the running day into history when `today` is a new date.
    pub fn roll_over(&mut self, today: &str) {
        if !self.last_reset_date.is_empty() && self.last_reset_date != today {
            self.history_completed += self.today_completed;
            self.today_completed = 0;
        }
        if self.last_reset_date != today {
            self.last_reset_date = today.to_string();
        }
    }
}
