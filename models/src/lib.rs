#![allow(dead_code)]

pub mod change;
pub mod config;
pub mod paths;

pub use change::{
    ChangePage, DescendantInfo, FilePage, Node, NotifyAction, NotifyEvent, RemoteChange,
    RemoteFile, WatchChannel, FOLDER_MIME_TYPE, PERSONAL_ROOT_ID,
};
pub use config::{
    AppConfig, MappingRule, RefreshEndpoint, TaskStats, DEFAULT_DEBOUNCE_SECONDS,
    DEFAULT_NOTIFY_TIMEOUT_SECONDS, MAX_NOTIFY_TIMEOUT_SECONDS, MIN_BATCH_SLEEP_SECONDS,
    MIN_LIST_DELAY_MS,
};
pub use paths::UserData;
