use std::path::{Path, PathBuf};
use std::sync::Arc;

use models::{AppConfig, MappingRule, RefreshEndpoint};
use settings::{rewrite_first_match, ConfigStore};
use utilities::{FileSystem, VirtualFileSystem};

fn store_with(cfg: AppConfig) -> ConfigStore {
    let fs = Arc::new(VirtualFileSystem::new());
    ConfigStore::from_config(fs, PathBuf::from("config/config.json"), cfg)
}

#[test]
fn first_run_creates_default_config_file() {
    let fs = Arc::new(VirtualFileSystem::new());
    let store = ConfigStore::load(fs.clone(), PathBuf::from("config/config.json")).unwrap();
    assert!(fs.exists(Path::new("config/config.json")));

    let cfg = store.snapshot();
    assert_eq!(cfg.server.listen_port, 8448);
    assert_eq!(cfg.server.webhook_path, "/drive-webhook");
    assert_eq!(cfg.google.personal_drive_name, "My Drive");
    assert_eq!(cfg.advanced.debounce_seconds, 5);
    assert_eq!(cfg.advanced.rclone_wait_seconds, 15);
}

#[test]
fn unparseable_config_aborts_load() {
    let fs = Arc::new(VirtualFileSystem::new());
    fs.write(Path::new("config/config.json"), b"{not json").unwrap();
    assert!(ConfigStore::load(fs, PathBuf::from("config/config.json")).is_err());
}

#[test]
fn limits_are_applied_on_load_and_update() {
    let mut cfg = AppConfig::default();
    cfg.symedia.timeout = 500;
    cfg.google.list_delay = 10;
    cfg.google.batch_sleep_interval = 5;
    cfg.rclone.push(RefreshEndpoint {
        name: "main".to_string(),
        host: "http://localhost:5572".to_string(),
        endpoint: String::new(),
        timeout: 999,
        mapping: Vec::new(),
    });

    let store = store_with(cfg);
    let cfg = store.snapshot();
    assert_eq!(cfg.symedia.timeout, 120);
    assert_eq!(cfg.rclone[0].timeout, 120);
    assert_eq!(cfg.google.list_delay, 1000);
    assert_eq!(cfg.google.batch_sleep_interval, 300);

    let mut updated = cfg.clone();
    updated.symedia.timeout = 0;
    store.update(updated);
    assert_eq!(store.snapshot().symedia.timeout, 60);
}

#[test]
fn invalid_regexes_are_dropped_silently() {
    let mut cfg = AppConfig::default();
    cfg.mapping = vec![
        MappingRule {
            regex: "([unclosed".to_string(),
            replacement: "/x".to_string(),
        },
        MappingRule {
            regex: "^/MyDrive".to_string(),
            replacement: "/mnt/gd".to_string(),
        },
    ];
    let store = store_with(cfg);
    let rules = store.rules();
    assert_eq!(rules.notify.len(), 1);
    assert_eq!(
        rewrite_first_match(&rules.notify, "/MyDrive/Movies").as_deref(),
        Some("/mnt/gd/Movies")
    );
}

#[test]
fn update_recompiles_rule_caches() {
    let mut cfg = AppConfig::default();
    cfg.mapping = vec![MappingRule {
        regex: "^/A".to_string(),
        replacement: "/one".to_string(),
    }];
    let store = store_with(cfg);
    assert_eq!(store.rules().notify.len(), 1);

    let mut updated = store.snapshot();
    updated.mapping = vec![
        MappingRule {
            regex: "^/A".to_string(),
            replacement: "/one".to_string(),
        },
        MappingRule {
            regex: "^/B".to_string(),
            replacement: "/two".to_string(),
        },
    ];
    updated.rclone.push(RefreshEndpoint {
        name: "cache".to_string(),
        host: "http://127.0.0.1:5572".to_string(),
        endpoint: "/vfs/refresh".to_string(),
        timeout: 60,
        mapping: vec![MappingRule {
            regex: "^/B(.*)$".to_string(),
            replacement: "$1".to_string(),
        }],
    });
    store.update(updated);

    let rules = store.rules();
    assert_eq!(rules.notify.len(), 2);
    assert_eq!(rules.refresh.len(), 1);
    assert_eq!(
        rewrite_first_match(&rules.refresh[0], "/B/Shows").as_deref(),
        Some("/Shows")
    );
}

#[test]
fn first_match_wins_in_rule_order() {
    let mut cfg = AppConfig::default();
    cfg.mapping = vec![
        MappingRule {
            regex: "^/Drive".to_string(),
            replacement: "/first".to_string(),
        },
        MappingRule {
            regex: "^/Drive/Sub".to_string(),
            replacement: "/second".to_string(),
        },
    ];
    let store = store_with(cfg);
    let rules = store.rules();
    assert_eq!(
        rewrite_first_match(&rules.notify, "/Drive/Sub/x").as_deref(),
        Some("/first/Sub/x")
    );
}

#[test]
fn save_round_trips_through_disk() {
    let fs = Arc::new(VirtualFileSystem::new());
    let mut cfg = AppConfig::default();
    cfg.google.target_drive_ids = vec!["d1".to_string()];
    let store = ConfigStore::from_config(fs.clone(), PathBuf::from("cfg.json"), cfg);
    store.save().unwrap();

    let reloaded = ConfigStore::load(fs, PathBuf::from("cfg.json")).unwrap();
    assert_eq!(reloaded.snapshot().google.target_drive_ids, vec!["d1"]);
}
