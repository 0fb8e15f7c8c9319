#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use models::{
    AppConfig, MappingRule, DEFAULT_NOTIFY_TIMEOUT_SECONDS, MAX_NOTIFY_TIMEOUT_SECONDS,
    MIN_BATCH_SLEEP_SECONDS, MIN_LIST_DELAY_MS,
};
use regex::Regex;
use utilities::{write_atomic, FileSystem};

/// A mapping rule whose pattern compiled successfully. Invalid patterns are
/// dropped at compile time; the pair stays together so rule order survives
/// the drop.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub regex: Regex,
    pub replacement: String,
}

/// Rewrite a path through an ordered rule list, first match wins.
pub fn rewrite_first_match(rules: &[CompiledRule], path: &str) -> Option<String> {
    for rule in rules {
        if rule.regex.is_match(path) {
            return Some(rule.regex.replace_all(path, rule.replacement.as_str()).into_owned());
        }
    }
    None
}

/// Compiled regex caches derived from the current config.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    /// Notification path rewriting (`path_mapping`).
    pub notify: Arc<Vec<CompiledRule>>,
    /// Per refresh-endpoint rule lists, indexed like `config.rclone`.
    pub refresh: Arc<Vec<Arc<Vec<CompiledRule>>>>,
}

struct Inner {
    cfg: AppConfig,
    rules: CompiledRules,
}

/// Shared configuration with compiled-regex caches.
///
/// Readers copy snapshots out under the read lock; the write lock is held
/// only for update-and-recompile.
pub struct ConfigStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl ConfigStore {
    /// Load from `path`, creating the file with defaults on first run.
    /// Unparseable JSON aborts the load.
    pub fn load(fs: Arc<dyn FileSystem>, path: PathBuf) -> Result<Self> {
        let mut first_run = false;
        let mut cfg: AppConfig = match fs.read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("config file {} is not valid JSON", path.display()))?,
            Err(_) => {
                first_run = true;
                tracing::info!("config file not found, creating default configuration");
                AppConfig::default()
            }
        };
        apply_limits(&mut cfg);

        let rules = compile_rules(&cfg);
        let store = ConfigStore {
            fs,
            path,
            inner: RwLock::new(Inner { cfg, rules }),
        };
        if first_run {
            store.save()?;
        }
        Ok(store)
    }

    /// In-memory store seeded from a value; used by tests and boot paths
    /// that construct config programmatically.
    pub fn from_config(fs: Arc<dyn FileSystem>, path: PathBuf, mut cfg: AppConfig) -> Self {
        apply_limits(&mut cfg);
        let rules = compile_rules(&cfg);
        ConfigStore {
            fs,
            path,
            inner: RwLock::new(Inner { cfg, rules }),
        }
    }

    /// Value copy of the current config.
    pub fn snapshot(&self) -> AppConfig {
        self.inner.read().unwrap().cfg.clone()
    }

    /// Handles to the compiled regex caches.
    pub fn rules(&self) -> CompiledRules {
        self.inner.read().unwrap().rules.clone()
    }

    /// Replace the config, re-applying limits and recompiling rule caches.
    pub fn update(&self, mut cfg: AppConfig) {
        apply_limits(&mut cfg);
        let rules = compile_rules(&cfg);
        let mut inner = self.inner.write().unwrap();
        inner.cfg = cfg;
        inner.rules = rules;
    }

    /// Persist the current config atomically.
    pub fn save(&self) -> Result<()> {
        let cfg = self.snapshot();
        let json = serde_json::to_vec_pretty(&cfg)?;
        write_atomic(self.fs.as_ref(), &self.path, &json)
            .with_context(|| format!("failed to save config to {}", self.path.display()))?;
        Ok(())
    }
}

fn apply_limits(cfg: &mut AppConfig) {
    if cfg.symedia.timeout == 0 {
        cfg.symedia.timeout = DEFAULT_NOTIFY_TIMEOUT_SECONDS;
    } else if cfg.symedia.timeout > MAX_NOTIFY_TIMEOUT_SECONDS {
        cfg.symedia.timeout = MAX_NOTIFY_TIMEOUT_SECONDS;
    }
    for ep in &mut cfg.rclone {
        if ep.timeout == 0 {
            ep.timeout = DEFAULT_NOTIFY_TIMEOUT_SECONDS;
        } else if ep.timeout > MAX_NOTIFY_TIMEOUT_SECONDS {
            ep.timeout = MAX_NOTIFY_TIMEOUT_SECONDS;
        }
    }
    if cfg.google.list_delay < MIN_LIST_DELAY_MS {
        cfg.google.list_delay = MIN_LIST_DELAY_MS;
    }
    if cfg.google.batch_sleep_interval < MIN_BATCH_SLEEP_SECONDS {
        cfg.google.batch_sleep_interval = MIN_BATCH_SLEEP_SECONDS;
    }
    if cfg.google.rate_limit_qps == 0 {
        cfg.google.rate_limit_qps = 5;
    }
    if cfg.server.webhook_path.is_empty() {
        cfg.server.webhook_path = "/drive-webhook".to_string();
    }
    if cfg.google.personal_drive_name.is_empty() {
        cfg.google.personal_drive_name = "My Drive".to_string();
    }
}

fn compile_rule_list(rules: &[MappingRule]) -> Vec<CompiledRule> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        match Regex::new(&rule.regex) {
            Ok(regex) => out.push(CompiledRule {
                regex,
                replacement: rule.replacement.clone(),
            }),
            Err(e) => {
                tracing::debug!("skipping invalid mapping rule {:?}: {e}", rule.regex);
            }
        }
    }
    out
}

fn compile_rules(cfg: &AppConfig) -> CompiledRules {
    let notify = Arc::new(compile_rule_list(&cfg.mapping));
    let refresh = Arc::new(
        cfg.rclone
            .iter()
            .map(|ep| Arc::new(compile_rule_list(&ep.mapping)))
            .collect::<Vec<_>>(),
    );
    CompiledRules { notify, refresh }
}
