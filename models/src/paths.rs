use std::path::{Path, PathBuf};

/// On-disk layout under the userdata root.
///
/// config/ holds operator-editable files, data/ the daemon's own state and
/// logs/ the append-only output.
#[derive(Debug, Clone)]
pub struct UserData {
    root: PathBuf,
}

impl UserData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        UserData { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.json")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir().join("credentials.json")
    }

    pub fn oauth_token_file(&self) -> PathBuf {
        self.config_dir().join("token.json")
    }

    pub fn start_token_file(&self) -> PathBuf {
        self.data_dir().join("start_token.txt")
    }

    pub fn tree_cache_file(&self) -> PathBuf {
        self.data_dir().join("tree_cache.json")
    }

    pub fn task_stats_file(&self) -> PathBuf {
        self.data_dir().join("task_stats.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn system_log_dir(&self) -> PathBuf {
        self.log_dir().join("system")
    }

    pub fn history_log_dir(&self) -> PathBuf {
        self.log_dir().join("history")
    }
}

impl Default for UserData {
    fn default() -> Self {
        UserData::new("userdata")
    }
}
