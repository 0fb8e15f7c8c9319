use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::filesystem::FileSystem;
use crate::{now_rfc3339, today_utc};

/// Append-only change history, one CSV file per day:
/// `<dir>/history.YYYY-MM-DD.csv` with `timestamp,ACTION,path` rows.
#[derive(Clone)]
pub struct HistoryLog {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    enabled: bool,
    lock: Arc<Mutex<()>>,
}

impl HistoryLog {
    pub fn new(fs: Arc<dyn FileSystem>, dir: PathBuf, enabled: bool) -> Self {
        HistoryLog {
            fs,
            dir,
            enabled,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Disabled sink for tests and idle configurations.
    pub fn disabled(fs: Arc<dyn FileSystem>) -> Self {
        HistoryLog::new(fs, PathBuf::new(), false)
    }

    pub fn record(&self, action: &str, path: &str) {
        if !self.enabled {
            return;
        }
        let file = self.dir.join(format!("history.{}.csv", today_utc()));
        let line = format!("{},{},{}\n", now_rfc3339(), action, path);

        let _guard = self.lock.lock().unwrap();
        if let Err(e) = self.fs.append(&file, line.as_bytes()) {
            tracing::error!("failed to write history record: {e}");
        }
    }
}
