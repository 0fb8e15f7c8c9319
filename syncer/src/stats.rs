use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use models::TaskStats;
use utilities::{today_utc, write_atomic, FileSystem};

/// Per-day trigger counters in their own small file, kept out of the
/// config object so stats writes never contend with config updates.
pub struct TaskStatsStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    inner: Mutex<TaskStats>,
}

impl TaskStatsStore {
    pub fn load(fs: Arc<dyn FileSystem>, path: PathBuf) -> Self {
        let mut stats: TaskStats = fs
            .read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        stats.roll_over(&today_utc());

        TaskStatsStore {
            fs,
            path,
            inner: Mutex::new(stats),
        }
    }

    /// Count one processed trigger and persist.
    pub fn record_completed(&self) {
        let snapshot = {
            let mut stats = self.inner.lock().unwrap();
            stats.roll_over(&today_utc());
            stats.today_completed += 1;
            stats.history_completed += 1;
            stats.clone()
        };
        if let Err(e) = self.persist(&snapshot) {
            tracing::error!("failed to persist task stats: {e}");
        }
    }

    /// Current counters as of today (rollover applied to the view without
    /// mutating stored state).
    pub fn snapshot(&self) -> TaskStats {
        let mut stats = self.inner.lock().unwrap().clone();
        stats.roll_over(&today_utc());
        stats
    }

    fn persist(&self, stats: &TaskStats) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(stats).map_err(std::io::Error::from)?;
        write_atomic(self.fs.as_ref(), &self.path, &json)
    }
}
