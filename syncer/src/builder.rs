use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use models::{Node, MIN_BATCH_SLEEP_SECONDS, PERSONAL_ROOT_ID};
use remote::{DriveApi, DriveNameCache};
use settings::ConfigStore;
use tokio::sync::Mutex;
use tree::ShadowTree;
use utilities::filesystem::temp_sibling;
use utilities::FileSystem;

/// Flush the disk buffer and pause after this many enumerated records.
const FLUSH_INTERVAL: usize = 1000;

/// Full-tree rebuild: a disk-buffered enumeration of every target root,
/// committed with an atomic file rename and then an atomic in-memory
/// swap. At most one rebuild runs at a time.
pub struct TreeBuilder {
    store: Arc<ConfigStore>,
    api: Arc<dyn DriveApi>,
    tree: Arc<ShadowTree>,
    names: Arc<DriveNameCache>,
    fs: Arc<dyn FileSystem>,
    cache_path: PathBuf,
    build_lock: Mutex<()>,
}

impl TreeBuilder {
    pub fn new(
        store: Arc<ConfigStore>,
        api: Arc<dyn DriveApi>,
        tree: Arc<ShadowTree>,
        names: Arc<DriveNameCache>,
        fs: Arc<dyn FileSystem>,
        cache_path: PathBuf,
    ) -> Self {
        TreeBuilder {
            store,
            api,
            tree,
            names,
            fs,
            cache_path,
            build_lock: Mutex::new(()),
        }
    }

    pub async fn build(&self, force: bool) {
        let Ok(_guard) = self.build_lock.try_lock() else {
            tracing::warn!("tree build already running, skipping");
            return;
        };

        if !force {
            if !self.tree.is_empty() {
                tracing::info!(
                    "file tree already loaded in memory (nodes: {}), skipping build",
                    self.tree.len()
                );
                return;
            }
            match self.tree.load(self.fs.as_ref(), &self.cache_path) {
                Ok(()) if !self.tree.is_empty() => {
                    tracing::info!("loaded cached file tree, nodes: {}", self.tree.len());
                    return;
                }
                Ok(()) => tracing::warn!("cache is empty"),
                Err(e) => tracing::warn!("failed to load cache: {e:#}"),
            }
            tracing::info!("cache not found or invalid, starting full build...");
        } else {
            tracing::info!("force rebuilding file tree...");
        }

        let cfg = self.store.snapshot();
        let targets = &cfg.google.target_drive_ids;
        if targets.is_empty() {
            tracing::warn!("no target roots configured, skipping enumeration");
            return;
        }

        self.names.set_personal_name(&cfg.google.personal_drive_name);
        for target in targets {
            if target != PERSONAL_ROOT_ID {
                self.names.prime(self.api.as_ref(), target).await;
            }
        }

        if let Some(dir) = self.cache_path.parent() {
            let _ = self.fs.create_dir_all(dir);
        }
        let tmp = temp_sibling(&self.cache_path);
        let mut writer = match self.fs.open_write(&tmp) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!("failed to create temp cache file: {e}");
                return;
            }
        };

        let batch_sleep = cfg.google.batch_sleep_interval.max(MIN_BATCH_SLEEP_SECONDS);
        let mut total = 0usize;

        for target in targets {
            let mut label = self.names.get_or_id(target);
            if let Some(remark) = cfg.google.target_drive_remarks.get(target) {
                if !remark.is_empty() {
                    label = format!("{label} ({remark})");
                }
            }
            tracing::info!("scanning {label}...");

            let mut page_token: Option<String> = None;
            let mut count = 0usize;
            let failed = loop {
                let page = match self.api.list_files(target, page_token.as_deref()).await {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::error!("failed to scan {label}: {e:#}");
                        break true;
                    }
                };

                for file in &page.files {
                    if file.parents.len() > 1 {
                        tracing::warn!(
                            "node {} ({}) has {} parents, using first",
                            file.name,
                            file.id,
                            file.parents.len()
                        );
                    }
                    let node = Node {
                        id: file.id.clone(),
                        name: file.name.clone(),
                        parent_id: file.primary_parent(),
                        is_dir: file.is_dir(),
                        drive_id: file.drive_id.clone(),
                    };
                    if let Err(e) = write_node_line(writer.as_mut(), &node) {
                        tracing::error!("error writing node to buffer: {e}");
                        continue;
                    }
                    count += 1;
                    total += 1;

                    if total % FLUSH_INTERVAL == 0 {
                        if let Err(e) = writer.flush() {
                            tracing::error!("error flushing buffer: {e}");
                        }
                        tracing::info!("progress: {total} scanned (buffered)...");
                        // Self-imposed risk control against the remote
                        // store's abuse detection.
                        tracing::warn!("pausing for {batch_sleep}s after {total} items...");
                        tokio::time::sleep(Duration::from_secs(batch_sleep)).await;
                        tracing::info!("resuming scan...");
                    }
                }

                match page.next_page_token {
                    Some(next) => {
                        page_token = Some(next);
                        // Inter-page pacing on top of the token bucket.
                        tokio::time::sleep(Duration::from_millis(cfg.google.list_delay)).await;
                    }
                    None => break false,
                }
            };
            if !failed {
                tracing::info!("scanned {label}: {count} nodes buffered");
            }
        }

        if let Err(e) = writer.flush() {
            tracing::error!("final flush failed: {e}");
            let _ = self.fs.remove_file(&tmp);
            return;
        }
        drop(writer);

        if let Err(e) = self.fs.rename(&tmp, &self.cache_path) {
            tracing::error!("failed to commit cache file: {e}");
            let _ = self.fs.remove_file(&tmp);
            return;
        }
        tracing::info!("cache committed to disk, loading into memory...");

        let fresh = ShadowTree::new(Arc::clone(&self.names));
        if let Err(e) = fresh.load(self.fs.as_ref(), &self.cache_path) {
            tracing::error!("failed to load new tree: {e:#}");
            return;
        }
        self.tree.replace_with(&fresh);
        tracing::info!("file tree build complete, final node count: {}", self.tree.len());
    }
}

fn write_node_line(writer: &mut (dyn Write + Send), node: &Node) -> std::io::Result<()> {
    let line = serde_json::to_vec(node)?;
    writer.write_all(&line)?;
    writer.write_all(b"\n")
}
