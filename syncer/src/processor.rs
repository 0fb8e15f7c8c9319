use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use downstream::{NotifyService, RefreshService};
use models::{NotifyAction, NotifyEvent, RemoteChange, DEFAULT_DEBOUNCE_SECONDS, PERSONAL_ROOT_ID};
use remote::{DriveApi, DriveNameCache, TokenStore};
use settings::ConfigStore;
use tokio_util::sync::CancellationToken;
use tree::ShadowTree;
use utilities::HistoryLog;

use crate::stats::TaskStatsStore;
use crate::trigger::TriggerQueue;

const CHANGE_PAGE_SIZE: u32 = 500;

/// Single-writer change pipeline: drains the trigger queue, diffs the
/// remote change feed against the shadow tree, and fans side effects out
/// downstream. The resume token only advances after a run fully
/// completes, so an aborted run is replayed by the next trigger.
pub struct ChangeProcessor {
    store: Arc<ConfigStore>,
    api: Arc<dyn DriveApi>,
    tree: Arc<ShadowTree>,
    names: Arc<DriveNameCache>,
    tokens: TokenStore,
    refresh: Arc<RefreshService>,
    notify: Arc<NotifyService>,
    history: HistoryLog,
    stats: Arc<TaskStatsStore>,
}

impl ChangeProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ConfigStore>,
        api: Arc<dyn DriveApi>,
        tree: Arc<ShadowTree>,
        names: Arc<DriveNameCache>,
        tokens: TokenStore,
        refresh: Arc<RefreshService>,
        notify: Arc<NotifyService>,
        history: HistoryLog,
        stats: Arc<TaskStatsStore>,
    ) -> Self {
        ChangeProcessor {
            store,
            api,
            tree,
            names,
            tokens,
            refresh,
            notify,
            history,
            stats,
        }
    }

    /// Debounced event loop. One token wakes it, the debounce window lets
    /// the remote settle, then accumulated tokens are drained so a burst
    /// of notifications collapses into one sync pass.
    pub async fn run(self: Arc<Self>, mut queue: TriggerQueue, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                token = queue.recv() => {
                    if token.is_none() {
                        break;
                    }
                    let mut debounce = self.store.snapshot().advanced.debounce_seconds;
                    if debounce == 0 {
                        debounce = DEFAULT_DEBOUNCE_SECONDS;
                    }
                    tracing::info!("change detected, debouncing {debounce}s...");
                    tokio::time::sleep(Duration::from_secs(debounce)).await;

                    let drained = queue.drain();
                    if drained > 0 {
                        tracing::debug!("coalesced {drained} extra trigger(s)");
                    }

                    self.sync_once().await;
                    self.stats.record_completed();
                }
            }
        }
        tracing::info!("change processor stopped");
    }

    /// One pass over the change feed. Aborts without advancing the resume
    /// token on any paging error; downstream endpoints tolerate the
    /// resulting duplicate deliveries.
    pub async fn sync_once(&self) {
        let cfg = self.store.snapshot();
        let targets = &cfg.google.target_drive_ids;
        if targets.is_empty() {
            // Idle by configuration; the boot path already warned.
            return;
        }
        let Some(start_token) = self.tokens.load() else {
            tracing::warn!("resume token is empty, skipping sync check");
            return;
        };

        self.names.set_personal_name(&cfg.google.personal_drive_name);
        for target in targets {
            if target != PERSONAL_ROOT_ID {
                self.names.prime(self.api.as_ref(), target).await;
            }
        }

        tracing::debug!("checking changes from token {start_token}");

        let mut all_changes: Vec<RemoteChange> = Vec::new();
        let mut page_token = start_token.clone();
        let mut new_start_token: Option<String> = None;
        loop {
            let page = match self.api.list_changes(&page_token, CHANGE_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("change feed query failed: {e:#}");
                    return;
                }
            };
            all_changes.extend(page.changes);

            if let Some(token) = page.new_start_page_token {
                new_start_token = Some(token);
                break;
            }
            match page.next_page_token {
                Some(next) => page_token = next,
                None => {
                    tracing::warn!("change feed returned neither a next nor a new start token");
                    break;
                }
            }
        }

        if all_changes.is_empty() {
            if let Some(token) = &new_start_token {
                if *token != start_token {
                    self.save_token(token);
                }
            }
            tracing::debug!("no changes");
            return;
        }
        tracing::info!("processing {} change(s)", all_changes.len());

        let mut refresh_dirs: BTreeSet<String> = BTreeSet::new();
        let mut notifications: Vec<NotifyEvent> = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();

        for change in &all_changes {
            if change.file_id.is_empty() || processed.contains(&change.file_id) {
                continue;
            }
            self.apply_change(
                change,
                targets,
                &mut refresh_dirs,
                &mut notifications,
                &mut processed,
            )
            .await;
        }

        if !refresh_dirs.is_empty() {
            tracing::info!("refreshing {} downstream directories...", refresh_dirs.len());
            self.refresh.refresh_all(&refresh_dirs).await;
            self.refresh.wait_for_cooldown().await;
        }

        if !notifications.is_empty() {
            tracing::info!("sending {} notification(s)...", notifications.len());
            self.notify.send_all(&notifications).await;
        }

        if let Some(token) = new_start_token {
            self.save_token(&token);
        }
    }

    async fn apply_change(
        &self,
        change: &RemoteChange,
        targets: &[String],
        refresh_dirs: &mut BTreeSet<String>,
        notifications: &mut Vec<NotifyEvent>,
        processed: &mut HashSet<String>,
    ) {
        let file_id = &change.file_id;
        let old_path = self.tree.get_path(file_id);
        let trashed = change.file.as_ref().map(|f| f.trashed).unwrap_or(false);

        if change.removed || trashed {
            if change.file.is_none() {
                // A bare removal says nothing about scope; the tracked
                // node's origin decides.
                match self.tree.get_node(file_id) {
                    Some(node) => {
                        if !in_scope(targets, &node.drive_id) {
                            self.tree.remove_node(file_id);
                            processed.insert(file_id.clone());
                            tracing::info!(
                                "silently removed non-target node {file_id} (drive: {})",
                                node.drive_id
                            );
                            return;
                        }
                    }
                    None => return,
                }
            }
            if self.tree.get_node(file_id).is_some() {
                self.cascade_delete(file_id, refresh_dirs, notifications, processed);
            }
            processed.insert(file_id.clone());
            return;
        }

        let Some(file) = &change.file else {
            // Neither removed nor described; nothing to apply.
            return;
        };

        let drive_id = if change.drive_id.is_empty() {
            file.drive_id.clone()
        } else {
            change.drive_id.clone()
        };
        if !in_scope(targets, &drive_id) {
            if self.tree.get_node(file_id).is_some() {
                self.tree.remove_node(file_id);
                tracing::info!(
                    "node {file_id} moved out of target scope (drive: {drive_id}), silently removing"
                );
            }
            processed.insert(file_id.clone());
            return;
        }

        if file.parents.len() > 1 {
            tracing::warn!(
                "node {} ({file_id}) has {} parents, using first",
                file.name,
                file.parents.len()
            );
        }
        let parent_id = file.primary_parent();
        let is_dir = file.is_dir();

        self.tree
            .update_node(file_id, &file.name, &parent_id, is_dir, &file.drive_id);
        processed.insert(file_id.clone());
        let new_path = self
            .tree
            .resolve_path_with_fallback(self.api.as_ref(), file_id)
            .await;

        match old_path {
            None => {
                tracing::info!("[create] {new_path}");
                self.history.record("CREATE", &new_path);
                refresh_dirs.insert(dirname(&new_path));
                notifications.push(NotifyEvent {
                    path: new_path,
                    action: NotifyAction::Create,
                    is_dir,
                    drive_id: file.drive_id.clone(),
                });
            }
            Some(old_path) if old_path != new_path => {
                tracing::info!("[move] {old_path} -> {new_path}");
                self.history.record("MOVE", &new_path);
                refresh_dirs.insert(dirname(&old_path));
                refresh_dirs.insert(dirname(&new_path));

                // A move is a delete at the old path plus a create at the
                // new one, for the node itself and every descendant.
                notifications.push(NotifyEvent {
                    path: old_path.clone(),
                    action: NotifyAction::Delete,
                    is_dir,
                    drive_id: file.drive_id.clone(),
                });
                notifications.push(NotifyEvent {
                    path: new_path.clone(),
                    action: NotifyAction::Create,
                    is_dir,
                    drive_id: file.drive_id.clone(),
                });

                if is_dir {
                    for d in self.tree.get_descendants(file_id) {
                        if d.id == *file_id {
                            continue;
                        }
                        processed.insert(d.id.clone());
                        // Prefix rewrite, not segment-aware; consumers
                        // tolerate this.
                        let rel = d.path.strip_prefix(&new_path).unwrap_or("");
                        let old_child = format!("{old_path}{rel}");
                        tracing::info!("  [child move] {old_child} -> {}", d.path);
                        notifications.push(NotifyEvent {
                            path: old_child,
                            action: NotifyAction::Delete,
                            is_dir: d.is_dir,
                            drive_id: d.drive_id.clone(),
                        });
                        notifications.push(NotifyEvent {
                            path: d.path,
                            action: NotifyAction::Create,
                            is_dir: d.is_dir,
                            drive_id: d.drive_id,
                        });
                    }
                }
            }
            Some(_) => {
                // Metadata-only change, path unchanged; the tree update
                // above is all there is to do.
            }
        }
    }

    /// Delete a subtree deepest-first so child deletions are announced
    /// before their parents'.
    fn cascade_delete(
        &self,
        id: &str,
        refresh_dirs: &mut BTreeSet<String>,
        notifications: &mut Vec<NotifyEvent>,
        processed: &mut HashSet<String>,
    ) {
        let mut descendants = self.tree.get_descendants(id);
        descendants.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        for d in descendants {
            processed.insert(d.id.clone());
            tracing::info!("[delete] {}", d.path);
            self.history.record("DELETE", &d.path);
            refresh_dirs.insert(dirname(&d.path));
            notifications.push(NotifyEvent {
                path: d.path,
                action: NotifyAction::Delete,
                is_dir: d.is_dir,
                drive_id: d.drive_id,
            });
            self.tree.remove_node(&d.id);
        }
    }

    fn save_token(&self, token: &str) {
        if let Err(e) = self.tokens.store(token) {
            tracing::error!("failed to persist resume token: {e:#}");
        } else {
            tracing::debug!("resume token advanced to {token}");
        }
    }
}

/// A change is in scope when its root container is one of the configured
/// targets; an empty drive id stands for the personal root.
fn in_scope(targets: &[String], drive_id: &str) -> bool {
    let check = if drive_id.is_empty() {
        PERSONAL_ROOT_ID
    } else {
        drive_id
    };
    targets.iter().any(|t| t == check)
}

/// Containing directory of an absolute path (`/a/b/c` -> `/a/b`).
fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirname_handles_roots_and_nesting() {
        assert_eq!(dirname("/MyDrive/Movies/A.mkv"), "/MyDrive/Movies");
        assert_eq!(dirname("/MyDrive"), "/");
        assert_eq!(dirname("/"), "/");
    }

    #[test]
    fn scope_maps_empty_drive_to_personal_root() {
        let targets = vec!["root".to_string(), "d1".to_string()];
        assert!(in_scope(&targets, ""));
        assert!(in_scope(&targets, "root"));
        assert!(in_scope(&targets, "d1"));
        assert!(!in_scope(&targets, "d2"));
    }
}
