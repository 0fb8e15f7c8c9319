#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use models::{DescendantInfo, Node, PERSONAL_ROOT_ID};
use remote::{DriveApi, DriveNameCache};

pub mod snapshot;

/// Ancestor chains fetched through the fallback path are bounded; the
/// remote store cannot produce cycles, but a corrupted snapshot could.
const MAX_FALLBACK_DEPTH: usize = 128;

#[derive(Default)]
struct TreeInner {
    nodes: HashMap<String, Node>,
    children: HashMap<String, HashSet<String>>,
}

/// In-memory shadow of the remote directory structure.
///
/// One reader-writer lock covers both the node map and the child index, so
/// readers observe every mutation atomically. The lock is never held
/// across an await point.
pub struct ShadowTree {
    inner: RwLock<TreeInner>,
    names: Arc<DriveNameCache>,
}

impl ShadowTree {
    pub fn new(names: Arc<DriveNameCache>) -> Self {
        ShadowTree {
            inner: RwLock::new(TreeInner::default()),
            names,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a node. When the parent changed, the old parent's
    /// child entry is dropped before re-indexing.
    pub fn update_node(&self, id: &str, name: &str, parent_id: &str, is_dir: bool, drive_id: &str) {
        let mut inner = self.inner.write().unwrap();

        let moved_from = match inner.nodes.get(id) {
            Some(old) if old.parent_id != parent_id => Some(old.parent_id.clone()),
            _ => None,
        };
        if let Some(old_parent) = moved_from {
            if let Some(kids) = inner.children.get_mut(&old_parent) {
                kids.remove(id);
                if kids.is_empty() {
                    inner.children.remove(&old_parent);
                }
            }
        }

        inner.nodes.insert(
            id.to_string(),
            Node {
                id: id.to_string(),
                name: name.to_string(),
                parent_id: parent_id.to_string(),
                is_dir,
                drive_id: drive_id.to_string(),
            },
        );

        if !parent_id.is_empty() {
            inner
                .children
                .entry(parent_id.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    /// Remove a single node. Descendants are left in place; cascading is
    /// the change processor's responsibility.
    pub fn remove_node(&self, id: &str) {
        let mut inner = self.inner.write().unwrap();

        let parent_id = match inner.nodes.get(id) {
            Some(node) => node.parent_id.clone(),
            None => return,
        };

        if !parent_id.is_empty() {
            if let Some(kids) = inner.children.get_mut(&parent_id) {
                kids.remove(id);
                if kids.is_empty() {
                    inner.children.remove(&parent_id);
                }
            }
        }

        inner.children.remove(id);
        inner.nodes.remove(id);
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.inner.read().unwrap().nodes.get(id).cloned()
    }

    /// Absolute path of a node, `None` while any ancestor is missing.
    pub fn get_path(&self, id: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        Self::path_locked(&inner, &self.names, id)
    }

    fn path_locked(inner: &TreeInner, names: &DriveNameCache, id: &str) -> Option<String> {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = inner.nodes.get(id)?;
        let mut hops = 0usize;

        loop {
            if current.parent_id.is_empty() {
                let drive_name = names.get_or_id(&current.drive_id);
                let mut path = String::with_capacity(64);
                path.push('/');
                path.push_str(&drive_name);

                // A shared root's own node (id == drive_id) and the
                // personal root node ("root") already ARE the drive name;
                // appending their display name would duplicate the segment.
                let root_only = (!current.drive_id.is_empty() && current.id == current.drive_id)
                    || current.id == PERSONAL_ROOT_ID;
                if !root_only {
                    path.push('/');
                    path.push_str(&current.name);
                }
                for seg in segments.iter().rev() {
                    path.push('/');
                    path.push_str(seg);
                }
                return Some(path);
            }

            segments.push(&current.name);
            hops += 1;
            if hops > inner.nodes.len() {
                tracing::error!("parent chain for {id} exceeds node count, tree is corrupt");
                return None;
            }
            current = inner.nodes.get(&current.parent_id)?;
        }
    }

    /// The subtree rooted at `id`, the root itself included. Order is
    /// unspecified; callers needing order sort afterwards. Entries whose
    /// path cannot be resolved are skipped.
    pub fn get_descendants(&self, id: &str) -> Vec<DescendantInfo> {
        let inner = self.inner.read().unwrap();
        let mut results = Vec::new();
        let mut stack = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            let Some(node) = inner.nodes.get(&current) else {
                continue;
            };
            if let Some(path) = Self::path_locked(&inner, &self.names, &current) {
                results.push(DescendantInfo {
                    id: current.clone(),
                    path,
                    is_dir: node.is_dir,
                    drive_id: node.drive_id.clone(),
                });
            }
            if let Some(kids) = inner.children.get(&current) {
                stack.extend(kids.iter().cloned());
            }
        }
        results
    }

    /// Atomically install `other`'s contents, replacing everything.
    pub fn replace_with(&self, other: &ShadowTree) {
        let mut dst = self.inner.write().unwrap();
        let src = other.inner.read().unwrap();
        dst.nodes = src.nodes.clone();
        dst.children = src.children.clone();
        tracing::info!("tree replaced atomically, nodes: {}", dst.nodes.len());
    }

    /// Resolve a path, filling tree gaps from the remote metadata API.
    ///
    /// Always produces a path string: sentinel prefixes
    /// `/UNRESOLVED_PATH/` and `/UNKNOWN_API_ERROR/` mark resolutions that
    /// downstream consumers may treat as non-actionable.
    pub async fn resolve_path_with_fallback(&self, api: &dyn DriveApi, id: &str) -> String {
        if let Some(path) = self.get_path(id) {
            return path;
        }
        self.fallback_resolve(api, id, 0).await
    }

    fn fallback_resolve<'a>(
        &'a self,
        api: &'a dyn DriveApi,
        id: &'a str,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move {
            let file = match api.get_file(id).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("fallback metadata query failed (id: {id}): {e:#}");
                    return format!("/UNKNOWN_API_ERROR/{id}");
                }
            };

            if file.parents.len() > 1 {
                tracing::warn!(
                    "node {} ({}) has {} parents, using first",
                    file.name,
                    file.id,
                    file.parents.len()
                );
            }
            let parent_id = file.primary_parent();
            self.update_node(&file.id, &file.name, &parent_id, file.is_dir(), &file.drive_id);
            tracing::debug!("fallback added node {} (parent: {parent_id})", file.name);

            if !parent_id.is_empty()
                && self.get_path(&parent_id).is_none()
                && depth < MAX_FALLBACK_DEPTH
            {
                self.fallback_resolve(api, &parent_id, depth + 1).await;
            }

            match self.get_path(id) {
                Some(path) => path,
                None => {
                    let parent_name = if parent_id.is_empty() {
                        "UNKNOWN_PARENT".to_string()
                    } else {
                        self.get_node(&parent_id)
                            .map(|n| n.name)
                            .unwrap_or_else(|| "UNKNOWN_PARENT".to_string())
                    };
                    tracing::warn!(
                        "path resolution failed (id: {id}, parent: {parent_id}), returning error path"
                    );
                    format!("/UNRESOLVED_PATH/{parent_name}/{}", file.name)
                }
            }
        })
    }

    /// Swap in a freshly parsed node set (snapshot load).
    fn install(&self, nodes: HashMap<String, Node>) {
        let children = rebuild_children(&nodes);
        let mut inner = self.inner.write().unwrap();
        inner.nodes = nodes;
        inner.children = children;
    }

    fn export_nodes(&self) -> Vec<Node> {
        self.inner.read().unwrap().nodes.values().cloned().collect()
    }
}

fn rebuild_children(nodes: &HashMap<String, Node>) -> HashMap<String, HashSet<String>> {
    let mut children: HashMap<String, HashSet<String>> = HashMap::new();
    for node in nodes.values() {
        if !node.parent_id.is_empty() {
            children
                .entry(node.parent_id.clone())
                .or_default()
                .insert(node.id.clone());
        }
    }
    children
}
