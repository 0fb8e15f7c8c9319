use std::collections::HashMap;
use std::sync::RwLock;

use crate::api::DriveApi;

/// Display names of root containers.
///
/// Path resolution runs under the tree lock and must never touch the
/// network, so lookups here are synchronous cache reads falling back to
/// the raw id. The processor and builder prime target roots up front.
pub struct DriveNameCache {
    personal_name: RwLock<String>,
    names: RwLock<HashMap<String, String>>,
}

impl DriveNameCache {
    pub fn new(personal_name: impl Into<String>) -> Self {
        DriveNameCache {
            personal_name: RwLock::new(personal_name.into()),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Keep the personal-root display name in step with config updates.
    pub fn set_personal_name(&self, name: &str) {
        let mut personal = self.personal_name.write().unwrap();
        if name.is_empty() {
            *personal = "My Drive".to_string();
        } else {
            *personal = name.to_string();
        }
    }

    /// Cached display name; the id itself when nothing is cached yet.
    /// An empty id denotes the personal root.
    pub fn get_or_id(&self, drive_id: &str) -> String {
        if drive_id.is_empty() {
            return self.personal_name.read().unwrap().clone();
        }
        self.names
            .read()
            .unwrap()
            .get(drive_id)
            .cloned()
            .unwrap_or_else(|| drive_id.to_string())
    }

    /// Seed an entry directly (tests, config remarks).
    pub fn insert(&self, drive_id: &str, name: &str) {
        self.names
            .write()
            .unwrap()
            .insert(drive_id.to_string(), name.to_string());
    }

    /// Fetch and cache the name of a shared root. Permission errors cache
    /// the id so the lookup is not repeated on every resolution.
    pub async fn prime(&self, api: &dyn DriveApi, drive_id: &str) {
        if drive_id.is_empty() || self.names.read().unwrap().contains_key(drive_id) {
            return;
        }
        match api.drive_name(drive_id).await {
            Ok(name) => {
                tracing::info!("resolved shared drive name: [{drive_id}] -> {name}");
                self.insert(drive_id, &name);
            }
            Err(e) => {
                let msg = format!("{e:#}");
                if msg.contains("403") || msg.contains("insufficient") {
                    tracing::warn!(
                        "insufficient permission for shared drive name (id: {drive_id}), using id"
                    );
                    self.insert(drive_id, drive_id);
                } else {
                    tracing::error!("failed to fetch shared drive name (id: {drive_id}): {e:#}");
                }
            }
        }
    }
}
