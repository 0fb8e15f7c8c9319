use serde::{Deserialize, Serialize};

/// MIME type the remote store uses to mark directories.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Sentinel id of the personal root container. The change feed reports an
/// empty `drive_id` for it; scope checks map empty to this value.
pub const PERSONAL_ROOT_ID: &str = "root";

/// One entry of the shadow tree, keyed by the remote object id.
///
/// `parent_id` is empty for roots. `drive_id` names the root container the
/// node lives in; empty denotes the personal root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub drive_id: String,
}

/// Subtree traversal result: the node plus its resolved absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantInfo {
    pub id: String,
    pub path: String,
    pub is_dir: bool,
    pub drive_id: String,
}

/// File metadata as returned by the remote enumeration and metadata APIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub drive_id: String,
}

impl RemoteFile {
    pub fn is_dir(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// First parent id, empty when the file has none.
    pub fn primary_parent(&self) -> String {
        self.parents.first().cloned().unwrap_or_default()
    }
}

/// One entry of the remote change feed. `file` is absent for hard removals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub file_id: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub file: Option<RemoteFile>,
}

/// One page of the change feed. `new_start_page_token` appears only on the
/// final page and becomes the next resume token once processing succeeds.
#[derive(Debug, Clone, Default)]
pub struct ChangePage {
    pub changes: Vec<RemoteChange>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

/// One page of a file enumeration.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<RemoteFile>,
    pub next_page_token: Option<String>,
}

/// Push-notification channel registration (expires 7 days out; the daemon
/// re-registers every 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchChannel {
    pub id: String,
    pub address: String,
    pub expiration_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyAction {
    Create,
    Delete,
}

impl NotifyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyAction::Create => "create",
            NotifyAction::Delete => "delete",
        }
    }
}

/// Event emitted toward the media indexer, in change-feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    pub path: String,
    pub action: NotifyAction,
    pub is_dir: bool,
    pub drive_id: String,
}
