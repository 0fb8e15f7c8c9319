use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use models::{ChangePage, FilePage, RemoteChange, RemoteFile, WatchChannel, PERSONAL_ROOT_ID};
use serde::Deserialize;
use utilities::FileSystem;

use crate::limiter::RateLimiter;
use crate::retry::retry_request;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FILE_FIELDS: &str = "id, name, parents, mimeType, trashed, driveId";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability surface of the remote file store. The daemon only reads:
/// enumeration, single-item metadata, the change feed, and push-channel
/// registration.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// One page of non-trashed files under `scope` (a root container id;
    /// [`PERSONAL_ROOT_ID`] or empty selects the personal root).
    async fn list_files(&self, scope: &str, page_token: Option<&str>) -> Result<FilePage>;

    /// Metadata for a single file, used to fill tree gaps.
    async fn get_file(&self, id: &str) -> Result<RemoteFile>;

    /// Fresh resume token positioned at "now".
    async fn get_start_page_token(&self) -> Result<String>;

    /// One page of the change feed starting at `page_token`.
    async fn list_changes(&self, page_token: &str, page_size: u32) -> Result<ChangePage>;

    /// Register a push-notification channel for the change feed.
    async fn watch_changes(&self, page_token: &str, channel: &WatchChannel) -> Result<()>;

    /// Display name of a shared root container.
    async fn drive_name(&self, drive_id: &str) -> Result<String>;
}

/* wire types (remote JSON is camelCase) */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    trashed: bool,
    #[serde(default)]
    drive_id: String,
}

impl From<WireFile> for RemoteFile {
    fn from(w: WireFile) -> Self {
        RemoteFile {
            id: w.id,
            name: w.name,
            parents: w.parents,
            mime_type: w.mime_type,
            trashed: w.trashed,
            drive_id: w.drive_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileList {
    #[serde(default)]
    files: Vec<WireFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChange {
    #[serde(default)]
    file_id: String,
    #[serde(default)]
    removed: bool,
    #[serde(default)]
    drive_id: String,
    #[serde(default)]
    file: Option<WireFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChangeList {
    #[serde(default)]
    changes: Vec<WireChange>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStartToken {
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
struct WireDrive {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// REST client for the remote store. Every call goes through the global
/// token bucket and the transient-error retry helper.
pub struct HttpDriveApi {
    http: reqwest::Client,
    access_token: String,
    limiter: RateLimiter,
}

impl HttpDriveApi {
    /// Build a client from the persisted OAuth token. Acquiring the token
    /// in the first place (the browser flow) is the dashboard's job; a
    /// missing or unreadable token file leaves the daemon quiescent.
    pub fn from_token_file(fs: &dyn FileSystem, token_path: &Path, qps: u32) -> Result<Self> {
        let bytes = fs
            .read(token_path)
            .with_context(|| format!("OAuth token not found at {}", token_path.display()))?;
        let stored: StoredToken =
            serde_json::from_slice(&bytes).context("OAuth token file is not valid JSON")?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(HttpDriveApi {
            http,
            access_token: stored.access_token,
            limiter: RateLimiter::new(qps),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.limiter.acquire().await;
        retry_request(|| async {
            let resp = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("{url} failed: {status} {body}");
            }
            Ok(resp.json::<T>().await?)
        })
        .await
    }
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn list_files(&self, scope: &str, page_token: Option<&str>) -> Result<FilePage> {
        let url = format!("{API_BASE}/files");
        let fields = format!("nextPageToken, incompleteSearch, files({FILE_FIELDS})");
        let mut query: Vec<(&str, &str)> = vec![
            ("q", "trashed = false"),
            ("fields", &fields),
            ("pageSize", "1000"),
        ];
        // Scoping to a shared root requires both all-drives switches.
        if !scope.is_empty() && scope != PERSONAL_ROOT_ID {
            query.push(("corpora", "drive"));
            query.push(("driveId", scope));
            query.push(("supportsAllDrives", "true"));
            query.push(("includeItemsFromAllDrives", "true"));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let list: WireFileList = self.get_json(&url, &query).await?;
        Ok(FilePage {
            files: list.files.into_iter().map(RemoteFile::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn get_file(&self, id: &str) -> Result<RemoteFile> {
        let url = format!("{API_BASE}/files/{id}");
        let wire: WireFile = self
            .get_json(
                &url,
                &[
                    ("fields", "id, name, parents, mimeType, driveId"),
                    ("supportsAllDrives", "true"),
                ],
            )
            .await?;
        Ok(wire.into())
    }

    async fn get_start_page_token(&self) -> Result<String> {
        let url = format!("{API_BASE}/changes/startPageToken");
        let wire: WireStartToken = self
            .get_json(&url, &[("supportsAllDrives", "true")])
            .await?;
        Ok(wire.start_page_token)
    }

    async fn list_changes(&self, page_token: &str, page_size: u32) -> Result<ChangePage> {
        let url = format!("{API_BASE}/changes");
        let fields = format!(
            "nextPageToken, newStartPageToken, changes(fileId, removed, driveId, file({FILE_FIELDS}))"
        );
        let size = page_size.to_string();
        let wire: WireChangeList = self
            .get_json(
                &url,
                &[
                    ("pageToken", page_token),
                    ("pageSize", &size),
                    ("fields", &fields),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                ],
            )
            .await?;
        Ok(ChangePage {
            changes: wire
                .changes
                .into_iter()
                .map(|c| RemoteChange {
                    file_id: c.file_id,
                    removed: c.removed,
                    drive_id: c.drive_id,
                    file: c.file.map(RemoteFile::from),
                })
                .collect(),
            next_page_token: wire.next_page_token,
            new_start_page_token: wire.new_start_page_token,
        })
    }

    async fn watch_changes(&self, page_token: &str, channel: &WatchChannel) -> Result<()> {
        let url = format!("{API_BASE}/changes/watch");
        let body = serde_json::json!({
            "id": channel.id,
            "type": "web_hook",
            "address": channel.address,
            "expiration": channel.expiration_ms,
        });
        self.limiter.acquire().await;
        retry_request(|| async {
            let resp = self
                .http
                .post(&url)
                .query(&[
                    ("pageToken", page_token),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                ])
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("changes.watch failed: {status} {text}");
            }
            Ok(())
        })
        .await
    }

    async fn drive_name(&self, drive_id: &str) -> Result<String> {
        let url = format!("{API_BASE}/drives/{drive_id}");
        let wire: WireDrive = self.get_json(&url, &[("fields", "name")]).await?;
        Ok(wire.name)
    }
}
