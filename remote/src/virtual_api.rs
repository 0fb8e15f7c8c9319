use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use models::{ChangePage, FilePage, RemoteFile, WatchChannel};

use crate::api::DriveApi;

#[derive(Default)]
struct State {
    files: HashMap<String, RemoteFile>,
    listings: HashMap<String, Vec<Vec<RemoteFile>>>,
    change_feed: HashMap<String, ChangePage>,
    failing_tokens: HashSet<String>,
    start_token: String,
    drive_names: HashMap<String, String>,
    watches: Vec<(String, WatchChannel)>,
    file_lookups: Vec<String>,
    fail_get_file: bool,
}

/// In-memory stand-in for the remote store, scriptable per test: seed
/// files and change pages, then observe lookups and watch registrations.
#[derive(Default)]
pub struct VirtualDriveApi {
    state: Mutex<State>,
}

impl VirtualDriveApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed metadata served by `get_file`.
    pub fn add_file(&self, file: RemoteFile) {
        let mut s = self.state.lock().unwrap();
        s.files.insert(file.id.clone(), file);
    }

    /// Seed the paged enumeration for a scope.
    pub fn set_listing(&self, scope: &str, pages: Vec<Vec<RemoteFile>>) {
        let mut s = self.state.lock().unwrap();
        s.listings.insert(scope.to_string(), pages);
    }

    /// Serve `page` when the feed is read at `token`.
    pub fn set_change_page(&self, token: &str, page: ChangePage) {
        let mut s = self.state.lock().unwrap();
        s.change_feed.insert(token.to_string(), page);
    }

    /// Make reads at `token` fail (paging-abort scenarios).
    pub fn fail_at_token(&self, token: &str) {
        let mut s = self.state.lock().unwrap();
        s.failing_tokens.insert(token.to_string());
    }

    pub fn clear_failure(&self, token: &str) {
        let mut s = self.state.lock().unwrap();
        s.failing_tokens.remove(token);
    }

    pub fn set_start_token(&self, token: &str) {
        let mut s = self.state.lock().unwrap();
        s.start_token = token.to_string();
    }

    pub fn set_drive_name(&self, drive_id: &str, name: &str) {
        let mut s = self.state.lock().unwrap();
        s.drive_names.insert(drive_id.to_string(), name.to_string());
    }

    pub fn fail_get_file(&self, fail: bool) {
        let mut s = self.state.lock().unwrap();
        s.fail_get_file = fail;
    }

    /// Ids passed to `get_file`, in call order.
    pub fn file_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().file_lookups.clone()
    }

    /// Registered watch channels as `(page_token, channel)` pairs.
    pub fn watches(&self) -> Vec<(String, WatchChannel)> {
        self.state.lock().unwrap().watches.clone()
    }
}

#[async_trait]
impl DriveApi for VirtualDriveApi {
    async fn list_files(&self, scope: &str, page_token: Option<&str>) -> Result<FilePage> {
        let s = self.state.lock().unwrap();
        let pages = s
            .listings
            .get(scope)
            .ok_or_else(|| anyhow!("404 unknown scope {scope}"))?;
        let index: usize = match page_token {
            Some(token) => token.parse()?,
            None => 0,
        };
        let files = pages.get(index).cloned().unwrap_or_default();
        let next = if index + 1 < pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(FilePage {
            files,
            next_page_token: next,
        })
    }

    async fn get_file(&self, id: &str) -> Result<RemoteFile> {
        let mut s = self.state.lock().unwrap();
        s.file_lookups.push(id.to_string());
        if s.fail_get_file {
            bail!("500 backend error");
        }
        s.files
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("404 file not found: {id}"))
    }

    async fn get_start_page_token(&self) -> Result<String> {
        let s = self.state.lock().unwrap();
        if s.start_token.is_empty() {
            bail!("start token not configured");
        }
        Ok(s.start_token.clone())
    }

    async fn list_changes(&self, page_token: &str, _page_size: u32) -> Result<ChangePage> {
        let s = self.state.lock().unwrap();
        if s.failing_tokens.contains(page_token) {
            bail!("503 change feed unavailable");
        }
        s.change_feed
            .get(page_token)
            .cloned()
            .ok_or_else(|| anyhow!("invalid page token {page_token}"))
    }

    async fn watch_changes(&self, page_token: &str, channel: &WatchChannel) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.watches.push((page_token.to_string(), channel.clone()));
        Ok(())
    }

    async fn drive_name(&self, drive_id: &str) -> Result<String> {
        let s = self.state.lock().unwrap();
        s.drive_names
            .get(drive_id)
            .cloned()
            .ok_or_else(|| anyhow!("403 insufficient authentication scopes"))
    }
}
