use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use utilities::{write_atomic, FileSystem};

use crate::api::DriveApi;

/// Resume-token persistence: a single raw string file, replaced
/// atomically. The processor only writes it after a fully-processed run.
#[derive(Clone)]
pub struct TokenStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl TokenStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: PathBuf) -> Self {
        TokenStore { fs, path }
    }

    /// Current token, `None` when missing or empty.
    pub fn load(&self) -> Option<String> {
        let bytes = self.fs.read(&self.path).ok()?;
        let token = String::from_utf8_lossy(&bytes).trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn store(&self, token: &str) -> Result<()> {
        write_atomic(self.fs.as_ref(), &self.path, token.as_bytes())?;
        Ok(())
    }

    /// Make sure a token exists, asking the remote for a fresh start
    /// position when the file is missing.
    pub async fn ensure(&self, api: &dyn DriveApi) -> Result<()> {
        if self.load().is_some() {
            return Ok(());
        }
        let token = api.get_start_page_token().await?;
        self.store(&token)?;
        tracing::info!("acquired initial resume token");
        Ok(())
    }
}
