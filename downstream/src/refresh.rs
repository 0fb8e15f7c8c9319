use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use models::RefreshEndpoint;
use serde_json::json;
use settings::{rewrite_first_match, CompiledRule, ConfigStore};
use tokio::sync::Semaphore;

use crate::transport::{PostRequest, WebhookTransport};

/// Per-request timeout for VFS refresh calls.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
/// Outstanding refresh requests across all endpoints.
const MAX_IN_FLIGHT: usize = 5;
const DEFAULT_ENDPOINT: &str = "/vfs/refresh";

/// Fans directory-invalidation POSTs out to the configured VFS cache
/// endpoints. Best-effort: failures are logged, never retried.
pub struct RefreshService {
    store: Arc<ConfigStore>,
    transport: Arc<dyn WebhookTransport>,
    permits: Arc<Semaphore>,
}

impl RefreshService {
    pub fn new(store: Arc<ConfigStore>, transport: Arc<dyn WebhookTransport>) -> Self {
        RefreshService {
            store,
            transport,
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    /// Dispatch one task per (endpoint, path) and wait for all of them.
    pub async fn refresh_all(&self, dirs: &BTreeSet<String>) {
        let endpoints = self.store.snapshot().rclone;
        if endpoints.is_empty() || dirs.is_empty() {
            return;
        }
        let rules = self.store.rules().refresh;

        let mut handles = Vec::new();
        for (idx, endpoint) in endpoints.iter().enumerate() {
            let endpoint_rules = rules.get(idx).cloned().unwrap_or_default();
            for dir in dirs {
                let Some(target) = rewrite_for_endpoint(&endpoint_rules, dir) else {
                    // Multi-endpoint setups partition by mapping; an
                    // unmatched path simply belongs to another endpoint.
                    continue;
                };
                let endpoint = endpoint.clone();
                let transport = Arc::clone(&self.transport);
                let permits = Arc::clone(&self.permits);
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    send_refresh(transport.as_ref(), &endpoint, &target).await;
                }));
            }
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Cooldown between refresh fan-out and notification dispatch, giving
    /// the cache time to finish its async reload.
    pub async fn wait_for_cooldown(&self) {
        let wait = self.store.snapshot().advanced.rclone_wait_seconds;
        if wait > 0 {
            tracing::info!("refresh cooldown ({wait}s)...");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }
}

/// First-match rewrite; a second pass with a trailing slash supports
/// patterns anchored at a drive root.
pub fn rewrite_for_endpoint(rules: &[CompiledRule], path: &str) -> Option<String> {
    if let Some(rewritten) = rewrite_first_match(rules, path) {
        return Some(rewritten);
    }

    let mut with_slash = path.to_string();
    if !with_slash.ends_with('/') {
        with_slash.push('/');
    }
    let rewritten = rewrite_first_match(rules, &with_slash)?;
    let trimmed = rewritten.trim_end_matches('/');
    if trimmed.is_empty() {
        Some("/".to_string())
    } else {
        Some(trimmed.to_string())
    }
}

/// `<host><endpoint>` with `_async=true` appended.
fn refresh_url(endpoint: &RefreshEndpoint) -> String {
    let ep = if endpoint.endpoint.is_empty() {
        DEFAULT_ENDPOINT
    } else {
        &endpoint.endpoint
    };
    let mut url = format!(
        "{}/{}",
        endpoint.host.trim_end_matches('/'),
        ep.trim_start_matches('/')
    );
    if url.contains('?') {
        url.push_str("&_async=true");
    } else {
        url.push_str("?_async=true");
    }
    url
}

async fn send_refresh(transport: &dyn WebhookTransport, endpoint: &RefreshEndpoint, dir: &str) {
    let request = PostRequest {
        url: refresh_url(endpoint),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: json!({ "dir": dir, "recursive": "true" }),
        timeout: REFRESH_TIMEOUT,
    };

    tracing::info!("[{}] refreshing: {dir}", endpoint.name);
    match transport.post_json(request).await {
        Ok(status) if (200..300).contains(&status) => {
            tracing::info!("[{}] refresh successful [{status}]", endpoint.name);
        }
        Ok(status) => {
            tracing::error!("[{}] refresh error [{status}]", endpoint.name);
        }
        Err(e) => {
            tracing::error!("[{}] refresh failed: {e:#}", endpoint.name);
        }
    }
}
