use std::sync::Arc;
use std::time::Duration;

use models::NotifyEvent;
use serde_json::{Map, Value};
use settings::{rewrite_first_match, ConfigStore};
use utilities::unix_seconds;

use crate::transport::{PostRequest, WebhookTransport};

const PLACEHOLDER_PATH: &str = "{{FILE_PATH}}";
const PLACEHOLDER_ACTION: &str = "{{ACTION}}";
const PLACEHOLDER_IS_DIR: &str = "{{IS_DIR}}";

const DEFAULT_AUTHORIZATION: &str = "basic usernamepassword";
const DEFAULT_USER_AGENT: &str = "clouddrive2/0.9.8";

/// Pushes create/delete events to the media indexer, one templated JSON
/// POST per event, in the order the processor emitted them. Stateless and
/// fire-and-forget.
pub struct NotifyService {
    store: Arc<ConfigStore>,
    transport: Arc<dyn WebhookTransport>,
}

impl NotifyService {
    pub fn new(store: Arc<ConfigStore>, transport: Arc<dyn WebhookTransport>) -> Self {
        NotifyService { store, transport }
    }

    pub async fn send_all(&self, events: &[NotifyEvent]) {
        for event in events {
            self.send(event).await;
        }
    }

    pub async fn send(&self, event: &NotifyEvent) {
        let cfg = self.store.snapshot().symedia;
        if cfg.host.is_empty() {
            return;
        }
        let rules = self.store.rules().notify;

        let (final_path, matched) = match rewrite_first_match(&rules, &event.path) {
            Some(p) => (p, true),
            None => (event.path.clone(), false),
        };
        if !matched {
            tracing::warn!("no notify mapping matched: {}", event.path);
            if !cfg.notify_unmatched {
                return;
            }
        }

        let base = format!(
            "{}/{}",
            cfg.host.trim_end_matches('/'),
            cfg.endpoint.trim_start_matches('/')
        );
        let mut url = match reqwest::Url::parse(&base) {
            Ok(u) => u,
            Err(e) => {
                tracing::error!("invalid notify URL {base}: {e}");
                return;
            }
        };
        // Plain template strings double as query parameters.
        for (key, value) in &cfg.body_template {
            if let Value::String(s) = value {
                if !s.contains("{{") {
                    url.query_pairs_mut().append_pair(key, s);
                }
            }
        }

        let replacements = [
            (PLACEHOLDER_PATH, Value::String(final_path.clone())),
            (
                PLACEHOLDER_ACTION,
                Value::String(event.action.as_str().to_string()),
            ),
            (PLACEHOLDER_IS_DIR, Value::Bool(event.is_dir)),
        ];

        let mut body = Map::new();
        for (key, value) in &cfg.body_template {
            body.insert(key.clone(), expand_template(value, &replacements));
        }
        let ts = unix_seconds().to_string();
        body.insert("event_time".to_string(), Value::String(ts.clone()));
        body.insert("send_time".to_string(), Value::String(ts));

        let mut headers: Vec<(String, String)> = vec![(
            "content-type".to_string(),
            "application/json".to_string(),
        )];
        for (key, value) in &cfg.headers {
            headers.push((key.clone(), value.clone()));
        }
        if !cfg.headers.contains_key("authorization") {
            headers.push(("authorization".to_string(), DEFAULT_AUTHORIZATION.to_string()));
        }
        if !cfg.headers.contains_key("user-agent") {
            headers.push(("user-agent".to_string(), DEFAULT_USER_AGENT.to_string()));
        }

        let request = PostRequest {
            url: url.to_string(),
            headers,
            body: Value::Object(body),
            timeout: Duration::from_secs(cfg.timeout),
        };

        tracing::info!("sending notification: {final_path}");
        match self.transport.post_json(request).await {
            Ok(status) if (200..300).contains(&status) => {
                tracing::info!("notification pushed [{status}]");
            }
            Ok(status) => {
                tracing::error!("notification push error [{status}]");
            }
            Err(e) => {
                tracing::error!("notification push failed: {e:#}");
            }
        }
    }
}

/// Recursive placeholder substitution. A string equal to one placeholder
/// takes its typed value; a string containing placeholders gets them
/// text-replaced with the stringified value.
fn expand_template(value: &Value, replacements: &[(&str, Value)]) -> Value {
    match value {
        Value::String(s) => {
            for (placeholder, replacement) in replacements {
                if s == placeholder {
                    return replacement.clone();
                }
            }
            let mut out = s.clone();
            for (placeholder, replacement) in replacements {
                if out.contains(placeholder) {
                    let text = match replacement {
                        Value::String(v) => v.clone(),
                        other => other.to_string(),
                    };
                    out = out.replace(placeholder, &text);
                }
            }
            Value::String(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), expand_template(v, replacements));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| expand_template(v, replacements))
                .collect(),
        ),
        other => other.clone(),
    }
}
