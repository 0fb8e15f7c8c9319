use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// One outbound JSON POST.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

/// HTTP seam for the downstream services. Returns the response status
/// code; transport-level failures (connect, timeout) are errors.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, request: PostRequest) -> Result<u16>;
}

pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(HttpTransport { http })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post_json(&self, request: PostRequest) -> Result<u16> {
        let mut builder = self
            .http
            .post(&request.url)
            .timeout(request.timeout)
            .json(&request.body);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        let resp = builder.send().await?;
        Ok(resp.status().as_u16())
    }
}

/// Records every request and lets tests observe concurrency and inject
/// failures. Responds 200 unless told otherwise.
#[derive(Default)]
pub struct VirtualTransport {
    requests: Mutex<Vec<PostRequest>>,
    latency: Option<Duration>,
    status: AtomicUsize,
    fail: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl VirtualTransport {
    pub fn new() -> Self {
        let t = VirtualTransport::default();
        t.status.store(200, Ordering::SeqCst);
        t
    }

    /// Hold each request open for `latency` so overlap becomes observable.
    pub fn with_latency(latency: Duration) -> Self {
        let mut t = Self::new();
        t.latency = Some(latency);
        t
    }

    pub fn respond_with(&self, status: u16) {
        self.status.store(usize::from(status), Ordering::SeqCst);
    }

    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PostRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Highest number of requests that were open at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookTransport for VirtualTransport {
    async fn post_json(&self, request: PostRequest) -> Result<u16> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.requests.lock().unwrap().push(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(self.status.load(Ordering::SeqCst) as u16)
    }
}
