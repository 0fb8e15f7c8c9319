use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use downstream::{RefreshService, VirtualTransport};
use models::{AppConfig, MappingRule, RefreshEndpoint};
use settings::ConfigStore;
use utilities::VirtualFileSystem;

fn endpoint(name: &str, rules: Vec<(&str, &str)>) -> RefreshEndpoint {
    RefreshEndpoint {
        name: name.to_string(),
        host: format!("http://{name}:5572"),
        endpoint: "/vfs/refresh".to_string(),
        timeout: 60,
        mapping: rules
            .into_iter()
            .map(|(regex, replacement)| MappingRule {
                regex: regex.to_string(),
                replacement: replacement.to_string(),
            })
            .collect(),
    }
}

fn store_with(endpoints: Vec<RefreshEndpoint>) -> Arc<ConfigStore> {
    let mut cfg = AppConfig::default();
    cfg.rclone = endpoints;
    cfg.advanced.rclone_wait_seconds = 0;
    Arc::new(ConfigStore::from_config(
        Arc::new(VirtualFileSystem::new()),
        PathBuf::from("cfg.json"),
        cfg,
    ))
}

fn dirs(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn rewrites_and_posts_with_async_flag() {
    let transport = Arc::new(VirtualTransport::new());
    let store = store_with(vec![endpoint("cache", vec![("^/MyDrive(.*)$", "$1")])]);
    let service = RefreshService::new(store, transport.clone());

    service.refresh_all(&dirs(&["/MyDrive/Movies"])).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://cache:5572/vfs/refresh?_async=true");
    assert_eq!(
        requests[0].body,
        serde_json::json!({ "dir": "/Movies", "recursive": "true" })
    );
    assert_eq!(requests[0].timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn appends_async_flag_to_existing_query() {
    let transport = Arc::new(VirtualTransport::new());
    let mut ep = endpoint("cache", vec![("^/MyDrive(.*)$", "$1")]);
    ep.endpoint = "/vfs/refresh?fs=gd:".to_string();
    let service = RefreshService::new(store_with(vec![ep]), transport.clone());

    service.refresh_all(&dirs(&["/MyDrive/Movies"])).await;

    assert_eq!(
        transport.requests()[0].url,
        "http://cache:5572/vfs/refresh?fs=gd:&_async=true"
    );
}

#[tokio::test]
async fn drive_root_matches_via_trailing_slash_retry() {
    let transport = Arc::new(VirtualTransport::new());
    // Pattern only matches with the trailing separator present.
    let store = store_with(vec![endpoint("cache", vec![("^/MyDrive/(.*)$", "/$1")])]);
    let service = RefreshService::new(store, transport.clone());

    service.refresh_all(&dirs(&["/MyDrive"])).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    // `/MyDrive` + `/` rewrites to `/`, trimmed back to the root.
    assert_eq!(requests[0].body["dir"], "/");
}

#[tokio::test]
async fn unmatched_path_is_skipped_per_endpoint() {
    let transport = Arc::new(VirtualTransport::new());
    let store = store_with(vec![
        endpoint("movies", vec![("^/Movies(.*)$", "$1")]),
        endpoint("shows", vec![("^/Shows(.*)$", "$1")]),
    ]);
    let service = RefreshService::new(store, transport.clone());

    service
        .refresh_all(&dirs(&["/Movies/Action", "/Shows/Drama"]))
        .await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
    assert!(urls.iter().any(|u| u.starts_with("http://movies")));
    assert!(urls.iter().any(|u| u.starts_with("http://shows")));
}

#[tokio::test]
async fn no_endpoints_is_a_no_op() {
    let transport = Arc::new(VirtualTransport::new());
    let service = RefreshService::new(store_with(Vec::new()), transport.clone());
    service.refresh_all(&dirs(&["/MyDrive/Movies"])).await;
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn failures_are_swallowed() {
    let transport = Arc::new(VirtualTransport::new());
    transport.fail_requests(true);
    let store = store_with(vec![endpoint("cache", vec![("^/(.*)$", "/$1")])]);
    let service = RefreshService::new(store, transport.clone());

    // Must complete despite every POST failing.
    service.refresh_all(&dirs(&["/MyDrive/Movies", "/MyDrive/Shows"])).await;
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_requests_never_exceed_five() {
    let transport = Arc::new(VirtualTransport::with_latency(Duration::from_millis(20)));
    let store = store_with(vec![
        endpoint("a", vec![("^/(.*)$", "/$1")]),
        endpoint("b", vec![("^/(.*)$", "/$1")]),
    ]);
    let service = RefreshService::new(store, transport.clone());

    let many: Vec<String> = (0..15).map(|i| format!("/MyDrive/dir{i}")).collect();
    let set: BTreeSet<String> = many.into_iter().collect();
    service.refresh_all(&set).await;

    // 2 endpoints x 15 paths, but never more than 5 at once.
    assert_eq!(transport.request_count(), 30);
    assert!(
        transport.max_in_flight() <= 5,
        "observed {} concurrent requests",
        transport.max_in_flight()
    );
}
