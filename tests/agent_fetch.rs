//! Agent client behavior against mock configuration agents.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use appconfig_gate::sync::{AgentFetcher, FetchError, FetchResult};
use serde_json::json;

mod common;

fn fetcher(addr: std::net::SocketAddr, timeout: Duration) -> AgentFetcher {
    AgentFetcher::new(&format!("http://{}", addr), &common::endpoint(), timeout).unwrap()
}

#[tokio::test]
async fn test_ok_document_is_updated() {
    let seen = Arc::new(Mutex::new(String::new()));
    let seen_in_agent = seen.clone();
    let addr = common::start_programmable_agent(move |request_line| {
        *seen_in_agent.lock().unwrap() = request_line;
        async { (200, r#"{"featureXEnabled": true, "apiUrl": "https://new"}"#.to_string()) }
    })
    .await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    match result {
        FetchResult::Updated(doc) => {
            assert_eq!(doc["featureXEnabled"], json!(true));
            assert_eq!(doc["apiUrl"], json!("https://new"));
        }
        other => panic!("expected Updated, got {:?}", other),
    }
    assert_eq!(
        *seen.lock().unwrap(),
        "GET /applications/myapp/environments/prod/configurations/app-config HTTP/1.1"
    );
}

#[tokio::test]
async fn test_not_modified_is_unchanged() {
    let addr = common::start_fixed_agent(304, "").await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    assert!(matches!(result, FetchResult::Unchanged), "got {:?}", result);
}

#[tokio::test]
async fn test_error_status_is_upstream_failure() {
    let addr = common::start_fixed_agent(500, "agent exploded").await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    match result {
        FetchResult::Failed(FetchError::Upstream { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "agent exploded");
        }
        other => panic!("expected Upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_error_body_returns_excerpt_promptly() {
    let addr = common::start_stalled_error_agent(503, 2048).await;

    let started = Instant::now();
    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    match result {
        FetchResult::Failed(FetchError::Upstream { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, format!("{}...", "x".repeat(256)));
        }
        other => panic!("expected Upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let addr = common::start_fixed_agent(200, "{not json").await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    assert!(
        matches!(result, FetchResult::Failed(FetchError::Malformed(_))),
        "got {:?}",
        result
    );
}

#[tokio::test]
async fn test_non_object_json_is_malformed() {
    let addr = common::start_fixed_agent(200, "[1, 2, 3]").await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    match result {
        FetchResult::Failed(FetchError::Malformed(reason)) => assert!(reason.contains("array")),
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let addr = common::closed_port().await;

    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    assert!(
        matches!(result, FetchResult::Failed(FetchError::Transport(_))),
        "got {:?}",
        result
    );
}

#[tokio::test]
async fn test_unresponsive_agent_times_out() {
    let addr = common::start_silent_agent().await;
    let timeout = Duration::from_millis(500);

    let started = Instant::now();
    let result = fetcher(addr, timeout).fetch_once().await;
    let elapsed = started.elapsed();

    assert!(
        matches!(result, FetchResult::Failed(FetchError::Timeout(t)) if t == timeout),
        "got {:?}",
        result
    );
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(1), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_slow_agent_bounded_by_default_timeout() {
    let addr = common::start_programmable_agent(|_| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        (200, "{}".to_string())
    })
    .await;

    let started = Instant::now();
    let result = fetcher(addr, Duration::from_secs(5)).fetch_once().await;

    assert!(matches!(result, FetchResult::Failed(FetchError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(6));
}
