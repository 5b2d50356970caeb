//! Nacos client tests against a mocked open API.

use proxy_config_sync::error::SyncError;
use proxy_config_sync::remote::{
    ChangeEvent, ChangeListener, ChangeNotification, FetchFailure, NacosClient, RemoteConfigClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIGS: &str = "/nacos/v1/cs/configs";
const LISTENER: &str = "/nacos/v1/cs/configs/listener";

fn client(server: &MockServer) -> NacosClient {
    NacosClient::builder()
        .with_base_url(format!("{}/nacos", server.uri()))
        .with_namespace("prod")
        .with_timeout(Duration::from_secs(2))
        .with_long_poll_timeout(Duration::from_millis(500))
        .with_retry_delay(Duration::from_millis(50))
        .build()
        .unwrap()
}

fn channel_listener() -> (ChangeListener, mpsc::UnboundedReceiver<ChangeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: ChangeListener = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (listener, rx)
}

/// Drain everything the listener received within `window`.
async fn collect_events(
    rx: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    window: Duration,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
    })
    .await;
    events
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

/// Reports a change for every long poll without holding it.
async fn mount_eager_listener(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(200).set_body_string("app%02DEFAULT%02prod%01"))
        .mount(server)
        .await;
}

/// Answers every long poll with "no change" after a short hold.
async fn mount_quiet_listener(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .and(query_param("dataId", "app"))
        .and(query_param("group", "DEFAULT"))
        .and(query_param("tenant", "prod"))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{}"))
        .expect(1)
        .mount(&server)
        .await;

    let content = client(&server).fetch("app", "DEFAULT").await.unwrap();
    assert_eq!(content, "server{}");
}

#[tokio::test]
async fn test_fetch_missing_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(404).set_body_string("config data not exist"))
        .mount(&server)
        .await;

    let err = client(&server).fetch("missing", "DEFAULT").await.unwrap_err();
    match err {
        SyncError::FetchError {
            remote_id, reason, ..
        } => {
            assert_eq!(remote_id, "missing");
            assert!(reason.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).fetch("app", "DEFAULT").await.unwrap_err();
    assert!(matches!(err, SyncError::FetchError { .. }));
}

#[tokio::test]
async fn test_fetch_unreachable() {
    let client = NacosClient::builder()
        .with_base_url("http://127.0.0.1:9/nacos")
        .with_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    assert!(matches!(
        client.fetch("app", "DEFAULT").await,
        Err(SyncError::FetchError { .. })
    ));
}

#[tokio::test]
async fn test_subscribe_delivers_change() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{}"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{listen 80;}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .and(header_exists("Long-Pulling-Timeout"))
        .and(body_string_contains("Listening-Configs=app%02DEFAULT%02"))
        .respond_with(ResponseTemplate::new(200).set_body_string("app%02DEFAULT%02prod%01"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_quiet_listener(&server).await;

    let client = client(&server);
    assert_eq!(client.fetch("app", "DEFAULT").await.unwrap(), "server{}");

    let (listener, mut rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();
    assert_eq!(client.subscription_count(), 1);

    let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        change,
        ChangeEvent::Changed(ChangeNotification {
            namespace: "prod".to_string(),
            group: "DEFAULT".to_string(),
            remote_id: "app".to_string(),
            content: "server{listen 80;}".to_string(),
        })
    );
}

#[tokio::test]
async fn test_subscribe_skips_unchanged_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(200).set_body_string("app%02DEFAULT%02prod%01"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_quiet_listener(&server).await;

    let client = client(&server);
    client.fetch("app", "DEFAULT").await.unwrap();

    let (listener, mut rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();

    let received = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
    assert!(received.is_err(), "no notification expected for identical content");
}

#[tokio::test]
async fn test_long_poll_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(200).set_body_string("app%02DEFAULT%02prod%01"))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    mount_quiet_listener(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{listen 443;}"))
        .mount(&server)
        .await;

    let client = client(&server);
    let (listener, mut rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match change {
        ChangeEvent::Changed(change) => assert_eq!(change.content, "server{listen 443;}"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_refetch_failure_is_reported_once() {
    let server = MockServer::start().await;
    mount_eager_listener(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(404).set_body_string("config data not exist"))
        .mount(&server)
        .await;

    let client = client(&server);
    let (listener, mut rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();

    let events = collect_events(&mut rx, Duration::from_millis(1200)).await;
    drop(client);

    assert_eq!(events.len(), 1, "expected a single report, got {events:?}");
    match &events[0] {
        ChangeEvent::FetchFailed(FetchFailure {
            namespace,
            group,
            remote_id,
            reason,
        }) => {
            assert_eq!(namespace, "prod");
            assert_eq!(group, "DEFAULT");
            assert_eq!(remote_id, "app");
            assert!(reason.contains("not found"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Retries back off from 50ms, so only a handful of fetches fit the window.
    let fetches = requests_to(&server, CONFIGS).await;
    assert!(fetches <= 8, "refetched {fetches} times");
}

#[tokio::test]
async fn test_refetch_recovers_after_failure() {
    let server = MockServer::start().await;
    mount_eager_listener(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIGS))
        .respond_with(ResponseTemplate::new(200).set_body_string("server{listen 8080;}"))
        .mount(&server)
        .await;

    let client = client(&server);
    let (listener, mut rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, ChangeEvent::FetchFailed(_)));

    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match second {
        ChangeEvent::Changed(change) => assert_eq!(change.content, "server{listen 8080;}"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_unheld_long_polls_are_paced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LISTENER))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = NacosClient::builder()
        .with_base_url(format!("{}/nacos", server.uri()))
        .with_namespace("prod")
        .with_long_poll_timeout(Duration::from_millis(500))
        .with_min_poll_interval(Duration::from_millis(200))
        .build()
        .unwrap();
    let (listener, _rx) = channel_listener();
    client.subscribe("app", "DEFAULT", listener).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(client);

    let polls = requests_to(&server, LISTENER).await;
    assert!(polls >= 1, "no long poll was sent");
    assert!(polls <= 7, "sent {polls} long polls in one second");
}
