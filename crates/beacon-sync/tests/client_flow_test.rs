//! End-to-end flow through `SyncClient` against a mock dashboard server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_core::{ConnectionState, ExecutionContext, Navigator, StoreEvent};
use beacon_sync::{Confirmation, RetryPolicy, SyncClient, SyncConfig};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingNavigator {
    reloads: AtomicUsize,
    routes: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

fn config_for(server: &MockServer) -> SyncConfig {
    SyncConfig::default()
        .with_base_url(server.uri())
        .with_transport_reconnect_delays(vec![])
        .with_retry_policy(RetryPolicy::fixed(Duration::from_secs(3600)))
}

async fn mount_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "type": "system", "title": "Welcome", "createdAt": "2026-10-18T09:00:00Z", "isRead": true},
            {"id": 2, "type": "rfq", "title": "Quote", "createdAt": "2026-10-18T08:00:00Z", "link": "/admin/rfq/2"}
        ])))
        .mount(server)
        .await;
}

async fn mount_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hash": "build-1"})))
        .mount(server)
        .await;
}

async fn wait_for(events: &mut broadcast::Receiver<StoreEvent>, expected: StoreEvent) {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event == expected => return,
                Ok(_) => continue,
                Err(e) => panic!("store event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for store event");
}

#[tokio::test]
async fn test_load_push_and_mark_read() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    mount_version(&server).await;
    Mock::given(method("GET"))
        .and(path("/hubs/notifications"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(
                    "event: ReceiveNotification\n\
                     data: {\"Id\":3,\"Type\":\"Alert\",\"Title\":\"Disk\",\"CreatedAt\":\"2026-10-19T10:00:00\"}\n\n",
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/2/read"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let navigator = Arc::new(RecordingNavigator::default());
    let mut client = SyncClient::new(config_for(&server), navigator.clone()).unwrap();
    let mut events = client.store().subscribe();
    client.start().await;

    wait_for(&mut events, StoreEvent::Received { id: 3 }).await;

    let store = client.store();
    let ids: Vec<i64> = store.notifications().await.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert_eq!(store.unread_count().await, 2);

    let route = store.open(2, navigator.as_ref()).await;
    assert_eq!(route.as_deref(), Some("/admin/rfq/2"));
    assert_eq!(store.unread_count().await, 1);
    assert_eq!(*navigator.routes.lock().unwrap(), vec!["/admin/rfq/2"]);

    client.shutdown().await;
    assert_eq!(client.connection().state(), ConnectionState::Disconnected);
    assert_eq!(navigator.reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_mark_all_read_keeps_optimistic_state() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    mount_version(&server).await;
    Mock::given(method("GET"))
        .and(path("/hubs/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/read-all"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let navigator = Arc::new(RecordingNavigator::default());
    let mut client = SyncClient::new(config_for(&server), navigator).unwrap();
    client.start().await;

    // The push channel failed to open; the store still loaded.
    assert_eq!(client.connection().state(), ConnectionState::Disconnected);
    let store = client.store();
    assert_eq!(store.len().await, 2);

    assert_eq!(store.mark_all_as_read().await, Confirmation::Unconfirmed);
    assert!(store.notifications().await.iter().all(|n| n.is_read));
    assert_eq!(store.unread_count().await, 0);

    client.shutdown().await;
}

#[tokio::test]
async fn test_failed_initial_load_leaves_store_empty() {
    let server = MockServer::start().await;
    mount_version(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hubs/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut client =
        SyncClient::new(config_for(&server), Arc::new(RecordingNavigator::default())).unwrap();
    client.start().await;

    assert!(client.store().is_empty().await);
    assert_eq!(client.store().unread_count().await, 0);
    client.shutdown().await;
}

#[tokio::test]
async fn test_prerender_makes_no_requests() {
    let server = MockServer::start().await;

    let config = config_for(&server).with_context(ExecutionContext::Prerender);
    let mut client = SyncClient::new(config, Arc::new(RecordingNavigator::default())).unwrap();
    client.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(client.store().is_empty().await);
    client.shutdown().await;
}

#[tokio::test]
async fn test_new_deployment_triggers_one_reload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hash": "build-1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hash": "build-2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let navigator = Arc::new(RecordingNavigator::default());
    let config = config_for(&server).with_version_poll_interval(1);
    let mut client = SyncClient::new(config, navigator.clone()).unwrap();
    client.start().await;

    timeout(Duration::from_secs(10), async {
        while navigator.reloads.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("reload was not triggered");

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(navigator.reloads.load(Ordering::SeqCst), 1);

    let version_polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/version.json")
        .count();
    assert_eq!(version_polls, 2);
    client.shutdown().await;
}

#[tokio::test]
async fn test_stalled_hub_does_not_hold_back_watcher_or_shutdown() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hash": "b1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hash": "b2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hubs/notifications"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_delay(Duration::from_secs(3600)),
        )
        .mount(&server)
        .await;

    let navigator = Arc::new(RecordingNavigator::default());
    let config = config_for(&server).with_version_poll_interval(1);
    let mut client = SyncClient::new(config, navigator.clone()).unwrap();

    // The hub never answers, so start stays inside the first open.
    let started = timeout(Duration::from_secs(4), client.start()).await;
    assert!(started.is_err());

    assert_eq!(navigator.reloads.load(Ordering::SeqCst), 1);
    assert_eq!(client.store().len().await, 2);
    assert_eq!(client.connection().state(), ConnectionState::Connecting);

    timeout(Duration::from_secs(3), client.shutdown())
        .await
        .expect("shutdown must not wait for the stalled hub");
    assert_eq!(client.connection().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_stop_during_stalled_open_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hubs/notifications"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let transport = beacon_sync::SseTransport::new(reqwest::Client::new(), config.hub_url());
    let manager = beacon_sync::ConnectionManager::new(Arc::new(transport));

    let starting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start_connection().await })
    };
    let mut state = manager.watch_state();
    timeout(
        Duration::from_secs(3),
        state.wait_for(|s| *s == ConnectionState::Connecting),
    )
    .await
    .expect("start never began")
    .unwrap();

    timeout(Duration::from_secs(3), manager.stop_connection())
        .await
        .expect("stop must not wait for the stalled open");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!timeout(Duration::from_secs(3), starting).await.unwrap().unwrap());
}
