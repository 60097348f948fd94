//! End-to-end behaviour of the offline worker against an in-process network.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{config, url, Harness};
use harbor_cache::{CacheStorage, MemoryCacheStorage, RequestIdentity};
use harbor_core::NamespaceKind;
use harbor_net::Request;
use harbor_sw::{
    spawn_event_loop, Client, ClickOutcome, ResponseSource, ServiceWorkerEvent,
    ServiceWorkerState, WorkerError, WorkerEvent,
};
use http::{Method, StatusCode};
use serde_json::json;
use url::Url;

#[tokio::test]
async fn precached_static_asset_is_served_without_network() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    let calls = harness.fetcher.calls();

    let served = worker
        .handle_fetch(&Request::get(url("/static/app.css")))
        .await
        .unwrap();

    assert_eq!(served.source, ResponseSource::Cache(NamespaceKind::Static));
    assert_eq!(served.response.text().unwrap(), "body { color: navy }");
    assert_eq!(harness.fetcher.calls(), calls);
}

#[tokio::test]
async fn static_miss_goes_to_network_and_is_stored_in_static() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    let first = worker
        .handle_fetch(&Request::get(url("/static/logo.svg")))
        .await
        .unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    harness.fetcher.set_online(false);
    let second = worker
        .handle_fetch(&Request::get(url("/static/logo.svg")))
        .await
        .unwrap();
    assert_eq!(second.source, ResponseSource::Cache(NamespaceKind::Static));
    assert_eq!(second.response.text().unwrap(), "ok:/static/logo.svg");
}

#[tokio::test]
async fn network_first_stores_then_serves_offline_copy() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    harness.fetcher.route("/api/products", 200, r#"[{"id":1}]"#);

    let online = worker
        .handle_fetch(&Request::get(url("/api/products")))
        .await
        .unwrap();
    assert_eq!(online.source, ResponseSource::Network);
    assert_eq!(online.response.text().unwrap(), r#"[{"id":1}]"#);

    harness.fetcher.set_online(false);
    let offline = worker
        .handle_fetch(&Request::get(url("/api/products")))
        .await
        .unwrap();
    assert_eq!(offline.source, ResponseSource::Cache(NamespaceKind::Dynamic));
    assert_eq!(offline.response.text().unwrap(), r#"[{"id":1}]"#);
}

#[tokio::test]
async fn dynamic_cache_keeps_the_newest_fifty() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    for i in 0..51 {
        worker
            .handle_fetch(&Request::get(url(&format!("/api/items/{i}"))))
            .await
            .unwrap();
    }

    let dynamic = harness
        .storage
        .open(&worker.config().dynamic_namespace().name)
        .await
        .unwrap();
    assert_eq!(dynamic.len().await.unwrap(), 50);
    assert!(dynamic
        .get(&RequestIdentity::for_url(&url("/api/items/0")))
        .await
        .unwrap()
        .is_none());
    assert!(dynamic
        .get(&RequestIdentity::for_url(&url("/api/items/1")))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn http_errors_are_returned_but_not_cached() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    harness.fetcher.route("/api/orders", 500, "boom");

    let served = worker
        .handle_fetch(&Request::get(url("/api/orders")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, StatusCode::INTERNAL_SERVER_ERROR);

    harness.fetcher.set_online(false);
    let offline = worker
        .handle_fetch(&Request::get(url("/api/orders")))
        .await
        .unwrap();
    assert_eq!(offline.source, ResponseSource::Fallback);
}

#[tokio::test]
async fn offline_navigation_gets_precached_offline_page() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    harness.fetcher.set_online(false);

    let served = worker
        .handle_fetch(&Request::navigate(url("/checkout")))
        .await
        .unwrap();

    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.status, StatusCode::OK);
    assert_eq!(served.response.text().unwrap(), "<h1>Offline</h1>");
}

#[tokio::test]
async fn install_while_offline_still_completes_and_falls_back() {
    let harness = Harness::new();
    harness.fetcher.set_online(false);

    let worker = harness.worker(config("1"));
    let report = worker.init().await.unwrap();
    assert!(report.precache.cached.is_empty());
    assert_eq!(report.precache.failed.len(), 3);
    assert_eq!(worker.state().await, ServiceWorkerState::Activated);

    let page = worker
        .handle_fetch(&Request::navigate(url("/checkout")))
        .await
        .unwrap();
    assert_eq!(page.source, ResponseSource::Fallback);
    assert_eq!(page.response.status, StatusCode::OK);
    assert!(page.response.text().unwrap().contains("<html"));

    let api = worker
        .handle_fetch(&Request::get(url("/api/cart")))
        .await
        .unwrap();
    assert_eq!(api.response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = api.response.json().unwrap();
    assert_eq!(body["error"], "Offline");
}

#[tokio::test]
async fn failed_manifest_entry_is_skipped() {
    let harness = Harness::new();
    harness.fetcher.route("/static/app.css", 404, "missing");

    let worker = harness.worker(config("1"));
    let report = worker.init().await.unwrap();

    assert_eq!(report.precache.failed, vec![url("/static/app.css")]);
    assert_eq!(report.precache.cached.len(), 2);
}

#[tokio::test]
async fn version_bump_purges_previous_namespaces() {
    let mut harness = Harness::new();
    let v1 = harness.active_worker("1").await;
    v1.handle_fetch(&Request::get(url("/api/profile")))
        .await
        .unwrap();
    assert_eq!(
        harness.cache_names().await,
        vec!["shop-dynamic-v1".to_string(), "shop-static-v1".to_string()]
    );
    harness.drain_events();

    let v2 = harness.worker(config("2"));
    let report = v2.init().await.unwrap();
    let activation = report.activation.unwrap();

    assert_eq!(
        activation.deleted,
        vec!["shop-dynamic-v1".to_string(), "shop-static-v1".to_string()]
    );
    assert_eq!(
        harness.cache_names().await,
        vec!["shop-dynamic-v2".to_string(), "shop-static-v2".to_string()]
    );
    assert_eq!(v1.state().await, ServiceWorkerState::Redundant);
    assert_eq!(v2.state().await, ServiceWorkerState::Activated);

    // The old worker no longer intercepts.
    assert!(v1.handle_fetch(&Request::get(url("/api/profile"))).await.is_none());

    harness.fetcher.set_online(false);
    let served = v2
        .handle_fetch(&Request::get(url("/api/profile")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Fallback);

    let events = harness.drain_events();
    assert!(events.contains(&ServiceWorkerEvent::StateChange {
        worker_id: v1.id(),
        version: "1".to_string(),
        new_state: ServiceWorkerState::Redundant,
    }));
}

#[tokio::test]
async fn waiting_worker_activates_on_skip_waiting_message() {
    let harness = Harness::new();
    let v1 = harness.active_worker("1").await;

    let mut next = config("2");
    next.skip_waiting = false;
    let v2 = harness.worker(next);
    let report = v2.init().await.unwrap();

    assert!(report.activation.is_none());
    assert_eq!(v2.state().await, ServiceWorkerState::Installed);
    assert!(v2.handle_fetch(&Request::get(url("/api/a"))).await.is_none());
    assert!(v1.handle_fetch(&Request::get(url("/api/a"))).await.is_some());

    v2.handle_message(json!({"type": "SKIP_WAITING"})).await.unwrap();
    assert_eq!(v2.state().await, ServiceWorkerState::Activated);
    assert_eq!(v1.state().await, ServiceWorkerState::Redundant);
}

#[tokio::test]
async fn activation_claims_open_windows() {
    let mut harness = Harness::new();
    let page = Client::window(url("/home"));
    let page_id = page.id.clone();
    harness.host.clients.write().await.add(page);

    let worker = harness.active_worker("1").await;

    let controller = harness.host.clients.read().await.get(&page_id).unwrap().controller;
    assert_eq!(controller, Some(worker.id()));
    assert!(harness.drain_events().contains(&ServiceWorkerEvent::ControllerChange {
        client_id: page_id,
        worker_id: worker.id(),
    }));
}

#[tokio::test]
async fn non_get_and_cross_origin_requests_pass_through() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    let calls = harness.fetcher.calls();

    let post = Request::post(url("/api/cart"), Bytes::from_static(b"{}"));
    assert!(worker.handle_fetch(&post).await.is_none());

    let delete = Request::new(Method::DELETE, url("/api/cart/1"));
    assert!(worker.handle_fetch(&delete).await.is_none());

    let cdn = Request::get(Url::parse("https://cdn.example/static/lib.js").unwrap());
    assert!(worker.handle_fetch(&cdn).await.is_none());

    assert_eq!(harness.fetcher.calls(), calls);
}

#[tokio::test]
async fn failed_cache_write_does_not_change_response() {
    // Room for the precache, not for a large API response.
    let harness = Harness::with_storage(MemoryCacheStorage::new().with_quota_per_store(256));
    let worker = harness.active_worker("1").await;
    let big = "x".repeat(1024);
    harness.fetcher.route("/api/report", 200, big.clone());

    let served = worker
        .handle_fetch(&Request::get(url("/api/report")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, StatusCode::OK);
    assert_eq!(served.response.text().unwrap(), big);

    harness.fetcher.set_online(false);
    let offline = worker
        .handle_fetch(&Request::get(url("/api/report")))
        .await
        .unwrap();
    assert_eq!(offline.source, ResponseSource::Fallback);
}

#[tokio::test]
async fn push_without_usable_payload_gets_defaults() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    for data in [None, Some(&b""[..]), Some(&b"{not json"[..])] {
        let shown = worker.handle_push(data).await.unwrap();
        assert!(!shown.title.is_empty());
        assert!(!shown.body.is_empty());
    }

    let shown = worker.handle_push(Some(b"{not json".as_slice())).await.unwrap();
    assert_eq!(shown.body, "{not json");
}

#[tokio::test]
async fn pushes_with_same_tag_replace_each_other() {
    use harbor_sw::NotificationSurface;

    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    worker
        .handle_push(Some(br#"{"title":"Order shipped","tag":"order-42"}"#.as_slice()))
        .await
        .unwrap();
    worker
        .handle_push(Some(br#"{"title":"Order delivered","tag":"order-42"}"#.as_slice()))
        .await
        .unwrap();

    let visible = harness.tray.visible().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Order delivered");
}

#[tokio::test]
async fn click_focuses_existing_window_or_opens_one() {
    use harbor_sw::NotificationSurface;

    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    let orders = Client::window(url("/orders"));
    let orders_id = orders.id.clone();
    harness.host.clients.write().await.add(orders);

    let notification = worker
        .handle_push(Some(br#"{"title":"Order shipped","url":"/orders"}"#.as_slice()))
        .await
        .unwrap();
    let outcome = worker.handle_notification_click(&notification).await.unwrap();
    assert_eq!(outcome, ClickOutcome::Focused(orders_id.clone()));
    assert!(harness.tray.visible().await.is_empty());
    assert!(harness.host.clients.read().await.get(&orders_id).unwrap().focused);

    let notification = worker
        .handle_push(Some(br#"{"title":"Sale","url":"/sale"}"#.as_slice()))
        .await
        .unwrap();
    let ClickOutcome::Opened(id) = worker.handle_notification_click(&notification).await.unwrap()
    else {
        panic!("expected a new window");
    };
    let clients = harness.host.clients.read().await;
    assert_eq!(clients.get(&id).unwrap().url, url("/sale"));
    assert!(!clients.get(&orders_id).unwrap().focused);
}

#[tokio::test(start_paused = true)]
async fn reminder_fires_after_delay_with_reminder_tag() {
    use harbor_sw::NotificationSurface;

    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    worker
        .handle_message(json!({
            "type": "SCHEDULE_NOTIFICATION",
            "title": "Still shopping?",
            "body": "Your cart is waiting",
            "delay": 60_000
        }))
        .await
        .unwrap();
    assert_eq!(worker.reminders().pending().await, 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(harness.tray.visible().await.is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    let visible = harness.tray.visible().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].tag, "reminder");
    assert_eq!(visible[0].title, "Still shopping?");
    assert_eq!(worker.reminders().pending().await, 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_drops_pending_reminders() {
    use harbor_sw::NotificationSurface;

    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    worker
        .handle_message(json!({"type": "SCHEDULE_NOTIFICATION", "title": "Later", "delay": 5_000}))
        .await
        .unwrap();
    worker.teardown().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.tray.visible().await.is_empty());
    assert!(!worker.is_running());
    assert!(worker.handle_fetch(&Request::get(url("/"))).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn torn_down_worker_refuses_new_reminders_and_pushes() {
    use harbor_sw::NotificationSurface;

    let harness = Harness::new();
    let worker = harness.active_worker("1").await;
    worker.teardown().await;

    let scheduled = worker
        .handle_message(json!({"type": "SCHEDULE_NOTIFICATION", "title": "T", "body": "B", "delay": 10}))
        .await;
    assert!(matches!(scheduled, Err(WorkerError::StateError(_))));
    assert_eq!(worker.reminders().pending().await, 0);

    let pushed = worker.handle_push(Some(br#"{"title":"Sale"}"#.as_slice())).await;
    assert!(matches!(pushed, Err(WorkerError::StateError(_))));

    tokio::time::sleep(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert!(harness.tray.visible().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn network_timeout_falls_back_like_a_network_failure() {
    let harness = Harness::new();
    let mut config = config("1");
    config.network_timeout_ms = Some(100);
    let worker = harness.worker(config);
    worker.init().await.unwrap();

    harness.fetcher.set_hanging(true);

    let served = worker
        .handle_fetch(&Request::get(url("/api/orders")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);

    // Cached earlier, so a hung network still gets a cache hit.
    harness.fetcher.set_hanging(false);
    worker
        .handle_fetch(&Request::get(url("/api/profile")))
        .await
        .unwrap();
    harness.fetcher.set_hanging(true);

    let served = worker
        .handle_fetch(&Request::get(url("/api/profile")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache(NamespaceKind::Dynamic));
    assert_eq!(served.response.text().unwrap(), "ok:/api/profile");
}

#[tokio::test]
async fn cache_urls_message_fills_dynamic_cache() {
    let harness = Harness::new();
    let worker = harness.active_worker("1").await;

    worker
        .handle_message(json!({
            "type": "CACHE_URLS",
            "urls": ["/api/catalog", "https://cdn.example/lib.js"]
        }))
        .await
        .unwrap();

    harness.fetcher.set_online(false);
    let served = worker
        .handle_fetch(&Request::get(url("/api/catalog")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache(NamespaceKind::Dynamic));

    assert!(worker.handle_message(json!({"type": "UNKNOWN"})).await.is_err());
}

#[tokio::test]
async fn event_loop_runs_lifecycle_before_fetches() {
    let harness = Harness::new();
    let worker = harness.worker(config("1"));
    let handle = spawn_event_loop(worker.clone());

    handle.send(WorkerEvent::Install).unwrap();
    handle.send(WorkerEvent::Activate).unwrap();
    let served = handle
        .fetch(Request::get(url("/static/app.css")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache(NamespaceKind::Static));

    handle.terminate().await;
    assert!(!worker.is_running());
}
