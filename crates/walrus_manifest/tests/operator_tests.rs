//! Integration tests for the operator and waiter.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use walrus_core::FakeClock;
use walrus_manifest::{
    Event, EventItem, ManifestError, MockApiClient, Object, ObjectScope, ObjectSet, Operator,
    Waiter, GROUP_RESOURCES,
};

fn scope() -> ObjectScope {
    ObjectScope::new("p1", "dev")
}

fn object(name: &str) -> Object {
    Object::new(GROUP_RESOURCES, scope(), name).with_value("type", json!("webservice"))
}

fn set(names: &[&str]) -> ObjectSet {
    names.iter().map(|n| object(n)).collect()
}

fn operator(client: &MockApiClient, clock: &Arc<FakeClock>) -> Operator {
    Operator::new(Arc::new(client.clone()), clock.clone())
}

#[tokio::test]
async fn test_conflict_is_retried() {
    let client = MockApiClient::new().respond_with("create_objects", 409);
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).apply(set(&["web"])).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.success.len(), 1);
    assert_eq!(client.get_method_calls("create_objects").len(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    assert_eq!(result.messages(false), vec!["resource p1/dev/web created"]);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let client = MockApiClient::new().respond_with("create_objects", 500);
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).apply(set(&["web"])).await;

    assert!(matches!(result.error, Some(ManifestError::Api { status: 500, .. })));
    assert_eq!(result.failed.len(), 1);
    assert!(result.success.is_empty());
    assert_eq!(client.get_method_calls("create_objects").len(), 1);
    assert!(clock.sleeps().is_empty());
    assert_eq!(result.messages(false), vec!["resource p1/dev/web apply failed"]);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let client = MockApiClient::new()
        .respond_with("create_objects", 429)
        .respond_with("create_objects", 429)
        .respond_with("create_objects", 429);
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).apply(set(&["web"])).await;

    assert!(result.error.as_ref().is_some_and(ManifestError::is_retryable));
    assert_eq!(client.get_method_calls("create_objects").len(), 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn test_retry_only_resubmits_failed() {
    // web exists and is patched; db is created after a conflict.
    let client = MockApiClient::new()
        .with_object(GROUP_RESOURCES, scope(), "web", json!({"id": "1", "name": "web", "type": "old"}))
        .respond_with("create_objects", 409);
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).apply(set(&["web", "db"])).await;

    assert!(result.is_success());
    assert_eq!(client.get_method_calls("patch_object").len(), 1);
    assert_eq!(client.get_method_calls("create_objects").len(), 2);
    assert_eq!(
        result.messages(false),
        vec!["resource p1/dev/db created", "resource p1/dev/web patched"]
    );
}

#[tokio::test]
async fn test_timeout_keeps_settled_objects() {
    let client = MockApiClient::new()
        .with_object(GROUP_RESOURCES, scope(), "web", json!({"id": "1", "name": "web", "type": "old"}))
        .hang("create_objects");
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock)
        .with_timeout(Duration::from_millis(100))
        .apply(set(&["web", "db"]))
        .await;

    assert!(matches!(result.error, Some(ManifestError::Timeout(_))));
    assert_eq!(client.get_method_calls("patch_object").len(), 1);
    assert_eq!(
        result.messages(false),
        vec!["resource p1/dev/web patched", "resource p1/dev/db apply failed"]
    );
}

#[tokio::test]
async fn test_apply_unchanged() {
    let remote = json!({
        "id": "1",
        "name": "web",
        "type": "webservice",
        "project": {"id": "p", "name": "p1"},
        "status": {"summaryStatus": "Ready"}
    });
    let client = MockApiClient::new().with_object(GROUP_RESOURCES, scope(), "web", remote);
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).apply(set(&["web"])).await;

    assert_eq!(result.unchanged.len(), 1);
    assert!(result.success.is_empty());
    assert!(!client.was_called("patch_object"));
    assert_eq!(result.unchanged.all()[0].id, "1");
}

#[tokio::test]
async fn test_preview_marks_requests() {
    let client = MockApiClient::new().with_object(GROUP_RESOURCES, scope(), "web", json!({"name": "web"}));
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).preview(set(&["web", "db"])).await;

    assert!(result.is_success());
    let patch = &client.get_method_calls("patch_object")[0];
    assert_eq!(patch.body.as_ref().unwrap()["preview"], json!(true));
    let create = &client.get_method_calls("create_objects")[0];
    assert_eq!(create.body.as_ref().unwrap()["preview"], json!(true));
    assert_eq!(create.names, vec!["db".to_string()]);
}

#[tokio::test]
async fn test_delete_reports_not_found() {
    let client = MockApiClient::new().with_object(GROUP_RESOURCES, scope(), "web", json!({"name": "web"}));
    let clock = Arc::new(FakeClock::default());

    let result = operator(&client, &clock).delete(set(&["web", "db"])).await;

    assert!(result.is_success());
    assert_eq!(
        result.messages(true),
        vec!["resource p1/dev/web deleting", "resource p1/dev/db not found"]
    );
    assert!(client.object(GROUP_RESOURCES, &scope(), "web").is_none());
    assert_eq!(client.get_method_calls("delete_objects")[0].names, vec!["web".to_string()]);
}

#[tokio::test]
async fn test_wait_prints_each_status_once() {
    let events = vec![
        Event::new("update", vec![EventItem::new("web", "Deploying")]),
        Event::new("update", vec![EventItem::new("web", "Deploying")]),
        Event::new("update", vec![EventItem::new("other", "Ready")]),
        Event::new("update", vec![EventItem::new("web", "Ready")]),
    ];
    let client = MockApiClient::new().with_events(GROUP_RESOURCES, scope(), events);
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();

    let waiter = Waiter::for_status(Arc::new(client), Duration::from_secs(5))
        .with_printer(move |line| sink.lock().push(line.to_string()));
    assert!(waiter.wait(&set(&["web"]), &ObjectSet::new()).await.unwrap());

    assert_eq!(
        *lines.lock(),
        vec![
            "resource p1/dev/web is in status: Deploying",
            "resource p1/dev/web is in status: Ready",
        ]
    );
}

#[tokio::test]
async fn test_wait_skips_finished_objects() {
    let client = MockApiClient::new();
    let waiter = Waiter::for_status(Arc::new(client.clone()), Duration::from_secs(5));

    let all = set(&["web"]);
    assert!(waiter.wait(&all, &all).await.unwrap());
    assert!(!client.was_called("watch"));
}

#[tokio::test]
async fn test_wait_for_delete() {
    let events = vec![Event::new("delete", vec![EventItem::new("web", "")])];
    let client = MockApiClient::new().with_events(GROUP_RESOURCES, scope(), events);

    let waiter = Waiter::for_delete(Arc::new(client), Duration::from_secs(5)).with_printer(|_| {});
    assert!(waiter.wait(&set(&["web"]), &ObjectSet::new()).await.unwrap());
}

#[tokio::test]
async fn test_wait_times_out() {
    let events = vec![Event::new("update", vec![EventItem::new("web", "Deploying")])];
    let client = MockApiClient::new()
        .with_events(GROUP_RESOURCES, scope(), events)
        .hold_watches();

    let waiter = Waiter::for_status(Arc::new(client), Duration::from_millis(50)).with_printer(|_| {});
    let err = waiter.wait(&set(&["web"]), &ObjectSet::new()).await.unwrap_err();
    assert!(matches!(err, ManifestError::Timeout(_)));
}

#[tokio::test]
async fn test_wait_fails_when_watch_ends_early() {
    let client = MockApiClient::new();
    let waiter = Waiter::for_status(Arc::new(client), Duration::from_secs(5)).with_printer(|_| {});

    let err = waiter.wait(&set(&["web"]), &ObjectSet::new()).await.unwrap_err();
    assert!(matches!(err, ManifestError::Watch(_)));
}
