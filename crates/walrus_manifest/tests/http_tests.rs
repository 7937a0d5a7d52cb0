//! HTTP client tests against a local mock server.

use futures::StreamExt;
use serde_json::json;
use walrus_manifest::{ApiClient, ClientConfig, HttpApiClient, ManifestError, ObjectScope, GROUP_RESOURCES};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESOURCES: &str = "/v1/projects/p1/environments/dev/resources";

fn client(server: &MockServer) -> HttpApiClient {
    HttpApiClient::new(ClientConfig::new(server.uri()).with_token("t0ken")).unwrap()
}

fn scope() -> ObjectScope {
    ObjectScope::new("p1", "dev")
}

#[tokio::test]
async fn test_create_objects_sends_batch_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/_/batch", RESOURCES)))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .create_objects(GROUP_RESOURCES, &scope(), &json!({"items": [{"name": "web"}]}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_conflict_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/web", RESOURCES)))
        .respond_with(ResponseTemplate::new(409).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client(&server)
        .patch_object(GROUP_RESOURCES, &scope(), "web", &json!({"name": "web"}))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("busy"));
}

#[tokio::test]
async fn test_server_error_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(RESOURCES))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_objects(GROUP_RESOURCES, &scope(), &["web".to_string()])
        .await
        .unwrap_err();
    match err {
        ManifestError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_get_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/web", RESOURCES)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1", "name": "web"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/db", RESOURCES)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    let web = client.get_object(GROUP_RESOURCES, &scope(), "web").await.unwrap();
    assert_eq!(web.unwrap()["id"], "1");
    assert!(client.get_object(GROUP_RESOURCES, &scope(), "db").await.unwrap().is_none());
}

#[tokio::test]
async fn test_watch_decodes_events() {
    let server = MockServer::start().await;
    let body = "data: {\"type\":\"update\",\"items\":[{\"name\":\"web\",\"status\":{\"summaryStatus\":\"Ready\"}}]}\n\n";
    Mock::given(method("GET"))
        .and(path(RESOURCES))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let events: Vec<_> = client(&server)
        .watch(GROUP_RESOURCES, &scope())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    let event = events[0].as_ref().unwrap();
    assert_eq!(event.event_type, "update");
    assert_eq!(event.items[0].status.summary_status, "Ready");
}
