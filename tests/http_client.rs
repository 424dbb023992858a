//! Integration tests for the management API client against a mock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tenant_sync::error::ApiError;
use tenant_sync::planner::Patch;
use tenant_sync::remote::{HttpResourceApi, PAGE_SIZE, ResourceApi, StateFetcher};
use tenant_sync::resource::{Fields, Resource, ResourceKind};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> HttpResourceApi {
    HttpResourceApi::with_base_url(&server.uri(), TOKEN)
        .expect("client should build")
        .with_retry_delay(Duration::from_millis(10))
}

fn app(index: usize) -> Value {
    json!({
        "name": format!("app-{index:03}"),
        "client_id": format!("cid_{index:03}"),
        "app_type": "spa",
        "client_secret": "server-managed",
    })
}

#[tokio::test]
async fn test_list_reads_every_page() {
    let server = MockServer::start().await;

    let first: Vec<Value> = (0..PAGE_SIZE).map(app).collect();
    let second: Vec<Value> = (PAGE_SIZE..PAGE_SIZE + 2).map(app).collect();

    Mock::given(method("GET"))
        .and(path("/clients"))
        .and(query_param("page", "0"))
        .and(query_param("per_page", PAGE_SIZE.to_string()))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clients"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(second))
        .expect(1)
        .mount(&server)
        .await;

    let resources = client(&server)
        .list(ResourceKind::Application)
        .await
        .expect("listing should succeed");

    assert_eq!(resources.len(), PAGE_SIZE + 2);
    let last = resources.last().expect("at least one resource");
    assert_eq!(last.key, "app-051");
    assert_eq!(last.remote_id.as_deref(), Some("cid_051"));
    assert_eq!(last.field("app_type"), Some(&json!("spa")));
    assert!(last.field("client_secret").is_none());
    assert!(last.field("client_id").is_none());
}

#[tokio::test]
async fn test_list_rejects_object_without_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "rol_1" }])))
        .mount(&server)
        .await;

    let fetcher = StateFetcher::new(std::sync::Arc::new(client(&server)));
    let err = fetcher
        .fetch(ResourceKind::Role)
        .await
        .expect_err("malformed listing should fail");

    assert_eq!(err.kind, ResourceKind::Role);
    assert!(matches!(err.source, ApiError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_create_posts_payload_and_returns_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/clients"))
        .and(body_json(json!({ "name": "web", "app_type": "spa" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "name": "web", "client_id": "cid_new" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::desired(ResourceKind::Application, "web", Fields::new())
        .with_field("app_type", "spa");
    let remote_id = client(&server)
        .create(&resource)
        .await
        .expect("create should succeed");

    assert_eq!(remote_id, "cid_new");
}

#[tokio::test]
async fn test_update_sends_only_the_patch() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/roles/rol_1"))
        .and(body_json(json!({ "description": "Administrators" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "rol_1" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut patch = Patch::new();
    patch.insert("description", json!("Administrators"));

    client(&server)
        .update(ResourceKind::Role, "rol_1", &patch)
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn test_delete_of_missing_resource_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/roles/rol_9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .delete(ResourceKind::Role, "rol_9")
        .await
        .expect_err("missing resource");

    assert_eq!(
        err,
        ApiError::NotFound {
            remote_id: String::from("rol_9")
        }
    );
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/clients/cid_1"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/clients/cid_1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete(ResourceKind::Application, "cid_1")
        .await
        .expect("delete should succeed after the retry");
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/roles"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .list(ResourceKind::Role)
        .await
        .expect_err("persistent rate limiting");

    assert_eq!(err, ApiError::RateLimited { retry_after_secs: 0 });
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/clients"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid token" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .list(ResourceKind::Application)
        .await
        .expect_err("unauthorized");

    assert_eq!(
        err,
        ApiError::AuthenticationFailed {
            message: String::from("Invalid token")
        }
    );
}

#[tokio::test]
async fn test_server_error_surfaces_status_and_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/roles"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Role already exists" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::desired(ResourceKind::Role, "admin", Fields::new());
    let err = client(&server)
        .create(&resource)
        .await
        .expect_err("conflict status");

    assert_eq!(err, ApiError::request(409, "Role already exists"));
    assert!(!err.is_retryable());
}

/// Starts a server that reads each request and hangs up without answering.
async fn hang_up_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
        }
    });

    (format!("http://{addr}"), connections)
}

#[tokio::test]
async fn test_create_is_not_resent_after_connection_drop() {
    let (base_url, connections) = hang_up_server().await;
    let api = HttpResourceApi::with_base_url(&base_url, TOKEN)
        .expect("client should build")
        .with_retry_delay(Duration::from_millis(10));

    let resource = Resource::desired(ResourceKind::Application, "web", Fields::new());
    let err = api
        .create(&resource)
        .await
        .expect_err("server hung up");

    assert!(matches!(err, ApiError::Network { .. }));
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delete_is_retried_after_connection_drop() {
    let (base_url, connections) = hang_up_server().await;
    let api = HttpResourceApi::with_base_url(&base_url, TOKEN)
        .expect("client should build")
        .with_retry_delay(Duration::from_millis(10));

    let err = api
        .delete(ResourceKind::Role, "rol_1")
        .await
        .expect_err("server hung up");

    assert!(matches!(err, ApiError::Network { .. }));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_domain_builds_management_base_url() {
    let api = HttpResourceApi::new("example.eu.auth0.com", TOKEN).expect("client should build");
    assert_eq!(api.base_url(), "https://example.eu.auth0.com/api/v2/");
}
