//! Credential extraction and resolution through the full pipeline

mod harness;

use harness::config::{ConfigBuilder, SECRET};
use harness::server::TestServer;
use harness::upstream::MockUpstream;
use heliox_core::KeyStatus;
use secrecy::ExposeSecret;

async fn start(builder: ConfigBuilder) -> (TestServer, MockUpstream) {
    let upstream = MockUpstream::start().await.unwrap();
    let config = builder.with_route("api", "/api", &upstream.base_url()).build();
    (TestServer::start(config).await.unwrap(), upstream)
}

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let (server, upstream) = start(ConfigBuilder::new()).await;

    let response = server.client().get(server.url("/api/users")).send().await.unwrap();

    assert_eq!(response.status(), 401);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "unauthorized");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn unknown_key_is_unauthorized() {
    let (server, _upstream) = start(ConfigBuilder::new()).await;

    let response = server
        .client()
        .get(server.url("/api/users"))
        .header("x-api-key", "hlx_not_a_real_key")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn valid_key_is_forwarded_without_the_credential() {
    let (server, upstream) = start(ConfigBuilder::new()).await;

    let response = server.get("/api/users").send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("x-cache-status").unwrap(), "bypass");
    assert_eq!(upstream.calls(), 1);
    assert!(upstream.last_headers().get("x-api-key").is_none());
}

#[tokio::test]
async fn bearer_credential_is_accepted_and_stripped() {
    let (server, upstream) = start(ConfigBuilder::new()).await;

    let response = server
        .client()
        .get(server.url("/api/users"))
        .bearer_auth(SECRET)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(upstream.last_headers().get("authorization").is_none());
}

#[tokio::test]
async fn client_authorization_survives_when_key_is_in_header() {
    let (server, upstream) = start(ConfigBuilder::new()).await;

    let response = server
        .get("/api/users")
        .header("authorization", "Bearer upstream-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(upstream.last_headers().get("authorization").unwrap(), "Bearer upstream-token");
}

#[tokio::test]
async fn disabled_key_is_forbidden() {
    let mut key = ConfigBuilder::key("default", SECRET);
    key.active = false;
    let (server, upstream) = start(ConfigBuilder::new().with_default_key(key)).await;

    let response = server.get("/api/users").send().await.unwrap();

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "disabled");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn disabling_a_cached_key_applies_to_the_next_request() {
    let (server, upstream) = start(ConfigBuilder::new()).await;
    let key_id = server.key_id(SECRET).await;

    assert_eq!(server.get("/api/users").send().await.unwrap().status(), 200);

    server.keys().set_status(key_id, KeyStatus::Disabled).unwrap();
    let response = server.get("/api/users").send().await.unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(upstream.calls(), 1);

    server.keys().set_status(key_id, KeyStatus::Active).unwrap();
    assert_eq!(server.get("/api/users").send().await.unwrap().status(), 200);
}

#[tokio::test]
async fn rotated_secret_stops_working_immediately() {
    let (server, _upstream) = start(ConfigBuilder::new()).await;
    let key_id = server.key_id(SECRET).await;
    assert_eq!(server.get("/api/users").send().await.unwrap().status(), 200);

    let issued = server.keys().rotate(key_id).unwrap();

    assert_eq!(server.get("/api/users").send().await.unwrap().status(), 401);
    let response = server
        .client()
        .get(server.url("/api/users"))
        .header("x-api-key", issued.secret.expose_secret())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn inactive_tenant_is_forbidden() {
    let (server, _upstream) = start(ConfigBuilder::new().with_inactive_tenant()).await;

    let response = server.get("/api/users").send().await.unwrap();

    assert_eq!(response.status(), 403);
}
