//! One outcome record per request, flushed on shutdown

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::config::{ConfigBuilder, SECRET};
use harness::server::TestServer;
use harness::upstream::MockUpstream;
use heliox_config::RouteCacheConfig;
use heliox_core::{CacheStatus, DefaultLimits, EffectiveLimits, ErrorType, ManualClock, Plan};
use heliox_usage::UsageSummary;
use jiff::Timestamp;

#[tokio::test]
async fn every_request_leaves_one_record() {
    let upstream = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_route("api", "/api", &upstream.base_url())
        .build();
    let server = TestServer::start(config).await.unwrap();
    let catalog = Arc::clone(server.catalog());
    let key_id = server.key_id(SECRET).await;

    let ok = server.get("/api/users").send().await.unwrap();
    let request_id = ok.headers().get("x-request-id").unwrap().to_str().unwrap().to_string();
    server.get("/missing").send().await.unwrap();
    server.client().get(server.url("/api/users")).send().await.unwrap();
    server.stop().await;

    let logs = catalog.request_logs();
    assert_eq!(logs.len(), 3);

    let served = logs.iter().find(|r| r.request_id == request_id).expect("record for request id");
    assert_eq!(served.status, 200);
    assert_eq!(served.key_id, Some(key_id));
    assert!(served.route_id.is_some());
    assert_eq!(served.cache_status, CacheStatus::Bypass);
    assert_eq!(served.error_type, ErrorType::None);
    assert_eq!(served.method, "GET");
    assert_eq!(served.path, "/api/users");
    assert_eq!(served.client_ip.as_deref(), Some("127.0.0.1"));

    let unrouted = logs.iter().find(|r| r.path == "/missing").unwrap();
    assert_eq!(unrouted.status, 404);
    assert_eq!(unrouted.error_type, ErrorType::RouteNotFound);
    assert_eq!(unrouted.key_id, Some(key_id));
    assert!(unrouted.route_id.is_none());

    let anonymous = logs.iter().find(|r| r.status == 401).unwrap();
    assert_eq!(anonymous.error_type, ErrorType::Unauthorized);
    assert!(anonymous.tenant_id.is_none());
    assert!(anonymous.key_id.is_none());

    assert_eq!(catalog.request_logs_for_key(key_id).len(), 2);
}

#[tokio::test]
async fn key_last_use_is_recorded() {
    let upstream = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_route("api", "/api", &upstream.base_url())
        .build();
    let server = TestServer::start(config).await.unwrap();
    let catalog = Arc::clone(server.catalog());
    let key_id = server.key_id(SECRET).await;
    assert!(catalog.key(key_id).unwrap().last_used_at.is_none());

    server.get("/api/users").send().await.unwrap();
    server.stop().await;

    assert!(catalog.key(key_id).unwrap().last_used_at.is_some());
}

#[tokio::test]
async fn usage_summary_reflects_recorded_traffic() {
    let upstream = MockUpstream::start().await.unwrap();
    let mut route = ConfigBuilder::route("api", "/api", &upstream.base_url());
    route.cache = Some(RouteCacheConfig {
        ttl: Some(Duration::from_secs(60)),
        ..RouteCacheConfig::default()
    });
    let config = ConfigBuilder::new().with_route_config(route).build();
    let now: Timestamp = "2026-03-10T12:00:00Z".parse().unwrap();
    let server = TestServer::start_with_clock(config, Arc::new(ManualClock::new(now)))
        .await
        .unwrap();
    let catalog = Arc::clone(server.catalog());
    let key_id = server.key_id(SECRET).await;

    server.get("/api/items").send().await.unwrap();
    server.get("/api/items").send().await.unwrap();
    server.get("/missing").send().await.unwrap();
    server.stop().await;

    let key = catalog.key(key_id).unwrap();
    let limits = EffectiveLimits::resolve(&key, Some(&Plan::free()), &DefaultLimits::default());
    let summary = UsageSummary::from_logs(&catalog.request_logs_for_key(key_id), &limits, now);

    assert_eq!(summary.daily_requests, 3);
    assert_eq!(summary.monthly_requests, 3);
    assert_eq!(summary.daily_limit, 1_000);
    assert!((summary.daily_percent - 0.3).abs() < 1e-9);
    assert!((summary.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    assert!((summary.error_rate - 1.0 / 3.0).abs() < 1e-9);
}
