//! Integration tests for the API client against a mock server: token
//! attachment, 401 recovery, cooldown, cancellation, readiness gating and
//! health throttling.

mod common;

use std::time::Duration;

use serde_json::json;
use student_portal_auth::{
    AccessToken, ApiClient, CancelReason, Error, FeatureFlags, LifecycleStatus, RequestOptions,
    Visibility,
};
use tokio::task::JoinSet;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{config, expired_body, ready_client, token_body, unauthorized_body};

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

// =============================================================================
// Token attachment
// =============================================================================

#[tokio::test]
async fn test_bearer_attached_when_token_held() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let res = client.get("/courses", RequestOptions::new()).await.unwrap();
    let courses: Vec<serde_json::Value> = res.data().unwrap();
    assert!(courses.is_empty());
}

#[tokio::test]
async fn test_clear_token_is_idempotent() {
    let server = MockServer::start().await;
    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));
    client.clear_access_token();
    client.clear_access_token();
    assert!(client.token().is_none());
}

#[tokio::test]
async fn test_non_success_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": ["course", "not found"] })),
        )
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let err = client
        .get("/courses/missing", RequestOptions::new())
        .await
        .unwrap_err();

    match err {
        Error::HttpStatus { status, message } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "course, not found");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

// =============================================================================
// Refresh on 401
// =============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_replayed() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 1).await;
    Mock::given(method("GET"))
        .and(path("/courses/c1"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": "c1" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses/c1"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let res = client.get("/courses/c1", RequestOptions::new()).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(client.token(), Some(AccessToken::new("T2")));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(token_body("T2"))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(5)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let client = client.clone();
        tasks.spawn(async move { client.get("/progress", RequestOptions::new()).await });
    }
    while let Some(result) = tasks.join_next().await {
        let res = result.unwrap().unwrap();
        assert_eq!(res.status().as_u16(), 200);
    }
    assert_eq!(client.token(), Some(AccessToken::new("T2")));
}

#[tokio::test]
async fn test_concurrent_401s_fail_together() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401)
            .set_body_json(unauthorized_body())
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/enrollments"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(3)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let mut tasks = JoinSet::new();
    for _ in 0..3 {
        let client = client.clone();
        tasks.spawn(async move { client.get("/enrollments", RequestOptions::new()).await });
    }
    while let Some(result) = tasks.join_next().await {
        let err = result.unwrap().unwrap_err();
        assert!(err.ends_session(), "expected refresh failure, got {err:?}");
    }
    assert!(client.token().is_none());
}

#[tokio::test]
async fn test_cooldown_blocks_second_refresh() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(401).set_body_json(unauthorized_body()), 1).await;
    Mock::given(method("GET"))
        .and(path("/students/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let first = client
        .get("/students/me", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(first, Error::RefreshExhausted(_)));

    // Token is gone and a cooldown is active: plain 401, no refresh.
    let second = client
        .get("/students/me", RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(second.status().map(|s| s.as_u16()), Some(401));
}

#[tokio::test]
async fn test_new_login_clears_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(unauthorized_body()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("T3")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("authorization", "Bearer T3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));
    assert!(client.get("/courses", RequestOptions::new()).await.is_err());

    client.set_access_token(AccessToken::new("T2"));
    let res = client.get("/courses", RequestOptions::new()).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn test_auth_endpoint_401_never_refreshes() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let err = client.sign_in("lina@example.com", "wrong").await.unwrap_err();
    match err {
        Error::HttpStatus { status, message } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_guest_401_without_expiry_does_not_refresh() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 0).await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(401).set_body_json(unauthorized_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let err = client.get("/courses", RequestOptions::new()).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
}

#[tokio::test]
async fn test_guest_401_with_expiry_code_refreshes() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 1).await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Unauthorized", "code": "TOKEN_EXPIRED" })),
        )
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let res = client.get("/courses", RequestOptions::new()).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn test_replay_is_attempted_once() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 1).await;
    Mock::given(method("GET"))
        .and(path("/courses/c1/lessons"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));

    let err = client
        .get("/courses/c1/lessons", RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
}

#[tokio::test]
async fn test_refresh_without_token_in_body_fails() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(json!({ "data": {} })), 1)
        .await;

    let client = ready_client(&server);
    assert!(!client.bootstrap_session().await);
    assert!(client.token().is_none());
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_bootstrap_skips_network_when_token_held() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T2")), 0).await;

    let client = ready_client(&server);
    client.set_access_token(AccessToken::new("T1"));
    assert!(client.bootstrap_session().await);
}

#[tokio::test]
async fn test_bootstrap_obtains_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(token_body("T1")), 1).await;

    let client = ApiClient::new(config(&server)).unwrap();
    assert!(client.bootstrap_session().await);
    assert_eq!(client.token(), Some(AccessToken::new("T1")));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_same_key_supersedes_previous_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [] }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get("/catalog/search", RequestOptions::new().with_abort_key("search"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client
        .get("/catalog/search", RequestOptions::new().with_abort_key("search"))
        .await;

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::Superseded)));
    assert!(!err.ends_session());
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_abort_by_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get("/catalog", RequestOptions::new().with_abort_key("catalog"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.abort("catalog"));

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::Aborted)));
    assert!(!client.abort("catalog"));
}

#[tokio::test]
async fn test_dropped_request_stops_tracking_its_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = ready_client(&server);
    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        client.get("/catalog", RequestOptions::new().with_abort_key("catalog")),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!client.abort("catalog"));
}

// =============================================================================
// Readiness gate
// =============================================================================

#[tokio::test]
async fn test_protected_request_waits_for_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/enrollments"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    assert_eq!(client.auth_lifecycle_status(), LifecycleStatus::Initializing);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/enrollments", RequestOptions::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());

    // Token lands before the gate opens, so the held request carries it.
    client.set_access_token(AccessToken::new("T1"));
    client.set_auth_lifecycle_status(LifecycleStatus::Authenticated);

    let res = pending.await.unwrap().unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn test_gate_times_out_and_sends_anyway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        ApiClient::new(config(&server).with_ready_timeout(Duration::from_millis(150))).unwrap();

    let started = tokio::time::Instant::now();
    let res = client.get("/progress", RequestOptions::new()).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_public_request_is_never_gated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ApiClient::new(config(&server)).unwrap();
    let res = tokio::time::timeout(
        Duration::from_secs(2),
        client.get("/catalog", RequestOptions::new()),
    )
    .await
    .expect("public request must not wait for bootstrap")
    .unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn test_gate_disabled_by_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let flags = FeatureFlags {
        auth_readiness_guard: false,
        ..FeatureFlags::default()
    };
    let client = ApiClient::new(config(&server).with_flags(flags)).unwrap();
    let res = tokio::time::timeout(
        Duration::from_secs(2),
        client.get("/progress", RequestOptions::new()),
    )
    .await
    .expect("gate is disabled")
    .unwrap();
    assert_eq!(res.status().as_u16(), 200);
}

// =============================================================================
// Health polling
// =============================================================================

#[tokio::test]
async fn test_health_poll_is_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    assert!(client.get("/health", RequestOptions::new()).await.is_ok());

    let err = client.get("/health", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Canceled(CancelReason::Suppressed("polled too recently"))
    ));
}

#[tokio::test]
async fn test_health_poll_suppressed_when_hidden() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client.set_visibility(Visibility::Hidden);

    let err = client.get("/health", RequestOptions::new()).await.unwrap_err();
    assert!(err.is_canceled());
}

// =============================================================================
// Cache busting
// =============================================================================

#[tokio::test]
async fn test_no_store_adds_cache_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header_exists("cache-control"))
        .and(header("pragma", "no-cache"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ready_client(&server);
    client
        .get("/auth/me", RequestOptions::new().no_store())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let cache_control = requests[0].headers.get("cache-control").unwrap();
    assert_eq!(cache_control.to_str().unwrap(), "no-store, no-cache, max-age=0");
    assert!(requests[0].url.query_pairs().any(|(k, _)| k == "_ts"));
}
