//! HTTP API tests against the in-memory provider.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{DateTime, Duration as ChronoDuration, TimeDelta, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use ttlfleet_controlplane::labels::{self, TtlLabel};
use ttlfleet_controlplane::testing::{FakeCloud, test_config};
use ttlfleet_controlplane::{Authorizer, Role};
use ttlfleetd::api::{AppState, router};

const SECRET: &[u8] = b"api-test-secret";

struct TestApi {
    cloud: Arc<FakeCloud>,
    app: axum::Router,
}

impl TestApi {
    fn new() -> Self {
        let cloud = FakeCloud::new();
        let control = Arc::new(cloud.control_plane(test_config()).unwrap());
        let app = router(Arc::new(AppState {
            control,
            authorizer: Authorizer::new(SECRET).unwrap(),
        }));
        Self { cloud, app }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        role: Option<Role>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            request = request.header("authorization", format!("Bearer {}", token(&[role])));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

fn token(roles: &[Role]) -> String {
    Authorizer::new(SECRET)
        .unwrap()
        .issue("tester", roles, TimeDelta::hours(1))
        .unwrap()
}

fn in_minutes(minutes: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::minutes(minutes)
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let api = TestApi::new();
    let (status, body) = api.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let api = TestApi::new();
    let (status, body) = api.call(Method::GET, "/api/v1/server", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .uri("/api/v1/server")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = api.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(api.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_list_servers() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));
    api.cloud.add_snapshot("beta", Some("cx21"), Utc::now());

    let (status, body) = api
        .call(Method::GET, "/api/v1/server", Some(Role::User), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let views = body.as_array().unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["name"], "alpha");
    assert_eq!(views[0]["state"], "running");
    assert_eq!(views[1]["name"], "beta");
    assert_eq!(views[1]["state"], "terminated");
    assert_eq!(views[1]["serverType"], "cx21");
}

#[tokio::test]
async fn test_create_server() {
    let api = TestApi::new();
    api.cloud.add_blueprint();

    let (status, body) = api
        .call(
            Method::POST,
            "/api/v1/server",
            Some(Role::Admin),
            Some(json!({"serverName": "alpha", "serverType": "cx21", "ttl": "2h"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["name"], "alpha");
    assert_eq!(body["server_type"], "cx21");
    assert!(api.cloud.server("alpha").is_some());
}

#[tokio::test]
async fn test_create_server_requires_admin() {
    let api = TestApi::new();
    api.cloud.add_blueprint();

    let (status, _) = api
        .call(
            Method::POST,
            "/api/v1/server",
            Some(Role::PowerUser),
            Some(json!({"serverName": "alpha", "serverType": "cx21", "ttl": "2h"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(api.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_create_server_validation_errors() {
    let api = TestApi::new();
    api.cloud.add_blueprint();

    for (payload, expected) in [
        (json!({"serverType": "cx11", "ttl": "1h"}), "serverName"),
        (json!({"serverName": "alpha", "serverType": "cx11", "ttl": "13h"}), "13h"),
        (json!({"serverName": "Alpha!", "serverType": "cx11"}), "Alpha!"),
    ] {
        let (status, body) = api
            .call(Method::POST, "/api/v1/server", Some(Role::Admin), Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"].as_str().unwrap().contains(expected),
            "{body}"
        );
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/server")
        .header("authorization", format!("Bearer {}", token(&[Role::Admin])))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = api.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_server_from_snapshot() {
    let api = TestApi::new();
    api.cloud.add_snapshot("alpha", Some("cx31"), Utc::now());

    let (status, body) = api
        .call(
            Method::POST,
            "/api/v1/server/alpha/_start",
            Some(Role::PowerUser),
            Some(json!({"ttl": "1h"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["server_type"], "cx31");

    let (status, _) = api
        .call(Method::POST, "/api/v1/server/ghost/_start", Some(Role::Admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_extend_and_prune() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));

    let (status, body) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_extend",
            Some(Role::PowerUser),
            Some(json!({"ttl": "1h"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let until = DateTime::parse_from_rfc3339(body["ttl"].as_str().unwrap()).unwrap();
    let expected = in_minutes(90).timestamp();
    assert!((until.timestamp() - expected).abs() <= 2);

    let (status, body) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_extend",
            Some(Role::PowerUser),
            Some(json!({"ttl": "2h", "inverse": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let until = DateTime::parse_from_rfc3339(body["ttl"].as_str().unwrap()).unwrap();
    assert!(until < Utc::now());

    let (status, body) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_extend",
            Some(Role::PowerUser),
            Some(json!({"ttl": "13h"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_extend_without_ttl_label_is_bad_request() {
    let api = TestApi::new();
    let mut unlabeled = labels::instance_labels("alpha", in_minutes(30));
    unlabeled.remove(labels::TTL);
    api.cloud.add_server("alpha", unlabeled);

    let (status, _) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_extend",
            Some(Role::Admin),
            Some(json!({"ttl": "1h"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extend_requires_power_user() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));
    let before = labels::read_ttl(&api.cloud.server("alpha").unwrap().labels);

    let (status, _) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_extend",
            Some(Role::User),
            Some(json!({"ttl": "1h"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let after = labels::read_ttl(&api.cloud.server("alpha").unwrap().labels);
    assert!(matches!(after, TtlLabel::At(_)));
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_extend_forbidden_before_body_is_read() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));

    let request = |role: Role| {
        Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/server/alpha/_extend")
            .header("authorization", format!("Bearer {}", token(&[role])))
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap()
    };
    let response = api.app.clone().oneshot(request(Role::User)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = api
        .app
        .clone()
        .oneshot(request(Role::PowerUser))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stop_server() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));

    let (status, body) = api
        .call(Method::DELETE, "/api/v1/server/alpha", Some(Role::PowerUser), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["server"], "alpha");
    assert!(body["snapshotId"].is_u64());
    assert!(api.cloud.server("alpha").is_none());

    let (status, _) = api
        .call(Method::DELETE, "/api/v1/server/alpha", Some(Role::PowerUser), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_foreign_server_is_not_found() {
    let api = TestApi::new();
    api.cloud.add_server("foreign", Default::default());

    let (status, _) = api
        .call(Method::POST, "/api/v1/server/foreign/_reboot", Some(Role::Admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(api.cloud.call_count("reboot_server"), 0);
}

#[tokio::test]
async fn test_reboot_server() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));

    let (status, _) = api
        .call(Method::POST, "/api/v1/server/alpha/_reboot", Some(Role::PowerUser), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(api.cloud.call_count("reboot_server"), 1);
}

#[tokio::test]
async fn test_retype_server() {
    let api = TestApi::new();
    let snapshot = api.cloud.add_snapshot("alpha", Some("cx11"), Utc::now());

    let (status, _) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_type",
            Some(Role::PowerUser),
            Some(json!({"serverType": "cx31"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = api
        .call(
            Method::PUT,
            "/api/v1/server/alpha/_type",
            Some(Role::Admin),
            Some(json!({"serverType": "cx31"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let stored = api.cloud.image(snapshot.id).unwrap();
    assert_eq!(labels::server_type(&stored.labels), Some("cx31"));
}

#[tokio::test]
async fn test_provider_failure_is_server_error() {
    let api = TestApi::new();
    api.cloud.fail("list_servers", "service unavailable");

    let (status, body) = api
        .call(Method::GET, "/api/v1/server", Some(Role::User), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("service unavailable"));
}

#[tokio::test]
async fn test_chat_webhook() {
    let api = TestApi::new();
    api.cloud
        .add_server("alpha", labels::instance_labels("alpha", in_minutes(30)));

    let (status, body) = api
        .call(
            Method::POST,
            "/api/v1/chat",
            Some(Role::User),
            Some(json!({"text": "!server list"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("alpha"));

    let (status, body) = api
        .call(
            Method::POST,
            "/api/v1/chat",
            Some(Role::User),
            Some(json!({"text": "!server stop alpha"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().starts_with("Sorry, I can't do that"));
    assert!(api.cloud.server("alpha").is_some());

    let (status, body) = api
        .call(
            Method::POST,
            "/api/v1/chat",
            Some(Role::User),
            Some(json!({"text": "good morning"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].is_null());
}
