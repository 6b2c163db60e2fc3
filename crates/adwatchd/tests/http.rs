//! HTTP contract tests against the router with a controllable clock

use adwatch_api::{Ad, AdCategory, AdStatus, SessionMode};
use adwatch_config::{Policy, ServiceConfig, WatchPolicy};
use adwatch_store::{SqliteStore, Store};
use adwatch_util::AdId;
use adwatchd::{AppState, router};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Local, TimeZone};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tower::ServiceExt;

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 12, 26, 10, 0, 0).unwrap()
}

fn ad(id: i64, status: AdStatus) -> Ad {
    Ad {
        id: AdId::new(id),
        title: format!("Ad {}", id),
        category: AdCategory::Video,
        reward: "0.5000".parse().unwrap(),
        duration_secs: 30,
        max_show: 1,
        status,
        note: None,
    }
}

struct Harness {
    app: Router,
    offset: Arc<AtomicI64>,
}

impl Harness {
    fn new(mode: SessionMode) -> Self {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let policy = Policy {
            service: ServiceConfig {
                session_mode: mode,
                ..ServiceConfig::default()
            },
            watch: WatchPolicy::default(),
            ads: vec![
                ad(1, AdStatus::Active),
                ad(2, AdStatus::Active),
                ad(3, AdStatus::Inactive),
            ],
        };
        store.sync_catalog(&policy.ads).unwrap();

        let offset = Arc::new(AtomicI64::new(0));
        let clock_offset = offset.clone();
        let state = AppState::from_policy(&policy, store).with_clock(Arc::new(move || {
            t0() + chrono::Duration::seconds(clock_offset.load(Ordering::SeqCst))
        }));

        Self {
            app: router(Arc::new(state)),
            offset,
        }
    }

    fn at(&self, secs: i64) {
        self.offset.store(secs, Ordering::SeqCst);
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, retry_after, body)
    }

    async fn get(&self, path: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    async fn post(
        &self,
        path: &str,
        user: &str,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("x-user-id", user);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap()
}

#[tokio::test]
async fn missing_identity_is_unauthenticated() {
    let h = Harness::new(SessionMode::Durable);

    let (status, body) = h.get("/earnings", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "unauthenticated");

    let request = Request::builder()
        .method("POST")
        .uri("/watch/1/start_view")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = h.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn watch_scenario_over_http() {
    let h = Harness::new(SessionMode::Durable);

    let (status, _, body) = h.post("/watch/1/start_view", "u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration"], 30);
    assert!(body["session_id"].is_string());

    h.at(10);
    let (status, _, body) = h.post("/watch/1/complete_view", "u1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "duration_not_met");
    assert_eq!(body["error"]["message"], "You must view the full duration");

    h.at(31);
    let (status, _, body) = h.post("/watch/1/complete_view", "u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["earned"], "0.5000");
    assert_eq!(body["message"], "You earned 0.5000 USD");

    h.at(61);
    let (status, retry_after, body) = h.post("/watch/1/start_view", "u1", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "cooldown_active");
    assert_eq!(
        body["error"]["message"],
        "You can view this ad again after 23h 59m."
    );
    let expected = 24 * 3600 - 30;
    assert_eq!(body["error"]["retry_after_secs"], expected);
    assert_eq!(retry_after, Some(expected.to_string()));

    let (status, body) = h.get("/earnings", Some("u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_earned"], "0.5000");
    assert_eq!(body["today_earned"], "0.5000");
    assert_eq!(body["last_updated"], "2025-12-26");
}

#[tokio::test]
async fn complete_without_start_is_conflict() {
    let h = Harness::new(SessionMode::Durable);

    let (status, _, body) = h.post("/watch/2/complete_view", "u1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "no_active_session");
    assert_eq!(body["error"]["message"], "You must start viewing first");
}

#[tokio::test]
async fn unknown_and_inactive_ads_are_not_found() {
    let h = Harness::new(SessionMode::Durable);

    for path in ["/watch/404/start_view", "/watch/3/start_view"] {
        let (status, _, body) = h.post(path, "u1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body["error"]["message"], "Ad not found or inactive");
    }

    let (status, _, body) = h.post("/watch/abc/start_view", "u1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_request");
}

#[tokio::test]
async fn user_ads_hide_cooling_down_ads() {
    let h = Harness::new(SessionMode::Durable);

    let (_, body) = h.get("/ads/user_ads", Some("u1")).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    h.post("/watch/1/start_view", "u1", None).await;
    h.at(30);
    let (status, _, _) = h.post("/watch/1/complete_view", "u1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.get("/ads/user_ads", Some("u1")).await;
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2]);

    // Other users are unaffected
    let (_, body) = h.get("/ads/user_ads", Some("u2")).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn claimed_timing_routes() {
    let h = Harness::new(SessionMode::Durable);

    let (status, body) = h.get("/third-party-ads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _, _) = h.post("/view/1/start_view", "u1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = h
        .post("/view/1/complete_view", "u1", Some(json!({ "duration_watched": 30 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_request");

    let request = Request::builder()
        .method("POST")
        .uri("/view/1/complete_view")
        .header("x-user-id", "u1")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = h.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_request");

    h.at(5);
    let claim = json!({
        "started_at": t0().to_rfc3339(),
        "duration_watched": 10,
    });
    let (status, _, body) = h.post("/view/1/complete_view", "u1", Some(claim)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "duration_not_met");

    let claim = json!({
        "started_at": t0().to_rfc3339(),
        "duration_watched": 30,
    });
    let (status, _, body) = h.post("/view/1/complete_view", "u1", Some(claim)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["earned"], "0.5000");
}

#[tokio::test]
async fn ephemeral_mode_keys_on_client_token() {
    let h = Harness::new(SessionMode::Ephemeral);

    let request = Request::builder()
        .method("POST")
        .uri("/watch/1/start_view")
        .header("x-user-id", "u1")
        .header("x-client-token", "tab-1")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = h.send(request).await;
    assert_eq!(status, StatusCode::OK);

    h.at(31);
    let complete = |token: &str| {
        Request::builder()
            .method("POST")
            .uri("/watch/1/complete_view")
            .header("x-user-id", "u1")
            .header("x-client-token", token)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, _) = h.send(complete("tab-2")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = h.send(complete("tab-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["earned"], "0.5000");
}

#[tokio::test]
async fn health_reports_mode() {
    let h = Harness::new(SessionMode::Ephemeral);

    let (status, body) = h.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store_healthy"], true);
    assert_eq!(body["session_mode"], "ephemeral");
}

#[tokio::test]
async fn new_user_has_zero_earnings() {
    let h = Harness::new(SessionMode::Durable);

    let (status, body) = h.get("/earnings", Some("nobody")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_earned"], "0.0000");
    assert!(body["last_updated"].is_null());
}
