//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each gateway endpoint against a
//! seeded in-memory backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use discovery_cache::{
    api::create_router,
    fetchers::Seed,
    models::{FeedItem, Location, Story},
    AppState, Config, InMemoryBackend,
};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn seed() -> Seed {
    let now = Utc::now();
    Seed {
        onboarded: vec!["alice".into()],
        stories: vec![
            Story {
                id: "s1".into(),
                user_id: "alice".into(),
                media_url: "https://cdn.example.com/s1.jpg".into(),
                caption: Some("sunset".into()),
                created_at: now,
                expires_at: now + ChronoDuration::hours(24),
            },
            Story {
                id: "s0".into(),
                user_id: "alice".into(),
                media_url: "https://cdn.example.com/s0.jpg".into(),
                caption: None,
                created_at: now - ChronoDuration::hours(30),
                expires_at: now - ChronoDuration::hours(6),
            },
        ],
        locations: vec![
            Location {
                id: "lis".into(),
                name: "Lisbon".into(),
                latitude: 38.72,
                longitude: -9.14,
                country: Some("PT".into()),
            },
            Location {
                id: "opo".into(),
                name: "Porto".into(),
                latitude: 41.15,
                longitude: -8.61,
                country: Some("PT".into()),
            },
        ],
        feed: (0..5)
            .map(|n| FeedItem {
                id: format!("post-{n}"),
                author_id: "alice".into(),
                body: format!("post number {n}"),
                location_id: None,
                created_at: now,
            })
            .collect(),
    }
}

fn create_test_app() -> (Router, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::from_seed(seed()));
    let state = AppState::from_config(backend.clone(), &Config::default());
    (create_router(state), backend)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// == Onboarding ==

#[tokio::test]
async fn test_onboarding_endpoint() {
    let (app, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/users/alice/onboarding").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], "alice");
    assert_eq!(json["completed"], true);

    let (_, json) = send(&app, "GET", "/users/bob/onboarding").await;
    assert_eq!(json["completed"], false);
}

#[tokio::test]
async fn test_onboarding_is_cached_between_requests() {
    let (app, backend) = create_test_app();

    send(&app, "GET", "/users/alice/onboarding").await;
    send(&app, "GET", "/users/alice/onboarding").await;

    assert_eq!(backend.calls().onboarding, 1);
}

#[tokio::test]
async fn test_onboarding_fails_open_when_backend_is_down() {
    let (app, backend) = create_test_app();
    backend.set_failing(true);

    let (status, json) = send(&app, "GET", "/users/bob/onboarding").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["completed"], true);
}

// == Stories ==

#[tokio::test]
async fn test_stories_endpoint_returns_active_stories() {
    let (app, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/users/alice/stories").await;
    assert_eq!(status, StatusCode::OK);

    let stories = json.as_array().unwrap();
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0]["id"], "s1");
}

#[tokio::test]
async fn test_stories_fail_open_to_empty_list() {
    let (app, backend) = create_test_app();
    backend.set_failing(true);

    let (status, json) = send(&app, "GET", "/users/alice/stories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

// == Invalidation ==

#[tokio::test]
async fn test_invalidate_user_forces_refetch() {
    let (app, backend) = create_test_app();

    send(&app, "GET", "/users/alice/onboarding").await;
    send(&app, "GET", "/users/alice/stories").await;

    let (status, json) = send(&app, "DELETE", "/users/alice/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 2);
    assert!(json["message"].as_str().unwrap().contains("alice"));

    send(&app, "GET", "/users/alice/onboarding").await;
    assert_eq!(backend.calls().onboarding, 2);
}

// == Locations ==

#[tokio::test]
async fn test_location_endpoint() {
    let (app, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/locations/lis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Lisbon");
}

#[tokio::test]
async fn test_location_not_found() {
    let (app, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/locations/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_locations_endpoint_keeps_request_order() {
    let (app, backend) = create_test_app();

    let (status, json) = send(&app, "GET", "/locations?ids=opo,nowhere,lis").await;
    assert_eq!(status, StatusCode::OK);

    let slots = json.as_array().unwrap();
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0]["id"], "opo");
    assert!(slots[1].is_null());
    assert_eq!(slots[2]["id"], "lis");
    assert_eq!(backend.calls().locations, 1);
}

#[tokio::test]
async fn test_locations_endpoint_rejects_empty_ids() {
    let (app, _) = create_test_app();

    let (status, _) = send(&app, "GET", "/locations?ids=,,").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// == Feed ==

#[tokio::test]
async fn test_feed_endpoint_walks_pages() {
    let (app, _) = create_test_app();

    let (status, first) = send(&app, "GET", "/feed?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"].as_array().unwrap().len(), 2);
    assert_eq!(first["hasMore"], true);

    let cursor = first["nextCursor"].as_str().unwrap();
    let (_, second) = send(&app, "GET", &format!("/feed?limit=2&cursor={cursor}")).await;
    assert_eq!(second["data"][0]["id"], "post-2");
}

#[tokio::test]
async fn test_feed_endpoint_rejects_oversized_limit() {
    let (app, _) = create_test_app();

    let (status, _) = send(&app, "GET", "/feed?limit=1000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feed_failure_is_bad_gateway() {
    let (app, backend) = create_test_app();
    backend.set_failing(true);

    let (status, json) = send(&app, "GET", "/feed").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("backend unavailable"));
}

// == Stats / Health ==

#[tokio::test]
async fn test_stats_reflect_hits_and_misses() {
    let (app, _) = create_test_app();

    send(&app, "GET", "/users/alice/onboarding").await;
    send(&app, "GET", "/users/alice/onboarding").await;

    let (status, json) = send(&app, "GET", "/stats").await;
    assert_eq!(status, StatusCode::OK);

    let onboarding = &json["caches"][0];
    assert_eq!(onboarding["name"], "onboarding");
    assert_eq!(onboarding["hits"], 1);
    assert_eq!(onboarding["misses"], 1);
    assert_eq!(onboarding["total_entries"], 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}
