//! API Handlers
//!
//! HTTP request handlers for the discovery gateway. Every read goes through
//! [`DomainFetchers`], so handlers never talk to the backend directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::fetchers::{Backend, DomainFetchers};
use crate::models::{
    CacheReport, FeedItem, FeedQuery, HealthResponse, InvalidateResponse, Location,
    LocationsQuery, OnboardingResponse, StatsResponse, Story,
};
use crate::pagination::Page;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetchers: DomainFetchers,
}

impl AppState {
    pub fn new(fetchers: DomainFetchers) -> Self {
        Self { fetchers }
    }

    /// Builds the fetchers for `backend` using the configured policies.
    pub fn from_config(backend: Arc<dyn Backend>, config: &Config) -> Self {
        Self::new(DomainFetchers::new(backend, config))
    }
}

/// Handler for GET /users/:user_id/onboarding
pub async fn onboarding_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<OnboardingResponse>> {
    let completed = state.fetchers.onboarding_status(&user_id).await?;
    Ok(Json(OnboardingResponse::new(user_id, completed)))
}

/// Handler for GET /users/:user_id/stories
pub async fn stories_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Story>>> {
    Ok(Json(state.fetchers.stories(&user_id).await?))
}

/// Handler for DELETE /users/:user_id/cache
pub async fn invalidate_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.fetchers.invalidate_user(&user_id).await;
    Json(InvalidateResponse::new(user_id, removed))
}

/// Handler for GET /locations/:id
///
/// Lookups from concurrent requests share one backend batch.
pub async fn location_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Location>> {
    state
        .fetchers
        .location(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("location '{}'", id)))
}

/// Handler for GET /locations?ids=a,b,c
///
/// Returns one slot per requested id, `null` where the id is unknown.
pub async fn locations_handler(
    State(state): State<AppState>,
    Query(query): Query<LocationsQuery>,
) -> ApiResult<Json<Vec<Option<Location>>>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    Ok(Json(state.fetchers.locations(&query.ids()).await?))
}

/// Handler for GET /feed?cursor=&limit=
///
/// Feed failures are not absorbed and surface as 502.
pub async fn feed_handler(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Page<FeedItem, String>>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let limit = query.limit.unwrap_or_else(|| state.fetchers.page_size());
    Ok(Json(state.fetchers.feed_page(query.cursor(), limit).await?))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let caches = state
        .fetchers
        .cache_stats()
        .await
        .iter()
        .map(|(name, stats)| CacheReport::new(*name, stats))
        .collect();

    Json(StatsResponse::new(caches, state.fetchers.pending_requests()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::{InMemoryBackend, Seed};

    fn state_with(backend: Arc<InMemoryBackend>) -> AppState {
        AppState::from_config(backend, &Config::default())
    }

    fn seeded() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::from_seed(Seed {
            onboarded: vec!["u1".into()],
            locations: vec![Location {
                id: "l1".into(),
                name: "Lisbon".into(),
                latitude: 38.72,
                longitude: -9.14,
                country: Some("PT".into()),
            }],
            ..Seed::default()
        }))
    }

    #[tokio::test]
    async fn test_onboarding_handler() {
        let state = state_with(seeded());

        let response = onboarding_handler(State(state), Path("u1".to_string()))
            .await
            .unwrap();
        assert_eq!(response.user_id, "u1");
        assert!(response.completed);
    }

    #[tokio::test]
    async fn test_onboarding_handler_rejects_blank_id() {
        let state = state_with(seeded());

        let result = onboarding_handler(State(state), Path(" ".to_string())).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_location_handler_not_found() {
        let state = state_with(seeded());

        let found = location_handler(State(state.clone()), Path("l1".to_string())).await;
        assert_eq!(found.unwrap().name, "Lisbon");

        let missing = location_handler(State(state), Path("l9".to_string())).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_locations_handler_requires_ids() {
        let state = state_with(seeded());
        let query = LocationsQuery { ids: " , ".into() };

        let result = locations_handler(State(state), Query(query)).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_feed_handler_surfaces_backend_failure() {
        let backend = seeded();
        backend.set_failing(true);
        let state = state_with(backend);

        let result = feed_handler(State(state), Query(FeedQuery::default())).await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_invalidate_user_handler() {
        let backend = seeded();
        let state = state_with(Arc::clone(&backend));

        onboarding_handler(State(state.clone()), Path("u1".to_string()))
            .await
            .unwrap();
        let response = invalidate_user_handler(State(state), Path("u1".to_string())).await;

        assert_eq!(response.removed, 1);
    }

    #[tokio::test]
    async fn test_stats_handler_lists_every_cache() {
        let state = state_with(seeded());

        let response = stats_handler(State(state)).await;
        let names: Vec<&str> = response.caches.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["onboarding", "stories", "locations", "feed"]);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
