//! API Routes
//!
//! Configures the Axum router with all gateway endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    feed_handler, health_handler, invalidate_user_handler, location_handler, locations_handler,
    onboarding_handler, stats_handler, stories_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /users/:user_id/onboarding` - Onboarding status (fail-open)
/// - `GET /users/:user_id/stories` - Active stories (fail-open)
/// - `DELETE /users/:user_id/cache` - Invalidate the user's cached reads
/// - `GET /locations/:id` - Single location, batched with concurrent lookups
/// - `GET /locations?ids=a,b` - Several locations in request order
/// - `GET /feed?cursor=&limit=` - One feed page
/// - `GET /stats` - Per-cache statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/users/:user_id/onboarding", get(onboarding_handler))
        .route("/users/:user_id/stories", get(stories_handler))
        .route("/users/:user_id/cache", delete(invalidate_user_handler))
        .route("/locations", get(locations_handler))
        .route("/locations/:id", get(location_handler))
        .route("/feed", get(feed_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
