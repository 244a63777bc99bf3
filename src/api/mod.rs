//! API Module
//!
//! HTTP handlers and routing for the discovery gateway.
//!
//! # Endpoints
//! - `GET /users/:user_id/onboarding` - Onboarding status
//! - `GET /users/:user_id/stories` - Active stories
//! - `DELETE /users/:user_id/cache` - Invalidate a user's cached reads
//! - `GET /locations/:id` - Single location lookup
//! - `GET /locations?ids=` - Multi-location lookup
//! - `GET /feed` - Cursor-paginated discovery feed
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
