//! Models
//!
//! Domain records plus the request/response DTOs of the gateway API.

pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{FeedItem, Location, Story};
pub use requests::{FeedQuery, LocationsQuery};
pub use responses::{
    CacheReport, HealthResponse, InvalidateResponse, OnboardingResponse, StatsResponse,
};
