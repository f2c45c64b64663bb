//! Route tables: the versioned JSON API and the rendered pages

pub mod auth;
pub mod bookings;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod views;

use axum::Router;

use crate::state::AppState;

/// Mount point of the JSON API
pub const API_BASE: &str = "/api/v1";

/// Every resource router under one table, relative to [`API_BASE`]
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/tours", tours::router())
        .nest("/users", users::router())
        .nest("/reviews", reviews::router())
        .nest("/bookings", bookings::router())
}
