//! # tour-service
//!
//! Tour booking backend: a versioned JSON API, server-rendered pages, JWT
//! authentication and hosted checkout.
//!
//! ## Features
//!
//! - **Generic resource handling**: one query builder and one set of CRUD
//!   handlers serve tours, users, reviews and bookings
//! - **Auth guard**: bearer or cookie tokens, password-change invalidation and
//!   role restriction as axum extractors
//! - **Error normalization**: every failure renders as a JSON envelope under
//!   `/api` and as an HTML page elsewhere, detailed in development only
//! - **Middleware stack**: request ids, sensitive header masking, per-client
//!   rate limiting, security headers, compression, body limits, panic recovery
//! - **Graceful shutdown**: SIGTERM and SIGINT drain in-flight requests
//!
//! ## Example
//!
//! ```rust,no_run
//! use tour_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::builder().config(config).build().await?;
//!     Server::new(state).serve().await
//! }
//! ```

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod repository;
pub mod resources;
pub mod routes;
pub mod seed;
pub mod server;
pub mod state;
pub mod store;
pub mod templates;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{Email, EmailTemplate, Mailer, PaymentGateway};
    pub use crate::auth::{CurrentUser, MaybeUser};
    pub use crate::config::{Config, Environment};
    pub use crate::error::{Error, Result};
    pub use crate::handlers::{HandlerFactory, ItemResponse, ListResponse, NoContent, QuerySpec};
    pub use crate::health::{health, readiness};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{Collection, Repository, Resource};
    pub use crate::resources::{Booking, Review, Role, Tour, User};
    pub use crate::server::{build_router, Server};
    pub use crate::state::{AppState, AppStateBuilder};
    pub use crate::store::{DocumentStore, MemoryStore};

    pub use axum::{
        extract::{Path, Query, State},
        routing::{delete, get, patch, post},
        Json, Router,
    };
}
