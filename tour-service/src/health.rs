//! Liveness and readiness probes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Environment;
use crate::repository::Resource;
use crate::resources::{Booking, Review, Tour, User};
use crate::state::AppState;
use crate::store::Filter;

/// Collections the readiness probe counts
const PROBED: [&str; 4] = [
    Tour::COLLECTION,
    User::COLLECTION,
    Review::COLLECTION,
    Booking::COLLECTION,
];

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub environment: Environment,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    /// Documents per collection; absent when the store did not answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Always 200 while the process serves requests
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        environment: state.config().environment(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 503 until every collection can be counted
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let service = state.config().service.name.clone();
    let mut documents = BTreeMap::new();

    for collection in PROBED {
        match state.store().count(collection, &Filter::new()).await {
            Ok(count) => {
                documents.insert(collection.to_string(), count);
            }
            Err(e) => {
                tracing::warn!(error = %e, collection, "document store is not ready");
                let response = ReadinessResponse {
                    ready: false,
                    service,
                    documents: None,
                    message: Some(e.to_string()),
                };
                return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
            }
        }
    }

    let response = ReadinessResponse {
        ready: true,
        service,
        documents: Some(documents),
        message: None,
    };
    (StatusCode::OK, Json(response))
}
