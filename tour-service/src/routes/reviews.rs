//! `/api/v1/reviews` and `/api/v1/tours/{tour_id}/reviews`
//!
//! Every route requires a signed in user. Reviews are written by the
//! signed in user only; the tour comes from the path when nested.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde_json::Value;

use crate::auth::CurrentUser;
use crate::error::Result;
use crate::handlers::{ItemResponse, ListResponse, NoContent, Payload, QuerySpec};
use crate::resources::{Review, Role};
use crate::state::AppState;
use crate::store::{Document, Filter, FilterCondition};

/// Roles allowed to write reviews
pub const REVIEWERS: &[Role] = &[Role::User, Role::Admin];

/// Fields a review author may change
const EDITABLE: &[&str] = &["review", "rating"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route(
            "/{id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
}

/// Routes mounted below a tour
pub fn nested_router() -> Router<AppState> {
    Router::new().route("/", get(list_tour_reviews).post(create_tour_review))
}

async fn list_reviews(
    _user: CurrentUser,
    State(state): State<AppState>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    state.factory::<Review>().get_all(Filter::new(), &spec).await
}

async fn list_tour_reviews(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    let scope = Filter::new().and(FilterCondition::eq("tour", tour_id));
    state.factory::<Review>().get_all(scope, &spec).await
}

async fn create_review(
    user: CurrentUser,
    State(state): State<AppState>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(REVIEWERS)?;
    state
        .factory::<Review>()
        .create_one(authored(payload, &user, None))
        .await
}

async fn create_tour_review(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(REVIEWERS)?;
    state
        .factory::<Review>()
        .create_one(authored(payload, &user, Some(tour_id)))
        .await
}

async fn get_review(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ItemResponse<Document>> {
    state.factory::<Review>().get_one(&id, &[]).await
}

async fn update_review(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(REVIEWERS)?;
    state
        .factory::<Review>()
        .update_one(&id, payload, Some(EDITABLE))
        .await
}

async fn delete_review(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<NoContent> {
    user.restrict_to(REVIEWERS)?;
    state.factory::<Review>().delete_one(&id).await
}

/// Attach the author and, when nested, the tour from the path
fn authored(mut payload: Document, user: &CurrentUser, tour_id: Option<String>) -> Document {
    if let Some(tour_id) = tour_id {
        payload.insert("tour".to_string(), Value::String(tour_id));
    }
    payload.insert("user".to_string(), Value::String(user.id.clone()));
    payload
}
