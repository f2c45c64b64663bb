//! `/api/v1/tours`

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

use super::reviews;
use crate::auth::CurrentUser;
use crate::error::Result;
use crate::handlers::{ItemResponse, ListResponse, NoContent, Payload, QuerySpec};
use crate::resources::tour::TOUR_REVIEWS;
use crate::resources::{Role, Tour};
use crate::state::AppState;
use crate::store::{Document, Filter};

/// Roles allowed to change the catalogue
pub const TOUR_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];

const TOP_FIVE_FIELDS: &str = "name,price,ratingsAverage,summary,difficulty";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tours).post(create_tour))
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/{id}", get(get_tour).patch(update_tour).delete(delete_tour))
        .nest("/{id}/reviews", reviews::nested_router())
}

async fn list_tours(
    State(state): State<AppState>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    state.factory::<Tour>().get_all(Filter::new(), &spec).await
}

/// Best rated, cheapest first
async fn top_five_cheap(
    State(state): State<AppState>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    let spec = spec
        .with("limit", "5")
        .with("sort", "-ratingsAverage,price")
        .with("fields", TOP_FIVE_FIELDS);
    state.factory::<Tour>().get_all(Filter::new(), &spec).await
}

async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ItemResponse<Document>> {
    state.factory::<Tour>().get_one(&id, &[TOUR_REVIEWS]).await
}

async fn create_tour(
    user: CurrentUser,
    State(state): State<AppState>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(TOUR_MANAGERS)?;
    state.factory::<Tour>().create_one(payload).await
}

async fn update_tour(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(TOUR_MANAGERS)?;
    state.factory::<Tour>().update_one(&id, payload, None).await
}

async fn delete_tour(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<NoContent> {
    user.restrict_to(TOUR_MANAGERS)?;
    state.factory::<Tour>().delete_one(&id).await
}
