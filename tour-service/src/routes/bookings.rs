//! `/api/v1/bookings`

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::adapters::{CheckoutRequest, CheckoutSession};
use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::handlers::{ItemResponse, ListResponse, NoContent, Payload, QuerySpec, SUCCESS};
use crate::repository::{str_field, Repository};
use crate::resources::{Booking, Role, Tour};
use crate::state::AppState;
use crate::store::{Document, Filter};

/// Roles allowed to manage bookings directly
pub const BOOKING_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout-session/{tour_id}", get(checkout_session))
        .route("/", get(list_bookings).post(create_booking))
        .route(
            "/{id}",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub status: &'static str,
    pub session: CheckoutSession,
}

/// Start a hosted checkout for one place on a tour
async fn checkout_session(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
) -> Result<Json<CheckoutResponse>> {
    let tour = state
        .collection::<Tour>()
        .find_by_id(&tour_id, &[])
        .await?
        .ok_or_else(|| Error::NotFound("No tour found with that ID".to_string()))?;

    let request = checkout_request(&state, &tour, &user)?;
    let session = state.payments().create_checkout_session(request).await?;

    Ok(Json(CheckoutResponse {
        status: SUCCESS,
        session,
    }))
}

/// Describe the purchase of `tour` by `user`
fn checkout_request(state: &AppState, tour: &Document, user: &CurrentUser) -> Result<CheckoutRequest> {
    let base = state.config().service.public_url.trim_end_matches('/');
    let id = str_field(tour, "id").unwrap_or_default();
    let name = str_field(tour, "name").unwrap_or_default();
    let price = tour
        .get("price")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| Error::Internal(format!("Tour {id} has no price")))?;

    Ok(CheckoutRequest {
        reference: id.to_string(),
        customer_email: user.email().to_string(),
        product_name: format!("{name} Tour"),
        description: str_field(tour, "summary").unwrap_or_default().to_string(),
        image_url: str_field(tour, "imageCover").map(|cover| format!("{base}/img/tours/{cover}")),
        price,
        currency: state.config().payment.currency.clone(),
        success_url: format!("{base}/?tour={id}&user={}&price={price}", user.id),
        cancel_url: format!(
            "{base}/tour/{}",
            str_field(tour, "slug").unwrap_or_default()
        ),
    })
}

async fn list_bookings(
    user: CurrentUser,
    State(state): State<AppState>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.factory::<Booking>().get_all(Filter::new(), &spec).await
}

async fn get_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.factory::<Booking>().get_one(&id, &[]).await
}

async fn create_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.factory::<Booking>().create_one(payload).await
}

async fn update_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.factory::<Booking>().update_one(&id, payload, None).await
}

async fn delete_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<NoContent> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.factory::<Booking>().delete_one(&id).await
}
