//! Server-rendered pages

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{CurrentUser, MaybeUser};
use crate::error::{Error, Result};
use crate::repository::{populate, Repository};
use crate::resources::tour::TOUR_REVIEWS;
use crate::resources::{Booking, Tour};
use crate::state::AppState;
use crate::store::{Document, Filter, FilterCondition, ReadQuery};
use crate::templates::{
    AccountPage, HtmlTemplate, LoginPage, NavUser, OverviewPage, PageContext, TourPage, TourView,
};

pub const NO_SUCH_TOUR: &str = "There is no tour with that name.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/tour/{slug}", get(tour_page))
        .route("/login", get(login_form))
        .route("/me", get(account))
        .route("/my-tours", get(my_tours))
}

/// Parameters the payment provider appends to the success redirect
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutCompletion {
    tour: Option<String>,
    user: Option<String>,
    price: Option<f64>,
}

async fn overview(
    user: MaybeUser,
    State(state): State<AppState>,
    completion: std::result::Result<Query<CheckoutCompletion>, QueryRejection>,
) -> Result<Response> {
    // A malformed redirect is not a booking; the overview still renders
    let completion = match completion {
        Ok(Query(completion)) => completion,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "ignoring malformed checkout parameters");
            CheckoutCompletion::default()
        }
    };
    if let Some(booking) = completed_booking(&completion, &user) {
        state.collection::<Booking>().create(booking).await?;
        tracing::info!(tour = ?completion.tour, user = ?completion.user, "booking recorded");
        return Ok(Redirect::to("/").into_response());
    }

    let tours = state.collection::<Tour>().find_all(ReadQuery::default()).await?;
    let page = OverviewPage {
        ctx: PageContext::new("All Tours").with_user(user.doc()),
        tours: tours.into_iter().map(TourView::from_document).collect(),
    };
    Ok(HtmlTemplate::page(page).into_response())
}

/// Booking document for a completed checkout, if the redirect carries one
///
/// The redirect is only trusted when it names the signed-in user.
fn completed_booking(completion: &CheckoutCompletion, user: &MaybeUser) -> Option<Document> {
    let (Some(tour), Some(user_id), Some(price)) =
        (&completion.tour, &completion.user, completion.price)
    else {
        return None;
    };
    let signed_in = user.0.as_ref()?;
    if signed_in.id != *user_id {
        tracing::warn!(claimed = %user_id, actual = %signed_in.id, "ignoring checkout redirect for another user");
        return None;
    }

    match json!({ "tour": tour, "user": user_id, "price": price }) {
        Value::Object(doc) => Some(doc),
        _ => None,
    }
}

async fn tour_page(
    user: MaybeUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response> {
    let tours = state.collection::<Tour>();
    let mut tour = tours
        .find_one(Filter::new().and(FilterCondition::eq("slug", slug)))
        .await?
        .ok_or_else(|| Error::NotFound(NO_SUCH_TOUR.to_string()))?;
    populate(tours.store(), &mut tour, &[TOUR_REVIEWS]).await?;

    let tour = TourView::from_document(tour);
    let page = TourPage {
        ctx: PageContext::new(format!("{} Tour", tour.name)).with_user(user.doc()),
        tour,
    };
    Ok(HtmlTemplate::page(page).into_response())
}

async fn login_form(user: MaybeUser) -> impl IntoResponse {
    HtmlTemplate::page(LoginPage {
        ctx: PageContext::new("Log into your account").with_user(user.doc()),
    })
}

async fn account(user: CurrentUser) -> impl IntoResponse {
    HtmlTemplate::private(AccountPage {
        ctx: PageContext::new("Your account").with_user(Some(&user.doc)),
        user: NavUser::from_document(&user.doc),
    })
}

/// Tours the signed-in user has booked
async fn my_tours(user: CurrentUser, State(state): State<AppState>) -> Result<Response> {
    let bookings = state
        .collection::<Booking>()
        .find_all(ReadQuery::new(
            Filter::new().and(FilterCondition::eq("user", user.id.clone())),
        ))
        .await?;
    let tour_ids = booked_tour_ids(&bookings);

    let tours = state
        .collection::<Tour>()
        .find_all(ReadQuery::new(
            Filter::new().and(FilterCondition::in_strings("id", tour_ids)),
        ))
        .await?;

    let page = OverviewPage {
        ctx: PageContext::new("My Bookings").with_user(Some(&user.doc)),
        tours: tours.into_iter().map(TourView::from_document).collect(),
    };
    Ok(HtmlTemplate::private(page).into_response())
}

/// Tour ids of `bookings`, whether the tour is a bare id or already loaded
fn booked_tour_ids(bookings: &[Document]) -> Vec<String> {
    bookings
        .iter()
        .filter_map(|booking| match booking.get("tour")? {
            Value::String(id) => Some(id.clone()),
            Value::Object(tour) => tour.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}
