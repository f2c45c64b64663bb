//! `/api/v1/users`: authentication, self-service and administration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};

use super::auth;
use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::handlers::{filter_body, ItemResponse, ListResponse, NoContent, Payload, QuerySpec, SUCCESS};
use crate::resources::{Role, User};
use crate::state::AppState;
use crate::store::{Document, Filter};

pub const PASSWORD_ON_UPDATE_ME: &str =
    "This route is not for password updates. Please use /updateMyPassword";
pub const USE_SIGNUP: &str = "This route is not defined. Please use /signup instead";

/// Fields a user may change on their own account
const SELF_EDITABLE: &[&str] = &["name", "email", "photo"];

/// Fields an administrator may change on any account
const ADMIN_EDITABLE: &[&str] = &["name", "email", "role"];

const ADMINS: &[Role] = &[Role::Admin];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/{token}", post(auth::reset_password))
        .route("/updateMyPassword", patch(auth::update_my_password))
        .route("/me", get(get_me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", axum::routing::delete(delete_me))
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user))
        .route("/updateUser/{id}", patch(update_user))
        .route("/deleteUser/{id}", axum::routing::delete(delete_user))
}

async fn get_me(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<ItemResponse<Document>> {
    state.factory::<User>().get_one(&user.id, &[]).await
}

async fn update_me(
    user: CurrentUser,
    State(state): State<AppState>,
    payload: Payload,
) -> Result<Json<Value>> {
    if payload.contains(User::PASSWORD) || payload.contains(User::PASSWORD_CONFIRM) {
        return Err(Error::BadRequest(PASSWORD_ON_UPDATE_ME.to_string()));
    }

    let updated = state
        .factory::<User>()
        .update_one(&user.id, payload.into_inner(), Some(SELF_EDITABLE))
        .await?
        .into_inner();

    Ok(Json(json!({ "status": SUCCESS, "data": { "user": updated } })))
}

/// Deactivate the account; it disappears from every read afterwards
async fn delete_me(user: CurrentUser, State(state): State<AppState>) -> Result<NoContent> {
    let mut patch = Document::new();
    patch.insert("active".to_string(), Value::Bool(false));
    state
        .collection::<User>()
        .patch_unchecked(&user.id, patch)
        .await?;

    tracing::info!(user = %user.id, "account deactivated");
    Ok(NoContent)
}

async fn list_users(
    user: CurrentUser,
    State(state): State<AppState>,
    spec: QuerySpec,
) -> Result<ListResponse<Document>> {
    user.restrict_to(ADMINS)?;
    state.factory::<User>().get_all(Filter::new(), &spec).await
}

async fn create_user(user: CurrentUser) -> Result<NoContent> {
    user.restrict_to(ADMINS)?;
    Err(Error::operational(StatusCode::INTERNAL_SERVER_ERROR, USE_SIGNUP))
}

async fn get_user(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(ADMINS)?;
    state.factory::<User>().get_one(&id, &[]).await
}

async fn update_user(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(payload): Payload,
) -> Result<ItemResponse<Document>> {
    user.restrict_to(ADMINS)?;
    state
        .factory::<User>()
        .update_one(&id, filter_body(payload, ADMIN_EDITABLE), None)
        .await
}

async fn delete_user(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<NoContent> {
    user.restrict_to(ADMINS)?;
    state.factory::<User>().delete_one(&id).await
}
