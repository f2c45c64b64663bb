//! Sign up, sign in and password management
//!
//! Successful flows answer with a fresh token, both in the body and in the
//! `jwt` cookie, and the user document without its hidden fields.

use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use serde_json::{json, Value};

use crate::adapters::email::RESET_TOKEN_TTL_MINUTES;
use crate::adapters::{Email, EmailTemplate};
use crate::auth::{login_cookie, logout_cookie, CurrentUser};
use crate::error::{Error, Result};
use crate::handlers::{filter_body, Payload, SUCCESS};
use crate::repository::{str_field, Repository};
use crate::resources::User;
use crate::state::AppState;
use crate::store::{document_id, now_timestamp, timestamp, Document, Filter, FilterCondition};

pub const MISSING_CREDENTIALS: &str = "Please provide your email and password!";
pub const WRONG_CREDENTIALS: &str = "incorrect email or password";
pub const MISSING_EMAIL: &str = "Please provide your email address";
pub const RESET_SENT: &str =
    "If an account exists with this email, a password reset link has been sent.";
pub const RESET_EMAIL_FAILED: &str = "There was an error sending the email. Try again later!";
pub const RESET_TOKEN_INVALID: &str = "Token is invalid or has expired";
pub const WRONG_CURRENT_PASSWORD: &str = "Your current password is wrong.";

/// Fields a new account may set
const SIGNUP_FIELDS: &[&str] = &["name", "email", "password", "passwordConfirm"];

#[derive(Debug, Serialize)]
struct UserData {
    user: Document,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    status: &'static str,
    token: String,
    data: UserData,
}

/// Issue a token for `user` and answer with it
fn send_token(state: &AppState, user: Document, status: StatusCode) -> Result<Response> {
    let id = document_id(&user)
        .ok_or_else(|| Error::Internal("user document has no id".to_string()))?;
    let token = state.jwt().sign(id)?;
    let cookie = login_cookie(&token, &state.config().jwt, state.secure_cookies());

    let body = TokenResponse {
        status: SUCCESS,
        token,
        data: UserData { user },
    };
    Ok((status, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

fn public_url(state: &AppState, path: &str) -> String {
    format!(
        "{}{path}",
        state.config().service.public_url.trim_end_matches('/')
    )
}

/// Random reset token sent to the user; only its digest is stored
fn new_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn digest(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

pub async fn signup(
    State(state): State<AppState>,
    Payload(payload): Payload,
) -> Result<Response> {
    let user = state
        .collection::<User>()
        .create(filter_body(payload, SIGNUP_FIELDS))
        .await?;

    let email = Email::new(
        EmailTemplate::Welcome,
        str_field(&user, "email").unwrap_or_default(),
        str_field(&user, "name").unwrap_or_default(),
        public_url(&state, "/me"),
    );
    if let Err(err) = state.mailer().send(&email).await {
        tracing::warn!(error = %err, to = %email.to, "welcome email could not be sent");
    }

    send_token(&state, user, StatusCode::CREATED)
}

pub async fn login(State(state): State<AppState>, payload: Payload) -> Result<Response> {
    let (Some(email), Some(password)) = (payload.str("email"), payload.str("password")) else {
        return Err(Error::BadRequest(MISSING_CREDENTIALS.to_string()));
    };

    let users = state.collection::<User>();
    let filter = Filter::new().and(FilterCondition::eq("email", email.trim().to_lowercase()));
    let user = users.find_one_with_secrets(filter).await?;

    let verified = match &user {
        Some(doc) => match str_field(doc, User::PASSWORD) {
            Some(hash) => state.hasher().verify(password, hash)?,
            None => false,
        },
        None => false,
    };
    let Some(user) = user.filter(|_| verified) else {
        return Err(Error::Unauthorized(WRONG_CREDENTIALS.to_string()));
    };

    send_token(&state, users.present_one(user), StatusCode::OK)
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, logout_cookie(state.secure_cookies()))],
        Json(json!({ "status": SUCCESS })),
    )
}

pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Payload,
) -> Result<Json<Value>> {
    let email = payload
        .str("email")
        .ok_or_else(|| Error::BadRequest(MISSING_EMAIL.to_string()))?;

    let users = state.collection::<User>();
    let filter = Filter::new().and(FilterCondition::eq("email", email.trim().to_lowercase()));
    let sent = Json(json!({ "status": SUCCESS, "message": RESET_SENT }));

    // Same answer whether or not the account exists
    let Some(user) = users.find_one_with_secrets(filter).await? else {
        return Ok(sent);
    };
    let id = document_id(&user).unwrap_or_default().to_string();

    let token = new_reset_token();
    let mut patch = Document::new();
    patch.insert(User::RESET_TOKEN.to_string(), Value::String(digest(&token)));
    patch.insert(
        User::RESET_EXPIRES.to_string(),
        Value::String(timestamp(Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES))),
    );
    users.patch_unchecked(&id, patch).await?;

    let email = Email::new(
        EmailTemplate::PasswordReset,
        str_field(&user, "email").unwrap_or_default(),
        str_field(&user, "name").unwrap_or_default(),
        public_url(&state, &format!("/api/v1/users/resetPassword/{token}")),
    );
    if let Err(err) = state.mailer().send(&email).await {
        tracing::error!(error = %err, user = %id, "password reset email failed");
        users
            .unset_unchecked(&id, &[User::RESET_TOKEN, User::RESET_EXPIRES])
            .await?;
        return Err(Error::operational(
            StatusCode::INTERNAL_SERVER_ERROR,
            RESET_EMAIL_FAILED,
        ));
    }

    Ok(sent)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Payload,
) -> Result<Response> {
    let users = state.collection::<User>();
    let filter = Filter::new()
        .and(FilterCondition::eq(User::RESET_TOKEN, digest(&token)))
        .and(FilterCondition::gt(User::RESET_EXPIRES, now_timestamp()));
    let mut user = users
        .find_one_with_secrets(filter)
        .await?
        .ok_or_else(|| Error::BadRequest(RESET_TOKEN_INVALID.to_string()))?;

    set_password(&mut user, payload);
    user.remove(User::RESET_TOKEN);
    user.remove(User::RESET_EXPIRES);
    let saved = users.save(user).await?;

    send_token(&state, saved, StatusCode::CREATED)
}

pub async fn update_my_password(
    current: CurrentUser,
    State(state): State<AppState>,
    payload: Payload,
) -> Result<Response> {
    let users = state.collection::<User>();
    let mut user = users
        .find_by_id_with_secrets(&current.id)
        .await?
        .ok_or_else(|| Error::Unauthorized(crate::auth::guard::USER_GONE.to_string()))?;

    let hash = str_field(&user, User::PASSWORD).unwrap_or_default();
    let matches = match payload.str("passwordCurrent") {
        Some(candidate) => state.hasher().verify(candidate, hash)?,
        None => false,
    };
    if !matches {
        return Err(Error::BadRequest(WRONG_CURRENT_PASSWORD.to_string()));
    }

    set_password(&mut user, payload);
    let saved = users.save(user).await?;

    send_token(&state, saved, StatusCode::CREATED)
}

/// Copy the new password and its confirmation onto a stored user
fn set_password(user: &mut Document, payload: Payload) {
    let mut payload = payload.into_inner();
    for field in [User::PASSWORD, User::PASSWORD_CONFIRM] {
        match payload.remove(field) {
            Some(value) => user.insert(field.to_string(), value),
            None => user.remove(field),
        };
    }
}
