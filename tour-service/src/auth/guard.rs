//! Auth Guard
//!
//! [`CurrentUser`] is an extractor: a handler that takes it only runs for a
//! request carrying a valid token of an existing user whose password has not
//! changed since the token was issued. [`MaybeUser`] performs the same checks
//! but turns every failure into "not signed in", for pages that only
//! personalise their output.
//!
//! ```rust,ignore
//! async fn delete_tour(user: CurrentUser, State(state): State<AppState>, Path(id): Path<String>) -> Result<NoContent> {
//!     user.restrict_to(&[Role::Admin, Role::LeadGuide])?;
//!     state.factory::<Tour>().delete_one(&id).await
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use super::token::extract_token;
use crate::error::{Error, Result};
use crate::repository::str_field;
use crate::resources::{Role, User};
use crate::state::AppState;
use crate::store::{parse_timestamp, Document, StoreOperation};

pub const NOT_LOGGED_IN: &str = "You are not logged in, please log in to get access";
pub const USER_GONE: &str = "The user belonging to this token does no longer exist.";
pub const PASSWORD_CHANGED: &str = "User recently changed password. Please login again";
pub const NOT_PERMITTED: &str = "You do not have permission to perform this action";

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub role: Role,
    /// User document with hidden fields removed
    pub doc: Document,
}

impl CurrentUser {
    pub fn email(&self) -> &str {
        str_field(&self.doc, "email").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        str_field(&self.doc, "name").unwrap_or_default()
    }

    /// Fail with 403 unless the caller has one of `roles`
    pub fn restrict_to(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::Forbidden(NOT_PERMITTED.to_string()))
        }
    }
}

/// Whether the password changed after a token issued at `issued_at` (epoch seconds)
pub fn changed_password_after(user: &Document, issued_at: i64) -> bool {
    user.get(User::PASSWORD_CHANGED_AT)
        .and_then(parse_timestamp)
        .is_some_and(|changed| changed.timestamp() > issued_at)
}

/// Resolve a raw token to the user it was issued for
pub async fn authenticate(state: &AppState, token: &str) -> Result<CurrentUser> {
    let claims = state.jwt().verify(token)?;

    let users = state.collection::<User>();
    let found = match crate::store::parse_id(StoreOperation::FindById, &claims.id) {
        Ok(_) => users.find_by_id_with_secrets(&claims.id).await?,
        Err(_) => None,
    };
    let doc = found.ok_or_else(|| Error::Unauthorized(USER_GONE.to_string()))?;

    if changed_password_after(&doc, claims.iat) {
        return Err(Error::Unauthorized(PASSWORD_CHANGED.to_string()));
    }

    Ok(CurrentUser {
        id: claims.id,
        role: User::role(&doc),
        doc: users.present_one(doc),
    })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = extract_token(&parts.headers)
            .ok_or_else(|| Error::Unauthorized(NOT_LOGGED_IN.to_string()))?;
        let user = authenticate(state, &token).await?;

        tracing::debug!(user = %user.id, role = %user.role, "request authenticated");
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// The caller if they are signed in, `None` otherwise
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn doc(&self) -> Option<&Document> {
        self.0.as_ref().map(|u| &u.doc)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Infallible> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(err) => {
                tracing::trace!(reason = %err, "continuing without a signed in user");
                Ok(Self(None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use crate::state::test_support::test_state;
    use crate::store::{document_id, timestamp};
    use axum::http::{header, Request};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    async fn create_user(state: &AppState, email: &str, role: &str) -> Document {
        let doc = match json!({
            "name": "Leo Gillespie",
            "email": email,
            "role": role,
            "password": "pass1234",
            "passwordConfirm": "pass1234"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        state.collection::<User>().create(doc).await.unwrap()
    }

    fn parts_with(header_value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/users/me");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_valid_token_yields_user_without_secrets() {
        let state = test_state().await;
        let user = create_user(&state, "leo@example.com", "guide").await;
        let id = document_id(&user).unwrap();
        let token = state.jwt().sign(id).unwrap();

        let current = authenticate(&state, &token).await.unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.role, Role::Guide);
        assert_eq!(current.email(), "leo@example.com");
        assert!(!current.doc.contains_key("password"));
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let state = test_state().await;
        let mut parts = parts_with(None);
        match CurrentUser::from_request_parts(&mut parts, &state).await {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, NOT_LOGGED_IN),
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_for_deleted_user_is_rejected() {
        let state = test_state().await;
        let user = create_user(&state, "gone@example.com", "user").await;
        let id = document_id(&user).unwrap().to_string();
        let token = state.jwt().sign(&id).unwrap();
        state.collection::<User>().delete(&id).await.unwrap();

        match authenticate(&state, &token).await {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, USER_GONE),
            other => panic!("expected unauthorized, got {other:?}"),
        }

        let forged = state.jwt().sign("not-a-valid-id").unwrap();
        assert!(matches!(
            authenticate(&state, &forged).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_token_issued_before_password_change_is_rejected() {
        let state = test_state().await;
        let user = create_user(&state, "stale@example.com", "user").await;
        let id = document_id(&user).unwrap().to_string();

        let issued = Utc::now() - Duration::minutes(30);
        let stale = state.jwt().sign_at(&id, issued).unwrap();

        let mut patch = Document::new();
        patch.insert(
            User::PASSWORD_CHANGED_AT.into(),
            json!(timestamp(Utc::now() - Duration::minutes(5))),
        );
        state
            .collection::<User>()
            .patch_unchecked(&id, patch)
            .await
            .unwrap();

        match authenticate(&state, &stale).await {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, PASSWORD_CHANGED),
            other => panic!("expected unauthorized, got {other:?}"),
        }

        let fresh = state.jwt().sign(&id).unwrap();
        assert!(authenticate(&state, &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_extractor_and_soft_variant() {
        let state = test_state().await;
        let user = create_user(&state, "admin@example.com", "admin").await;
        let token = state.jwt().sign(document_id(&user).unwrap()).unwrap();

        let mut parts = parts_with(Some(&format!("Bearer {token}")));
        let current = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(current.restrict_to(&[Role::Admin]).is_ok());
        assert!(parts.extensions.get::<CurrentUser>().is_some());

        let mut parts = parts_with(Some("Bearer garbage"));
        let MaybeUser(maybe) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(maybe.is_none());
    }

    #[test]
    fn test_restrict_to() {
        let user = CurrentUser {
            id: "1".into(),
            role: Role::User,
            doc: Document::new(),
        };
        match user.restrict_to(&[Role::Admin, Role::LeadGuide]) {
            Err(Error::Forbidden(msg)) => assert_eq!(msg, NOT_PERMITTED),
            other => panic!("expected forbidden, got {other:?}"),
        }
        assert!(user.restrict_to(&[Role::User, Role::Admin]).is_ok());
    }

    #[test]
    fn test_changed_password_after() {
        let mut doc = Document::new();
        assert!(!changed_password_after(&doc, 0));

        let changed = Utc::now() - Duration::hours(1);
        doc.insert(User::PASSWORD_CHANGED_AT.into(), json!(timestamp(changed)));
        assert!(changed_password_after(&doc, (changed - Duration::hours(1)).timestamp()));
        assert!(!changed_password_after(&doc, Utc::now().timestamp()));
    }
}
