//! JWT issuing, verification and transport
//!
//! Tokens are HS256 JWTs carrying the user id. Clients send them either as
//! `Authorization: Bearer <token>` or in the `jwt` cookie set on login.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use cookie::Cookie;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::config::JwtConfig;
use crate::error::Result;

/// Cookie carrying the session token
pub const TOKEN_COOKIE: &str = "jwt";

/// Value written over the token cookie on logout
pub const LOGGED_OUT: &str = "loggedout";

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Issued at (seconds since the epoch)
    pub iat: i64,
    /// Expiration (seconds since the epoch)
    pub exp: i64,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}

/// Signing and verification keys derived from the configured secret
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    validation: Validation,
    expires_in: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &Algorithm::HS256)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret)),
            decoding: Arc::new(DecodingKey::from_secret(secret)),
            validation: Validation::new(Algorithm::HS256),
            expires_in: Duration::seconds(config.expires_in_secs),
        }
    }

    /// Issue a token for `user_id` valid from now
    pub fn sign(&self, user_id: &str) -> Result<String> {
        self.sign_at(user_id, Utc::now())
    }

    /// Issue a token as if it had been created at `issued_at`
    pub fn sign_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            id: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.expires_in).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// Token sent with the request, bearer header first, then the `jwt` cookie
///
/// The placeholder written on logout counts as no token.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| v != LOGGED_OUT && !v.is_empty())
}

/// `Set-Cookie` value carrying a freshly issued token
pub fn login_cookie(token: &str, config: &JwtConfig, secure: bool) -> String {
    let expires = OffsetDateTime::now_utc() + time::Duration::days(config.cookie_expires_in_days);
    Cookie::build((TOKEN_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .path("/")
        .expires(expires)
        .build()
        .to_string()
}

/// `Set-Cookie` value replacing the token with a short-lived placeholder
pub fn logout_cookie(secure: bool) -> String {
    let expires = OffsetDateTime::now_utc() + time::Duration::seconds(5);
    Cookie::build((TOKEN_COOKIE, LOGGED_OUT))
        .http_only(true)
        .secure(secure)
        .path("/")
        .expires(expires)
        .build()
        .to_string()
}
