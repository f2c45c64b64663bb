//! JSON request bodies

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::Document;

/// A JSON object request body
///
/// Unlike `Json<Document>`, a malformed body fails with an [`Error`] so the
/// client gets the usual error envelope.
#[derive(Debug, Clone, Default)]
pub struct Payload(pub Document);

impl Payload {
    pub fn into_inner(self) -> Document {
        self.0
    }

    /// A non-empty string field
    pub fn str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !v.is_null())
    }
}

impl<S: Send + Sync> FromRequest<S> for Payload {
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(doc) = Json::<Document>::from_request(req, state)
            .await
            .map_err(|rejection| Error::operational(rejection.status(), rejection.body_text()))?;
        Ok(Self(doc))
    }
}
