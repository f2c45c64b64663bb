//! Success envelopes for API handlers
//!
//! Every successful API response has the shape
//! `{"status": "success", "data": {...}}`; list responses add a `results`
//! count.
//!
//! # Example
//!
//! ```rust
//! use tour_service::handlers::{ItemResponse, ListResponse};
//! use axum::http::StatusCode;
//!
//! let created = ItemResponse::new("The Forest Hiker").with_status(StatusCode::CREATED);
//! assert_eq!(created.status_code(), StatusCode::CREATED);
//!
//! let list = ListResponse::new(vec![1, 2, 3]);
//! assert_eq!(list.results, 3);
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Value of the `status` field on every successful response
pub const SUCCESS: &str = "success";

/// Payload nested under `data`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Single item response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse<T> {
    pub status: &'static str,
    pub data: DataEnvelope<T>,
    #[serde(skip)]
    code: StatusCode,
}

impl<T> ItemResponse<T> {
    /// Create a `200 OK` item response
    pub fn new(data: T) -> Self {
        Self {
            status: SUCCESS,
            data: DataEnvelope { data },
            code: StatusCode::OK,
        }
    }

    /// Override the HTTP status, e.g. `201 Created`
    #[must_use]
    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.code = code;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code
    }

    /// Unwrap the item
    pub fn into_inner(self) -> T {
        self.data.data
    }
}

impl<T: Serialize> IntoResponse for ItemResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// List response with its result count
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub status: &'static str,
    /// Number of items in this page
    pub results: usize,
    pub data: DataEnvelope<Vec<T>>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            status: SUCCESS,
            results: data.len(),
            data: DataEnvelope { data },
        }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data.data
    }
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Empty `204 No Content` response for deletions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl IntoResponse for NoContent {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_response_shape() {
        let response = ItemResponse::new(json!({ "name": "The Sea Explorer" }));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "success", "data": { "data": { "name": "The Sea Explorer" } } })
        );
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_item_response_status_override() {
        let response = ItemResponse::new(1).with_status(StatusCode::CREATED);
        assert_eq!(response.into_response().status(), StatusCode::CREATED);
    }

    #[test]
    fn test_list_response_counts_results() {
        let response = ListResponse::new(vec!["a", "b"]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "success", "results": 2, "data": { "data": ["a", "b"] } })
        );
    }

    #[test]
    fn test_no_content() {
        assert_eq!(NoContent.into_response().status(), StatusCode::NO_CONTENT);
    }
}
