//! Error Normalizer
//!
//! Handlers return [`Error`]; its `IntoResponse` produces a provisional
//! response carrying an [`ErrorReport`] in the response extensions. The
//! [`normalize_errors`] middleware picks the report up and renders the final
//! body for the configured environment and the kind of path:
//!
//! | mode        | `/api/...`                                   | pages                         |
//! |-------------|----------------------------------------------|-------------------------------|
//! | development | `{status, message, error, stack}`            | error page with full message  |
//! | production  | `{status, message}`, unknown errors masked   | error page, unknown masked    |

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::config::Environment;
use crate::error::{Classification, Error};
use crate::templates::{ErrorPage, HtmlTemplate, PageContext};

/// Prefix that marks a request as an API call
pub const API_PREFIX: &str = "/api";

/// Shown on error pages for unknown errors in production
pub const PAGE_FALLBACK_MESSAGE: &str = "Please try again later.";

/// Everything the normalizer needs to know about one failure
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub classification: Classification,
    /// `Display` of the original error
    pub message: String,
    /// `Debug` of the original error
    pub detail: String,
    /// The error followed by its sources
    pub chain: Vec<String>,
}

impl ErrorReport {
    pub fn new(err: &Error) -> Self {
        let mut chain = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            classification: err.classify(),
            message: err.to_string(),
            detail: format!("{err:?}"),
            chain,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.classification.status
    }

    /// Message shown to developers: the tailored one when there is one
    fn development_message(&self) -> &str {
        if self.classification.operational {
            &self.classification.message
        } else {
            &self.message
        }
    }

    pub fn development_body(&self) -> Value {
        let c = &self.classification;
        json!({
            "status": c.status_label(),
            "message": self.development_message(),
            "error": {
                "kind": c.code,
                "statusCode": c.status.as_u16(),
                "isOperational": c.operational,
                "detail": self.detail,
            },
            "stack": self.chain,
        })
    }

    /// Body safe for any client; unknown errors never leak their message
    pub fn production_body(&self) -> Value {
        let c = &self.classification;
        json!({
            "status": c.status_label(),
            "message": c.message,
        })
    }

    fn page_message(&self, environment: Environment) -> &str {
        match environment {
            Environment::Development => self.development_message(),
            Environment::Production if self.classification.operational => {
                &self.classification.message
            }
            Environment::Production => PAGE_FALLBACK_MESSAGE,
        }
    }
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.production_body())).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// Renders reports for one environment
#[derive(Debug, Clone, Copy)]
pub struct ErrorNormalizer {
    environment: Environment,
}

impl ErrorNormalizer {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Final response for a report raised while serving `path`
    pub fn render(&self, report: &ErrorReport, path: &str) -> Response {
        let status = report.status();
        if path.starts_with(API_PREFIX) {
            let body = match self.environment {
                Environment::Development => report.development_body(),
                Environment::Production => report.production_body(),
            };
            return (status, Json(body)).into_response();
        }

        let page = ErrorPage {
            ctx: PageContext::new("Something went wrong!"),
            message: report.page_message(self.environment).to_string(),
        };
        HtmlTemplate::page(page).with_status(status).into_response()
    }
}

/// Middleware finalising every error response
///
/// Failures raised by the framework itself (405, extractor rejections) carry
/// no report and at most a plain-text body; they are rendered from their
/// status alone. Handlers that answer a failure status with their own JSON,
/// such as the readiness probe, pass through.
pub async fn normalize_errors(
    State(normalizer): State<ErrorNormalizer>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let report = match response.extensions().get::<Arc<ErrorReport>>() {
        Some(report) => report.clone(),
        None if raised_by_framework(&response) => {
            Arc::new(ErrorReport::new(&unreported(response.status())))
        }
        None => return response,
    };

    if report.classification.operational {
        tracing::debug!(
            %method,
            path,
            status = report.status().as_u16(),
            message = %report.classification.message,
            "request failed"
        );
    } else {
        tracing::error!(
            %method,
            path,
            kind = report.classification.code,
            chain = ?report.chain,
            "unexpected error"
        );
    }

    let mut rendered = normalizer.render(&report, &path);
    for (name, value) in response.headers() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rendered.headers_mut().append(name, value.clone());
        }
    }
    rendered
}

fn raised_by_framework(response: &Response) -> bool {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return false;
    }
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |v| v.starts_with("text/plain"))
}

/// Error standing in for a failure response produced without one
fn unreported(status: StatusCode) -> Error {
    Error::operational(status, status.canonical_reason().unwrap_or("Request failed"))
}

/// Fallback for unmatched routes
pub async fn route_not_found(uri: Uri) -> Error {
    Error::NotFound(format!("Can not find {} on this server!", uri.path()))
}
