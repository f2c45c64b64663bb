//! Security headers middleware
//!
//! Applies the content security policy and the usual hardening headers
//! using `tower_http::set_header::SetResponseHeaderLayer`. Handlers that set
//! a header themselves keep their value.

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::MiddlewareConfig;

/// Apply security headers to the router
pub fn apply_security_headers<S>(mut app: Router<S>, config: &MiddlewareConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.content_security_policy.is_empty() {
        match HeaderValue::from_str(&config.content_security_policy) {
            Ok(hv) => {
                app = app.layer(SetResponseHeaderLayer::if_not_present(
                    header::CONTENT_SECURITY_POLICY,
                    hv,
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "content security policy is not a valid header value");
            }
        }
    }

    app.layer(SetResponseHeaderLayer::if_not_present(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ))
    // Modern browsers should not run the legacy XSS auditor
    .layer(SetResponseHeaderLayer::if_not_present(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("0"),
    ))
}
