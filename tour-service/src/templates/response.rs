//! Template response wrapper

use askama::Template;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};

use crate::error::Error;

/// Cache policy for pages that show one user's data
const PRIVATE_CACHE: &str = "private, no-store";

/// Renders an askama template as an HTML response
///
/// ```rust,ignore
/// async fn login_form(user: MaybeUser) -> impl IntoResponse {
///     HtmlTemplate::page(LoginPage { ctx: PageContext::new("Log into your account") })
/// }
/// ```
pub struct HtmlTemplate<T: Template> {
    template: T,
    status: StatusCode,
    private: bool,
}

impl<T: Template> HtmlTemplate<T> {
    /// A page any visitor may see
    #[must_use]
    pub fn page(template: T) -> Self {
        Self {
            template,
            status: StatusCode::OK,
            private: false,
        }
    }

    /// A page for the signed-in user only; never stored by caches
    #[must_use]
    pub fn private(template: T) -> Self {
        Self {
            private: true,
            ..Self::page(template)
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        let html = match self.template.render() {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(error = %err, "template rendering failed");
                return Error::from(err).into_response();
            }
        };

        let mut response = (self.status, Html(html)).into_response();
        if self.private {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static(PRIVATE_CACHE));
        }
        response
    }
}
