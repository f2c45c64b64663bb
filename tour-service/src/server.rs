//! HTTP server with graceful shutdown

use axum::{
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::{Error, Result},
    handlers::{normalize_errors, route_not_found},
    health::{health, readiness},
    middleware::{
        apply_security_headers, request_id_layer, request_id_propagation_layer,
        sensitive_headers_layer, ApiRateLimit,
    },
    routes::{self, API_BASE},
    state::AppState,
};

/// How often idle rate limit buckets are dropped
const RATE_LIMIT_PRUNE_PERIOD: Duration = Duration::from_secs(600);

/// Server instance
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Bind the configured port and serve until SIGINT or SIGTERM
    pub async fn serve(self) -> Result<()> {
        let config = self.state.config();
        let addr = SocketAddr::from(([0, 0, 0, 0], config.service.port));

        tracing::info!("Starting {} on {}", config.service.name, addr);
        log_middleware_config(config);

        if let Some(limit) = self.state.rate_limit() {
            limit.spawn_pruning(RATE_LIMIT_PRUNE_PERIOD);
        }

        let app = build_router(self.state.clone());
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        // Peer addresses feed the per-client rate limiter
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// The complete application: probes, API, pages, static assets and middleware
///
/// Layers are listed innermost first. Error normalization sits outside every
/// layer that can fail a request, so all error responses share one format.
pub fn build_router(state: AppState) -> Router {
    let config = state.config().clone();

    let mut api = routes::api_router();
    if let Some(limit) = state.rate_limit().cloned() {
        api = api.layer(from_fn_with_state(limit, ApiRateLimit::middleware));
    }

    let assets = ServeDir::new(&config.service.static_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(route_not_found.into_service());

    let app = Router::new()
        .route("/health", get(health))
        .route("/ready", get(readiness))
        .nest(API_BASE, api)
        .merge(routes::views::router())
        .fallback_service(assets)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes()))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.error_normalizer(), normalize_errors));

    apply_security_headers(app, &config.middleware)
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.middleware.cors_mode))
        .layer(TimeoutLayer::with_status_code(
            http::StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.service.timeout_secs),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(sensitive_headers_layer())
        .layer(request_id_propagation_layer())
        .layer(request_id_layer())
        .with_state(state)
}

/// A panicking handler becomes an unknown error
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    Error::Internal(format!("handler panicked: {detail}")).into_response()
}

fn build_cors_layer(mode: &str) -> CorsLayer {
    match mode {
        "permissive" => {
            tracing::debug!("Enabling permissive CORS");
            CorsLayer::permissive()
        }
        "restrictive" => {
            tracing::debug!("Enabling restrictive CORS (default deny)");
            CorsLayer::new()
        }
        "disabled" => {
            tracing::debug!("CORS disabled (using restrictive)");
            CorsLayer::new()
        }
        _ => {
            tracing::warn!("Unknown CORS mode: {}, defaulting to permissive", mode);
            CorsLayer::permissive()
        }
    }
}

fn log_middleware_config(config: &Config) {
    tracing::info!("Middleware configuration:");
    tracing::info!("  - Environment: {}", config.environment());
    tracing::info!("  - Panic recovery: enabled");
    tracing::info!("  - Request ID tracking: enabled");
    tracing::info!("  - Sensitive header masking: enabled");
    tracing::info!("  - Request body limit: {} kB", config.middleware.body_limit_kb);
    tracing::info!("  - Compression: enabled");
    tracing::info!("  - CORS mode: {}", config.middleware.cors_mode);
    tracing::info!("  - Request timeout: {} seconds", config.service.timeout_secs);
    match config.rate_limit.requests_per_hour {
        0 => tracing::info!("  - API rate limiting: disabled"),
        n => tracing::info!("  - API rate limiting: {} req / hour per client", n),
    }
    tracing::info!("  - Static assets: {}", config.service.static_dir.display());
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EmailTemplate;
    use crate::auth::guard::{NOT_LOGGED_IN, NOT_PERMITTED, PASSWORD_CHANGED};
    use crate::error::TOO_MANY_REQUESTS;
    use crate::repository::Repository;
    use crate::resources::{Booking, Tour, User};
    use crate::routes::auth::{RESET_EMAIL_FAILED, RESET_TOKEN_INVALID, WRONG_CREDENTIALS};
    use crate::state::test_support::{state_with, test_config, test_state, FakeGateway, RecordingMailer};
    use crate::store::{document_id, now_timestamp, Document, ReadQuery};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, HeaderMap, Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
        text: String,
    }

    async fn send(app: &Router, request: Request<Body>) -> Reply {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
            text,
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    /// Store a user directly and return its id and a fresh token
    async fn user_with_role(state: &AppState, email: &str, role: &str) -> (String, String) {
        let user = state
            .collection::<User>()
            .create(doc(json!({
                "name": "Test Person",
                "email": email,
                "role": role,
                "password": "pass1234",
                "passwordConfirm": "pass1234"
            })))
            .await
            .unwrap();
        let id = document_id(&user).unwrap().to_string();
        let token = state.jwt().sign(&id).unwrap();
        (id, token)
    }

    async fn forest_hiker(state: &AppState) -> Document {
        state
            .collection::<Tour>()
            .create(doc(json!({
                "name": "The Forest Hiker",
                "duration": 5,
                "maxGroupSize": 25,
                "difficulty": "easy",
                "price": 397,
                "summary": "Breathtaking hike through the Canadian Banff National Park",
                "imageCover": "tour-1-cover.jpg"
            })))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_signup_issues_token_cookie_and_welcome_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = state_with(test_config(), mailer.clone(), Arc::new(FakeGateway::default())).await;
        let app = build_router(state);

        let reply = send(
            &app,
            with_json(
                "POST",
                "/api/v1/users/signup",
                None,
                json!({
                    "name": "Lourdes Browning",
                    "email": "LouLou@Example.com",
                    "password": "pass1234",
                    "passwordConfirm": "pass1234",
                    "role": "admin"
                }),
            ),
        )
        .await;

        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["status"], "success");
        assert!(reply.body["token"].as_str().is_some_and(|t| !t.is_empty()));
        let user = &reply.body["data"]["user"];
        assert_eq!(user["email"], "loulou@example.com");
        assert_eq!(user["role"], "user");
        assert!(user.get("password").is_none());
        assert!(user.get("active").is_none());

        let cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, EmailTemplate::Welcome);
        assert!(sent[0].url.ends_with("/me"));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let state = test_state().await;
        user_with_role(&state, "guide@example.com", "guide").await;
        let app = build_router(state);

        let missing = send(
            &app,
            with_json("POST", "/api/v1/users/login", None, json!({ "email": "guide@example.com" })),
        )
        .await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.body["status"], "fail");

        let wrong = send(
            &app,
            with_json(
                "POST",
                "/api/v1/users/login",
                None,
                json!({ "email": "guide@example.com", "password": "wrongpass" }),
            ),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.body["message"], WRONG_CREDENTIALS);

        let ok = send(
            &app,
            with_json(
                "POST",
                "/api/v1/users/login",
                None,
                json!({ "email": "GUIDE@example.com", "password": "pass1234" }),
            ),
        )
        .await;
        assert_eq!(ok.status, StatusCode::OK);
        assert!(ok.body["token"].is_string());
    }

    #[tokio::test]
    async fn test_missing_required_field_is_a_validation_failure() {
        let state = test_state().await;
        let (_, admin) = user_with_role(&state, "admin@example.com", "admin").await;
        let app = build_router(state);

        let reply = send(
            &app,
            with_json("POST", "/api/v1/tours", Some(&admin), json!({ "name": "The Lonely Tour" })),
        )
        .await;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["status"], "fail");
        let message = reply.body["message"].as_str().unwrap();
        assert!(message.starts_with("Invalid input data: "));
        assert!(message.contains("A tour must have a duration"));
    }

    #[tokio::test]
    async fn test_guard_rejects_missing_and_stale_tokens() {
        let state = test_state().await;
        let (id, _) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state.clone());

        let anonymous = send(&app, get("/api/v1/users/me", None)).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        assert_eq!(anonymous.body["message"], NOT_LOGGED_IN);

        let old_token = state
            .jwt()
            .sign_at(&id, Utc::now() - chrono::Duration::minutes(5))
            .unwrap();
        let mut patch = Document::new();
        patch.insert(User::PASSWORD_CHANGED_AT.into(), json!(now_timestamp()));
        state.collection::<User>().patch_unchecked(&id, patch).await.unwrap();

        let stale = send(&app, get("/api/v1/users/me", Some(&old_token))).await;
        assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
        assert_eq!(stale.body["message"], PASSWORD_CHANGED);

        let fresh = state.jwt().sign(&id).unwrap();
        let me = send(&app, get("/api/v1/users/me", Some(&fresh))).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["data"]["data"]["id"], json!(id));
    }

    #[tokio::test]
    async fn test_token_cookie_authenticates() {
        let state = test_state().await;
        let (_, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let request = Request::builder()
            .uri("/api/v1/users/me")
            .header(header::COOKIE, format!("theme=dark; jwt={token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_roles_are_enforced() {
        let state = test_state().await;
        let tour = forest_hiker(&state).await;
        let tour_id = document_id(&tour).unwrap().to_string();
        let (_, user) = user_with_role(&state, "user@example.com", "user").await;
        let (_, lead) = user_with_role(&state, "lead@example.com", "lead-guide").await;
        let app = build_router(state);

        let uri = format!("/api/v1/tours/{tour_id}");
        let denied = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {user}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.body["message"], NOT_PERMITTED);

        let users = send(&app, get("/api/v1/users", Some(&user))).await;
        assert_eq!(users.status, StatusCode::FORBIDDEN);

        let deleted = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {lead}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        assert!(deleted.text.is_empty());

        let gone = send(&app, get(&uri, None)).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_me_keeps_role_and_rejects_passwords() {
        let state = test_state().await;
        let (_, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let updated = send(
            &app,
            with_json(
                "PATCH",
                "/api/v1/users/updateMe",
                Some(&token),
                json!({ "name": "New Name", "role": "admin" }),
            ),
        )
        .await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.body["data"]["user"]["name"], "New Name");
        assert_eq!(updated.body["data"]["user"]["role"], "user");

        let password = send(
            &app,
            with_json(
                "PATCH",
                "/api/v1/users/updateMe",
                Some(&token),
                json!({ "password": "newpass123" }),
            ),
        )
        .await;
        assert_eq!(password.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            password.body["message"],
            crate::routes::users::PASSWORD_ON_UPDATE_ME
        );
    }

    #[tokio::test]
    async fn test_delete_me_deactivates_account() {
        let state = test_state().await;
        let (id, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state.clone());

        let reply = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/users/deleteMe")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        assert!(state.collection::<User>().find_by_id(&id, &[]).await.unwrap().is_none());
        let after = send(&app, get("/api/v1/users/me", Some(&token))).await;
        assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = state_with(test_config(), mailer.clone(), Arc::new(FakeGateway::default())).await;
        user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let unknown = send(
            &app,
            with_json("POST", "/api/v1/users/forgotPassword", None, json!({ "email": "nobody@example.com" })),
        )
        .await;
        assert_eq!(unknown.status, StatusCode::OK);
        assert!(mailer.sent.lock().unwrap().is_empty());

        let requested = send(
            &app,
            with_json("POST", "/api/v1/users/forgotPassword", None, json!({ "email": "user@example.com" })),
        )
        .await;
        assert_eq!(requested.status, StatusCode::OK);
        assert_eq!(requested.body["message"], unknown.body["message"]);

        let url = {
            let sent = mailer.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].template, EmailTemplate::PasswordReset);
            sent[0].url.clone()
        };
        let token = url.rsplit('/').next().unwrap().to_string();
        let reset_uri = format!("/api/v1/users/resetPassword/{token}");

        let reset = send(
            &app,
            with_json(
                "POST",
                &reset_uri,
                None,
                json!({ "password": "newpass123", "passwordConfirm": "newpass123" }),
            ),
        )
        .await;
        assert_eq!(reset.status, StatusCode::CREATED);
        assert!(reset.body["token"].is_string());

        let reused = send(
            &app,
            with_json(
                "POST",
                &reset_uri,
                None,
                json!({ "password": "other1234", "passwordConfirm": "other1234" }),
            ),
        )
        .await;
        assert_eq!(reused.status, StatusCode::BAD_REQUEST);
        assert_eq!(reused.body["message"], RESET_TOKEN_INVALID);

        let login = send(
            &app,
            with_json(
                "POST",
                "/api/v1/users/login",
                None,
                json!({ "email": "user@example.com", "password": "newpass123" }),
            ),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_email_failure_clears_token() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let state = state_with(test_config(), mailer, Arc::new(FakeGateway::default())).await;
        let (id, _) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state.clone());

        let reply = send(
            &app,
            with_json("POST", "/api/v1/users/forgotPassword", None, json!({ "email": "user@example.com" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body["status"], "error");
        assert_eq!(reply.body["message"], RESET_EMAIL_FAILED);

        let user = state
            .collection::<User>()
            .find_by_id_with_secrets(&id)
            .await
            .unwrap()
            .unwrap();
        assert!(!user.contains_key(User::RESET_TOKEN));
        assert!(!user.contains_key(User::RESET_EXPIRES));
    }

    #[tokio::test]
    async fn test_update_my_password_checks_current_password() {
        let state = test_state().await;
        let (_, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let wrong = send(
            &app,
            with_json(
                "PATCH",
                "/api/v1/users/updateMyPassword",
                Some(&token),
                json!({ "passwordCurrent": "nope12345", "password": "newpass123", "passwordConfirm": "newpass123" }),
            ),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

        let changed = send(
            &app,
            with_json(
                "PATCH",
                "/api/v1/users/updateMyPassword",
                Some(&token),
                json!({ "passwordCurrent": "pass1234", "password": "newpass123", "passwordConfirm": "newpass123" }),
            ),
        )
        .await;
        assert_eq!(changed.status, StatusCode::CREATED);
        let new_token = changed.body["token"].as_str().unwrap().to_string();

        let me = send(&app, get("/api/v1/users/me", Some(&new_token))).await;
        assert_eq!(me.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nested_review_uses_path_and_identity() {
        let state = test_state().await;
        let tour = forest_hiker(&state).await;
        let tour_id = document_id(&tour).unwrap().to_string();
        let (user_id, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let created = send(
            &app,
            with_json(
                "POST",
                &format!("/api/v1/tours/{tour_id}/reviews"),
                Some(&token),
                json!({ "review": "Loved every minute", "rating": 4, "user": "someone-else" }),
            ),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["data"]["data"]["tour"], json!(tour_id));
        assert_eq!(created.body["data"]["data"]["user"]["id"], json!(user_id));

        let listed = send(
            &app,
            get(&format!("/api/v1/tours/{tour_id}/reviews"), Some(&token)),
        )
        .await;
        assert_eq!(listed.body["results"], 1);

        let duplicate = send(
            &app,
            with_json(
                "POST",
                &format!("/api/v1/tours/{tour_id}/reviews"),
                Some(&token),
                json!({ "review": "Again", "rating": 5 }),
            ),
        )
        .await;
        assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);

        let rated = send(&app, get(&format!("/api/v1/tours/{tour_id}"), None)).await;
        assert_eq!(rated.body["data"]["data"]["ratingsQuantity"], 1);
        assert_eq!(rated.body["data"]["data"]["ratingsAverage"], json!(4.0));
        assert_eq!(rated.body["data"]["data"]["reviews"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_session_and_completion() {
        let payments = Arc::new(FakeGateway::default());
        let state = state_with(test_config(), Arc::new(RecordingMailer::default()), payments.clone()).await;
        let tour = forest_hiker(&state).await;
        let tour_id = document_id(&tour).unwrap().to_string();
        let (user_id, token) = user_with_role(&state, "user@example.com", "user").await;
        let (other_id, _) = user_with_role(&state, "other@example.com", "user").await;
        let app = build_router(state.clone());

        let reply = send(
            &app,
            get(&format!("/api/v1/bookings/checkout-session/{tour_id}"), Some(&token)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["session"]["id"], "cs_test_123");

        let success_url = {
            let requests = payments.requests.lock().unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].customer_email, "user@example.com");
            assert_eq!(requests[0].product_name, "The Forest Hiker Tour");
            assert!(requests[0].cancel_url.ends_with("/tour/the-forest-hiker"));
            requests[0].success_url.clone()
        };
        let query = success_url.split_once('?').unwrap().1.to_string();

        let page_request = |query: String| {
            Request::builder()
                .uri(format!("/?{query}"))
                .header(header::COOKIE, format!("jwt={token}"))
                .body(Body::empty())
                .unwrap()
        };

        let forged = send(
            &app,
            page_request(format!("tour={tour_id}&user={other_id}&price=397")),
        )
        .await;
        assert_eq!(forged.status, StatusCode::OK);

        let completed = send(&app, page_request(query)).await;
        assert_eq!(completed.status, StatusCode::SEE_OTHER);
        assert_eq!(completed.headers[header::LOCATION], "/");

        let bookings = state
            .collection::<Booking>()
            .find_all(ReadQuery::default())
            .await
            .unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0]["user"]["id"], json!(user_id));
        assert_eq!(bookings[0]["tour"]["name"], "The Forest Hiker");
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let app = build_router(test_state().await);

        let api = send(&app, get("/api/v1/nothing-here", None)).await;
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.body["status"], "fail");
        assert_eq!(
            api.body["message"],
            "Can not find /api/v1/nothing-here on this server!"
        );

        let page = send(&app, get("/nothing-here", None)).await;
        assert_eq!(page.status, StatusCode::NOT_FOUND);
        assert!(page.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(page.text.contains("Can not find /nothing-here on this server!"));

        let tour = send(&app, get("/tour/no-such-tour", None)).await;
        assert_eq!(tour.status, StatusCode::NOT_FOUND);
        assert!(tour.text.contains(crate::routes::views::NO_SUCH_TOUR));
    }

    #[tokio::test]
    async fn test_invalid_id_is_a_client_error() {
        let app = build_router(test_state().await);
        let reply = send(&app, get("/api/v1/tours/not-an-id", None)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["message"], "Invalid id: not-an-id");
    }

    #[tokio::test]
    async fn test_wrong_method_gets_a_json_envelope() {
        let app = build_router(test_state().await);
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/tours")
            .body(Body::empty())
            .unwrap();

        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(reply.headers.contains_key(header::ALLOW));
        assert!(reply.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        assert_eq!(reply.body["status"], "fail");
        assert_eq!(reply.body["message"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn test_overview_ignores_malformed_checkout_parameters() {
        let state = test_state().await;
        forest_hiker(&state).await;
        let (user_id, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state.clone());

        let request = Request::builder()
            .uri(format!("/?tour=t1&user={user_id}&price=abc"))
            .header(header::COOKIE, format!("jwt={token}"))
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(reply.text.contains("The Forest Hiker"));

        let bookings = state
            .collection::<Booking>()
            .find_all(ReadQuery::default())
            .await
            .unwrap();
        assert!(bookings.is_empty());
    }

    #[tokio::test]
    async fn test_failed_api_calls_keep_rate_limit_headers() {
        let mut config = test_config();
        config.rate_limit.requests_per_hour = 5;
        let state = state_with(config, Arc::new(RecordingMailer::default()), Arc::new(FakeGateway::default())).await;
        let app = build_router(state);

        let reply = send(&app, get("/api/v1/tours/not-an-id", None)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.headers["x-ratelimit-limit"], "5");
        assert_eq!(reply.body["status"], "fail");
    }

    #[tokio::test]
    async fn test_production_hides_error_details() {
        let mut config = test_config();
        config.service.environment = crate::config::Environment::Production;
        config.jwt.secret = "a-production-secret-for-tests".to_string();
        let state = state_with(config, Arc::new(RecordingMailer::default()), Arc::new(FakeGateway::default())).await;
        let app = build_router(state);

        let reply = send(&app, get("/api/v1/users/me", None)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            reply.body,
            json!({ "status": "fail", "message": NOT_LOGGED_IN })
        );
        assert!(!reply.headers.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_rate_limit_per_client() {
        let mut config = test_config();
        config.rate_limit.requests_per_hour = 2;
        let state = state_with(config, Arc::new(RecordingMailer::default()), Arc::new(FakeGateway::default())).await;
        let app = build_router(state);

        let from = |ip: &str| {
            Request::builder()
                .uri("/api/v1/tours")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let reply = send(&app, from("203.0.113.7")).await;
            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(reply.headers["x-ratelimit-limit"], "2");
        }
        let limited = send(&app, from("203.0.113.7")).await;
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.body["message"], TOO_MANY_REQUESTS);

        assert_eq!(send(&app, from("198.51.100.1")).await.status, StatusCode::OK);
        // Pages are not limited
        assert_eq!(send(&app, from_page("203.0.113.7")).await.status, StatusCode::OK);
    }

    fn from_page(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/login")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let app = build_router(test_state().await);
        let padding = "a".repeat(11 * 1024);
        let reply = send(
            &app,
            with_json(
                "POST",
                "/api/v1/users/login",
                None,
                json!({ "email": "user@example.com", "password": padding }),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(reply.body["status"], "fail");
    }

    #[tokio::test]
    async fn test_common_headers_and_probes() {
        let state = test_state().await;
        forest_hiker(&state).await;
        let app = build_router(state);

        let overview = send(&app, get("/", None)).await;
        assert_eq!(overview.status, StatusCode::OK);
        assert!(overview.text.contains("The Forest Hiker"));
        assert_eq!(overview.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(overview.headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert!(overview.headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(overview.headers.contains_key("x-request-id"));

        let health = send(&app, get("/health", None)).await;
        assert_eq!(health.status, StatusCode::OK);
        assert_eq!(health.body["status"], "healthy");

        let ready = send(&app, get("/ready", None)).await;
        assert_eq!(ready.status, StatusCode::OK);
        assert_eq!(ready.body["ready"], true);
        assert_eq!(ready.body["documents"]["tours"], 1);
        assert_eq!(ready.body["documents"]["bookings"], 0);
    }

    #[tokio::test]
    async fn test_top_five_cheap_and_logout() {
        let state = test_state().await;
        forest_hiker(&state).await;
        let app = build_router(state);

        let top = send(&app, get("/api/v1/tours/top-5-cheap", None)).await;
        assert_eq!(top.status, StatusCode::OK);
        let first = &top.body["data"]["data"][0];
        assert_eq!(first["name"], "The Forest Hiker");
        assert!(first.get("description").is_none());
        assert!(first.get("imageCover").is_none());

        let logout = send(&app, get("/api/v1/users/logout", None)).await;
        assert_eq!(logout.status, StatusCode::OK);
        assert!(logout.headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .starts_with("jwt=loggedout"));
    }

    #[tokio::test]
    async fn test_signed_in_pages() {
        let state = test_state().await;
        let (_, token) = user_with_role(&state, "user@example.com", "user").await;
        let app = build_router(state);

        let anonymous = send(&app, get("/me", None)).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        assert!(anonymous.text.contains(NOT_LOGGED_IN));

        let cookie = |uri: &str| {
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, format!("jwt={token}"))
                .body(Body::empty())
                .unwrap()
        };
        let account = send(&app, cookie("/me")).await;
        assert_eq!(account.status, StatusCode::OK);
        assert!(account.text.contains("user@example.com"));
        assert_eq!(account.headers[header::CACHE_CONTROL], "private, no-store");

        let bookings = send(&app, cookie("/my-tours")).await;
        assert_eq!(bookings.status, StatusCode::OK);
        assert!(bookings.text.contains("My Bookings"));
    }
}
