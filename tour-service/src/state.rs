//! Application state management

use std::sync::Arc;

use crate::adapters::{gateway_from_config, mailer_from_config, Mailer, PaymentGateway};
use crate::auth::{JwtKeys, PasswordHasher};
use crate::config::Config;
use crate::error::Result;
use crate::handlers::error::ErrorNormalizer;
use crate::handlers::HandlerFactory;
use crate::middleware::ApiRateLimit;
use crate::repository::{Collection, Resource};
use crate::resources::{Booking, Review, Tour, User};
use crate::store::{DocumentStore, MemoryStore};

/// Application state shared across handlers
///
/// Cloning is cheap; every member is reference counted.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    jwt: JwtKeys,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    payments: Arc<dyn PaymentGateway>,
    errors: ErrorNormalizer,
    rate_limit: Option<ApiRateLimit>,
}

impl AppState {
    /// Create a new builder for AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn jwt(&self) -> &JwtKeys {
        &self.jwt
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub fn payments(&self) -> &dyn PaymentGateway {
        self.payments.as_ref()
    }

    pub fn error_normalizer(&self) -> ErrorNormalizer {
        self.errors
    }

    /// Per-client API limiter; `None` when rate limiting is disabled
    pub fn rate_limit(&self) -> Option<&ApiRateLimit> {
        self.rate_limit.as_ref()
    }

    /// Cookies carry the `Secure` flag in production only
    pub fn secure_cookies(&self) -> bool {
        self.config.environment().is_production()
    }

    /// Typed access to one resource collection
    pub fn collection<R: Resource>(&self) -> Collection<R> {
        Collection::new(self.store.clone(), self.hasher.clone())
    }

    /// CRUD handlers for one resource
    pub fn factory<R: Resource>(&self) -> HandlerFactory<Collection<R>> {
        HandlerFactory::new(self.collection::<R>())
    }

    /// Register the unique indexes of every resource
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection::<Tour>().ensure_indexes().await?;
        self.collection::<User>().ensure_indexes().await?;
        self.collection::<Review>().ensure_indexes().await?;
        self.collection::<Booking>().ensure_indexes().await?;
        Ok(())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.config.service.name)
            .field("environment", &self.config.environment())
            .field("jwt", &self.jwt)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

/// Builder for AppState
///
/// Collaborators that are not set explicitly are built from the
/// configuration: an in-memory store, the configured mail transport and the
/// Stripe checkout gateway.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn DocumentStore>>,
    mailer: Option<Arc<dyn Mailer>>,
    payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document store
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the mail transport
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Set the checkout gateway
    pub fn payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Build the AppState and register the store indexes
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mailer = match self.mailer {
            Some(mailer) => mailer,
            None => mailer_from_config(&config.email)?,
        };
        let payments = self
            .payments
            .unwrap_or_else(|| gateway_from_config(&config.payment));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let state = AppState {
            jwt: JwtKeys::new(&config.jwt),
            hasher: PasswordHasher::new(&config.password)?,
            errors: ErrorNormalizer::new(config.environment()),
            rate_limit: ApiRateLimit::per_hour(config.rate_limit.requests_per_hour),
            config: Arc::new(config),
            store,
            mailer,
            payments,
        };
        state.ensure_indexes().await?;

        tracing::debug!(state = ?state, "application state ready");
        Ok(state)
    }
}
