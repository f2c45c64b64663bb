//! Configuration management using Figment
//!
//! Sources are merged lowest priority first: built-in defaults, the system
//! file (`/etc/tour-service/config.toml`), the XDG user file
//! (`~/.config/tour-service/config.toml`), `./config.toml`, and finally
//! environment variables prefixed with `TOURS_`. Nested keys are separated by
//! a double underscore, e.g. `TOURS_JWT__SECRET` or `TOURS_SERVICE__PORT`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Secret shipped for local development; production refuses to start with it.
pub const DEVELOPMENT_JWT_SECRET: &str = "development-only-secret-change-me-before-deploying";

const ENV_PREFIX: &str = "TOURS_";
const APP_DIR: &str = "tour-service";

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
}

/// Deployment mode; drives error detail exposure and cookie security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub environment: Environment,

    /// Externally reachable base URL used in emails and checkout redirects
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Directory served for static assets (css, js, images)
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret
    pub secret: String,

    /// Token lifetime in seconds
    #[serde(default = "default_jwt_expires_in")]
    pub expires_in_secs: i64,

    /// Lifetime of the `jwt` cookie in days
    #[serde(default = "default_cookie_expires_in_days")]
    pub cookie_expires_in_days: i64,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_memory_cost")]
    pub memory_cost_kib: u32,

    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
        }
    }
}

/// Per-client rate limiting on the API surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client IP per hour; zero disables the limiter
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_hour: default_requests_per_hour(),
        }
    }
}

/// HTTP middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Maximum request body size in kilobytes
    #[serde(default = "default_body_limit_kb")]
    pub body_limit_kb: usize,

    /// CORS mode: "permissive", "restrictive", or "disabled"
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,

    #[serde(default = "default_content_security_policy")]
    pub content_security_policy: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            body_limit_kb: default_body_limit_kb(),
            cors_mode: default_cors_mode(),
            content_security_policy: default_content_security_policy(),
        }
    }
}

/// How outgoing mail leaves the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTransport {
    /// Write rendered messages to the log
    #[default]
    Log,
    /// POST rendered messages to a transactional mail API
    Webhook,
}

/// Outgoing email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_from")]
    pub from: String,

    #[serde(default)]
    pub transport: EmailTransport,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub webhook_token: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: default_email_from(),
            transport: EmailTransport::default(),
            webhook_url: None,
            webhook_token: None,
        }
    }
}

/// Hosted checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default)]
    pub stripe_secret_key: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: String::new(),
            api_base: default_stripe_api_base(),
            currency: default_currency(),
        }
    }
}

fn default_name() -> String {
    APP_DIR.to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_public_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_jwt_expires_in() -> i64 {
    90 * 24 * 60 * 60
}

fn default_cookie_expires_in_days() -> i64 {
    90
}

fn default_memory_cost() -> u32 {
    19_456
}

fn default_time_cost() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

fn default_requests_per_hour() -> u32 {
    100
}

fn default_body_limit_kb() -> usize {
    10
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_content_security_policy() -> String {
    [
        "default-src 'self' https://*.mapbox.com https://*.stripe.com",
        "base-uri 'self'",
        "block-all-mixed-content",
        "font-src 'self' https: data:",
        "frame-src 'self' https://*.stripe.com",
        "frame-ancestors 'self'",
        "img-src 'self' data: blob:",
        "object-src 'none'",
        "script-src 'self' https://*.mapbox.com https://js.stripe.com blob:",
        "style-src 'self' https: 'unsafe-inline'",
        "worker-src 'self' blob:",
        "connect-src 'self' https://*.mapbox.com https://*.stripe.com",
    ]
    .join("; ")
}

fn default_email_from() -> String {
    "Tour Service <hello@tour-service.local>".to_string()
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

impl Config {
    /// Load configuration from the standard locations
    pub fn load() -> Result<Self> {
        let paths = Self::find_config_paths();

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later files override earlier ones
        for path in paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config: Config = figment.merge(Self::env()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Self::env())
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    /// Candidate config files, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc").join(APP_DIR).join("config.toml"));
        paths
    }

    /// Reject settings that are unsafe or unusable
    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.trim().is_empty() {
            return Err(Error::InvalidConfig("jwt.secret must not be empty".to_string()));
        }
        if self.service.environment.is_production() && self.jwt.secret == DEVELOPMENT_JWT_SECRET {
            return Err(Error::InvalidConfig(
                "jwt.secret must be changed before running in production".to_string(),
            ));
        }
        if self.jwt.expires_in_secs <= 0 {
            return Err(Error::InvalidConfig("jwt.expires_in_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn environment(&self) -> Environment {
        self.service.environment
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.middleware.body_limit_kb * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_name(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: Environment::default(),
                public_url: default_public_url(),
                static_dir: default_static_dir(),
            },
            jwt: JwtConfig {
                secret: DEVELOPMENT_JWT_SECRET.to_string(),
                expires_in_secs: default_jwt_expires_in(),
                cookie_expires_in_days: default_cookie_expires_in_days(),
            },
            password: PasswordConfig::default(),
            rate_limit: RateLimitConfig::default(),
            middleware: MiddlewareConfig::default(),
            email: EmailConfig::default(),
            payment: PaymentConfig::default(),
        }
    }
}
