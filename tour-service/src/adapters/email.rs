//! Outgoing email
//!
//! Messages are rendered from the text templates under `templates/email/`
//! and handed to a [`Mailer`]. [`LogMailer`] writes them to the log, which
//! is what development uses; [`WebhookMailer`] posts them to a
//! transactional mail API.

use askama::Template;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmailConfig, EmailTransport};
use crate::error::{Error, Result};

/// Minutes a password reset link stays valid
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Which message to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    Welcome,
    PasswordReset,
}

impl EmailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::PasswordReset => "password_reset",
        }
    }

    pub fn subject(self) -> String {
        match self {
            Self::Welcome => "Welcome to the Tour Service family!".to_string(),
            Self::PasswordReset => format!(
                "Your password reset token (valid for only {RESET_TOKEN_TTL_MINUTES} minutes)"
            ),
        }
    }
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeText<'a> {
    first_name: &'a str,
    url: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    first_name: &'a str,
    url: &'a str,
    valid_minutes: i64,
}

/// A message addressed to one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub template: EmailTemplate,
    pub first_name: String,
    /// Link the message points the reader to
    pub url: String,
}

impl Email {
    /// Address a message to a user, greeting them by their first name
    pub fn new(
        template: EmailTemplate,
        to: impl Into<String>,
        name: &str,
        url: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            template,
            first_name: name.split_whitespace().next().unwrap_or(name).to_string(),
            url: url.into(),
        }
    }

    /// Subject and plain text body
    pub fn render(&self) -> Result<RenderedEmail> {
        let text = match self.template {
            EmailTemplate::Welcome => WelcomeText {
                first_name: &self.first_name,
                url: &self.url,
            }
            .render()?,
            EmailTemplate::PasswordReset => PasswordResetText {
                first_name: &self.first_name,
                url: &self.url,
                valid_minutes: RESET_TOKEN_TTL_MINUTES,
            }
            .render()?,
        };

        Ok(RenderedEmail {
            to: self.to.clone(),
            subject: self.template.subject(),
            text,
        })
    }
}

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Delivers rendered messages
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let rendered = email.render()?;
        tracing::info!(
            from = %self.from,
            to = %rendered.to,
            template = email.template.name(),
            subject = %rendered.subject,
            body = %rendered.text,
            "email delivered to log"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    message: &'a RenderedEmail,
    template: &'static str,
}

/// Posts messages as JSON to a transactional mail API
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            token,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let rendered = email.render()?;
        let payload = WebhookPayload {
            from: &self.from,
            message: &rendered,
            template: email.template.name(),
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::External(format!("Mail webhook request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "Mail webhook returned {status}: {body}"
            )));
        }

        tracing::debug!(to = %rendered.to, template = email.template.name(), "email sent");
        Ok(())
    }
}

/// Build the mailer selected by the configuration
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    match config.transport {
        EmailTransport::Log => Ok(Arc::new(LogMailer::new(&config.from))),
        EmailTransport::Webhook => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                Error::InvalidConfig("email.webhook_url is required for the webhook transport".into())
            })?;
            Ok(Arc::new(WebhookMailer::new(
                url,
                config.webhook_token.clone(),
                &config.from,
            )))
        }
    }
}
