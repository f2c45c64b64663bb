//! Wrappers around external services: mail delivery and hosted checkout

pub mod email;
pub mod payment;

pub use email::{mailer_from_config, Email, EmailTemplate, LogMailer, Mailer, WebhookMailer};
pub use payment::{
    gateway_from_config, CheckoutRequest, CheckoutSession, PaymentGateway, StripeGateway,
};
