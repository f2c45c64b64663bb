//! Hosted checkout
//!
//! The service never handles card data. Booking a tour creates a checkout
//! session with the payment provider and redirects the browser to the
//! session URL; the provider sends the customer back to `success_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::PaymentConfig;
use crate::error::{Error, Result};

/// What the customer is paying for
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    /// Tour id, echoed back as the client reference
    pub reference: String,
    pub customer_email: String,
    pub product_name: String,
    pub description: String,
    pub image_url: Option<String>,
    /// Price in major currency units
    pub price: f64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Price in the smallest currency unit
    pub fn unit_amount(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }

    /// Form fields of a single line item payment session
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let item = "line_items[0]";
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("customer_email".to_string(), self.customer_email.clone()),
            ("client_reference_id".to_string(), self.reference.clone()),
            (format!("{item}[quantity]"), "1".to_string()),
            (
                format!("{item}[price_data][currency]"),
                self.currency.clone(),
            ),
            (
                format!("{item}[price_data][unit_amount]"),
                self.unit_amount().to_string(),
            ),
            (
                format!("{item}[price_data][product_data][name]"),
                self.product_name.clone(),
            ),
            (
                format!("{item}[price_data][product_data][description]"),
                self.description.clone(),
            ),
        ];
        if let Some(image) = &self.image_url {
            fields.push((
                format!("{item}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
        fields
    }
}

/// A created checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page the browser is sent to
    pub url: String,
}

/// Creates hosted checkout sessions
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;
}

/// Stripe Checkout over its REST API
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.api_base)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        if self.secret_key.is_empty() {
            return Err(Error::External(
                "payment.stripe_secret_key is not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.secret_key)
            .form(&request.form_fields())
            .send()
            .await
            .map_err(|e| Error::External(format!("Checkout session request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "Checkout session request failed: {status} - {body}"
            )));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Failed to parse checkout session: {e}")))?;

        tracing::info!(session = %session.id, reference = %request.reference, "checkout session created");
        Ok(session)
    }
}

pub fn gateway_from_config(config: &PaymentConfig) -> Arc<dyn PaymentGateway> {
    Arc::new(StripeGateway::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            reference: "5c88fa8cf4afda39709c2955".to_string(),
            customer_email: "laura@example.com".to_string(),
            product_name: "The Sea Explorer Tour".to_string(),
            description: "Exploring the jaw-dropping US east coast by foot and by boat".to_string(),
            image_url: Some("http://127.0.0.1:3000/img/tours/tour-2-cover.jpg".to_string()),
            price: 497.0,
            currency: "usd".to_string(),
            success_url: "http://127.0.0.1:3000/?tour=1&user=2&price=497".to_string(),
            cancel_url: "http://127.0.0.1:3000/tour/the-sea-explorer".to_string(),
        }
    }

    fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_unit_amount_is_in_cents() {
        assert_eq!(request().unit_amount(), 49_700);
        let fractional = CheckoutRequest {
            price: 19.99,
            ..request()
        };
        assert_eq!(fractional.unit_amount(), 1999);
    }

    #[test]
    fn test_form_fields() {
        let fields = request().form_fields();
        assert_eq!(field(&fields, "mode"), Some("payment"));
        assert_eq!(
            field(&fields, "client_reference_id"),
            Some("5c88fa8cf4afda39709c2955")
        );
        assert_eq!(
            field(&fields, "line_items[0][price_data][unit_amount]"),
            Some("49700")
        );
        assert_eq!(
            field(&fields, "line_items[0][price_data][product_data][name]"),
            Some("The Sea Explorer Tour")
        );
        assert_eq!(field(&fields, "line_items[0][quantity]"), Some("1"));
        assert!(field(&fields, "line_items[0][price_data][product_data][images][0]").is_some());

        let without_image = CheckoutRequest {
            image_url: None,
            ..request()
        };
        assert!(!without_image
            .form_fields()
            .iter()
            .any(|(k, _)| k.contains("images")));
    }

    #[tokio::test]
    async fn test_missing_secret_key_fails_before_network() {
        let gateway = StripeGateway::new(&PaymentConfig::default());
        assert_eq!(
            gateway.sessions_url(),
            "https://api.stripe.com/v1/checkout/sessions"
        );
        let err = gateway.create_checkout_session(request()).await.unwrap_err();
        assert!(matches!(err, Error::External(_)));
    }
}
