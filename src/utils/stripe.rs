//! Minimal Stripe client: Checkout session creation and webhook signature checks.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::errors::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,
    #[error("Timestamp outside the tolerance zone")]
    Expired,
    #[error("No signatures found matching the expected signature for payload")]
    BadSignature,
    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        AppError::bad_request(format!("Webhook error: {}", err))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// The fields of a completed Checkout session that a booking is built from.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedCheckout {
    pub client_reference_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub amount_total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl CompletedCheckout {
    pub fn email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.customer_details.as_ref().and_then(|d| d.email.as_deref()))
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    pub tour_id: i64,
    pub customer_email: String,
    pub product_name: String,
    pub description: String,
    pub image_url: String,
    /// Price in cents.
    pub unit_amount: i64,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionParams {
    /// Stripe's bracketed form encoding of the session.
    pub fn form(&self) -> Vec<(String, String)> {
        let item = "line_items[0]";
        vec![
            ("payment_method_types[0]".into(), "card".into()),
            ("mode".into(), "payment".into()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            ("customer_email".into(), self.customer_email.clone()),
            ("client_reference_id".into(), self.tour_id.to_string()),
            (format!("{item}[quantity]"), "1".into()),
            (format!("{item}[price_data][currency]"), "usd".into()),
            (format!("{item}[price_data][unit_amount]"), self.unit_amount.to_string()),
            (format!("{item}[price_data][product_data][name]"), self.product_name.clone()),
            (format!("{item}[price_data][product_data][description]"), self.description.clone()),
            (format!("{item}[price_data][product_data][images][0]"), self.image_url.clone()),
        ]
    }
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_checkout_session(&self, params: &CheckoutSessionParams) -> AppResult<Value> {
        if self.secret_key.is_empty() {
            return Err(AppError::internal("STRIPE_SECRET_KEY is not configured"));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params.form())
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            tracing::error!(status = status.as_u16(), %message, "stripe rejected checkout session");
            return Err(AppError::internal(format!("stripe error: {}", message)));
        }
        Ok(body)
    }

    pub fn construct_event(&self, payload: &[u8], signature_header: Option<&str>) -> Result<StripeEvent, WebhookError> {
        construct_event(payload, signature_header, &self.webhook_secret, Utc::now().timestamp())
    }
}

/// Verifies a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=<hex>...]`)
/// and parses the payload.
pub fn construct_event(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    now: i64,
) -> Result<StripeEvent, WebhookError> {
    let header = signature_header.ok_or(WebhookError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    let matched = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });
    if !matched {
        return Err(WebhookError::BadSignature);
    }
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(WebhookError::Expired);
    }

    serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={}", timestamp),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
