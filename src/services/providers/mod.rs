pub mod peach;
pub mod stripe;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use peach::PeachPaymentService;
pub use stripe::StripePaymentService;

/// Provider-independent view of a payment notification. Both gateways decode
/// their webhook payloads into this shape before any ledger logic runs.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEvent {
    pub provider: &'static str,
    pub external_payment_reference: String,
    pub tenant_id: String,
    pub user_id: String,
    pub pass_id: String,
    pub amount_minor_units: Option<i64>,
    pub status: PaymentEventStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventStatus {
    Completed,
    Failed,
}

/// Webhook decoding failures, split by whether the provider should redeliver.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Malformed payload or bad signature; redelivery cannot succeed.
    #[error("{0}")]
    Fatal(String),
    /// Transient condition; the provider should retry.
    #[error("{0}")]
    Retryable(String),
}

/// The transport-independent webhook contract both payment providers
/// implement: verify the signature, then map the payload to a
/// [`PaymentEvent`].
pub trait WebhookDecoder {
    fn provider(&self) -> &'static str;

    /// Name of the HTTP header carrying this provider's signature.
    fn signature_header(&self) -> &'static str;

    fn verify_and_decode(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentEvent, WebhookError>;
}

/// A created checkout session: where to send the shopper, and the reference
/// that will come back on the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub provider: &'static str,
    pub redirect_url: String,
    pub external_payment_reference: String,
}
