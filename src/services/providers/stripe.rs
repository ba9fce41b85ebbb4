use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{CheckoutConfig, StripeConfig};
use crate::error::ApiError;
use crate::services::providers::{
    CheckoutSession, PaymentEvent, PaymentEventStatus, WebhookDecoder, WebhookError,
};

pub const PROVIDER: &str = "stripe";

/// Seconds a webhook timestamp may lag before the signature is rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe Checkout client. Sessions are created with a form POST against the
/// REST API; webhooks carry a `Stripe-Signature` header of the form
/// `t=<unix>,v1=<hmac>` where the HMAC-SHA256 covers `"<t>.<body>"`.
#[derive(Clone)]
pub struct StripePaymentService {
    client: Client,
    config: StripeConfig,
    checkout: CheckoutConfig,
    currency: String,
}

impl StripePaymentService {
    pub fn new(
        config: StripeConfig,
        checkout: CheckoutConfig,
        currency: String,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            config,
            checkout,
            currency,
        }
    }

    pub async fn create_checkout(
        &self,
        tenant_id: &str,
        user_id: &str,
        pass_key: &str,
        pass_name: &str,
        amount_minor_units: i64,
    ) -> Result<CheckoutSession, ApiError> {
        let reference = format!("TXN_{}", Uuid::new_v4().simple());
        let url = format!("{}/v1/checkout/sessions", self.config.api_url);

        let amount = amount_minor_units.to_string();
        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &self.checkout.success_url),
            ("cancel_url", &self.checkout.cancel_url),
            ("client_reference_id", &reference),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &self.currency),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][price_data][product_data][name]", pass_name),
            ("metadata[tenant_id]", tenant_id),
            ("metadata[user_id]", user_id),
            ("metadata[pass_id]", pass_key),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(map_transport_error)?;

        if !status.is_success() {
            log::warn!("Stripe checkout rejected with status {status}: {body}");
            return Err(ApiError::Internal(format!(
                "Stripe checkout failed with status {status}"
            )));
        }

        let redirect_url = body["url"]
            .as_str()
            .ok_or_else(|| ApiError::Internal("no url in Stripe session response".to_string()))?;

        Ok(CheckoutSession {
            provider: PROVIDER,
            redirect_url: redirect_url.to_string(),
            external_payment_reference: reference,
        })
    }

    fn signature_for(&self, timestamp: &str, body: &[u8]) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify_signature(&self, body: &[u8], header: &str) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut candidate = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value.to_string()),
                Some(("v1", value)) => candidate = Some(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::Fatal("missing timestamp in signature".to_string()))?;
        let candidate = candidate
            .ok_or_else(|| WebhookError::Fatal("missing v1 signature".to_string()))?;

        let age = Utc::now().timestamp()
            - timestamp
                .parse::<i64>()
                .map_err(|_| WebhookError::Fatal("invalid signature timestamp".to_string()))?;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(WebhookError::Fatal(
                "signature timestamp outside tolerance".to_string(),
            ));
        }

        if self.signature_for(&timestamp, body) != candidate {
            return Err(WebhookError::Fatal("invalid webhook signature".to_string()));
        }
        Ok(())
    }
}

impl WebhookDecoder for StripePaymentService {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    fn verify_and_decode(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentEvent, WebhookError> {
        let header =
            signature.ok_or_else(|| WebhookError::Fatal("missing signature header".to_string()))?;
        self.verify_signature(body, header)?;

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::Fatal(format!("malformed webhook payload: {e}")))?;

        let event_type = payload["type"].as_str().unwrap_or_default();
        let status = match event_type {
            "checkout.session.completed" => PaymentEventStatus::Completed,
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                PaymentEventStatus::Failed
            }
            other => {
                return Err(WebhookError::Fatal(format!(
                    "unhandled event type '{other}'"
                )))
            }
        };

        let session = &payload["data"]["object"];
        let reference = session["client_reference_id"]
            .as_str()
            .ok_or_else(|| WebhookError::Fatal("missing client_reference_id".to_string()))?;

        let metadata = &session["metadata"];
        let field = |name: &str| -> Result<String, WebhookError> {
            metadata[name]
                .as_str()
                .map(|v| v.to_string())
                .ok_or_else(|| WebhookError::Fatal(format!("missing metadata.{name}")))
        };

        Ok(PaymentEvent {
            provider: PROVIDER,
            external_payment_reference: reference.to_string(),
            tenant_id: field("tenant_id")?,
            user_id: field("user_id")?,
            pass_id: field("pass_id")?,
            amount_minor_units: session["amount_total"].as_i64(),
            status,
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Internal(format!("Stripe request failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn service() -> StripePaymentService {
        let mut config = Config::default();
        config.stripe.webhook_secret = "whsec_test".to_string();
        StripePaymentService::new(config.stripe, config.checkout, "zar".to_string(), 10)
    }

    fn completed_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "client_reference_id": "TXN_stripe1",
                "amount_total": 30_000,
                "metadata": {
                    "tenant_id": "studio-a",
                    "user_id": "user-1",
                    "pass_id": "pass-1",
                }
            }}
        }))
        .unwrap()
    }

    fn header_for(service: &StripePaymentService, body: &[u8], timestamp: i64) -> String {
        let timestamp = timestamp.to_string();
        let signature = service.signature_for(&timestamp, body);
        format!("t={timestamp},v1={signature}")
    }

    #[test]
    fn test_valid_signature_decodes_event() {
        let service = service();
        let body = completed_payload();
        let header = header_for(&service, &body, Utc::now().timestamp());

        let event = service.verify_and_decode(&body, Some(&header)).unwrap();
        assert_eq!(event.external_payment_reference, "TXN_stripe1");
        assert_eq!(event.status, PaymentEventStatus::Completed);
        assert_eq!(event.amount_minor_units, Some(30_000));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let service = service();
        let body = completed_payload();
        let header = header_for(&service, &body, Utc::now().timestamp() - 600);

        assert!(matches!(
            service.verify_and_decode(&body, Some(&header)),
            Err(WebhookError::Fatal(_))
        ));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let service = service();
        let body = completed_payload();
        let header = header_for(&service, &body, Utc::now().timestamp());

        let mut tampered = body.clone();
        tampered[0] ^= 1;
        assert!(matches!(
            service.verify_and_decode(&tampered, Some(&header)),
            Err(WebhookError::Fatal(_))
        ));
    }

    #[test]
    fn test_unhandled_event_type_is_fatal() {
        let service = service();
        let body = serde_json::to_vec(&json!({
            "type": "invoice.paid",
            "data": { "object": {} }
        }))
        .unwrap();
        let header = header_for(&service, &body, Utc::now().timestamp());

        assert!(matches!(
            service.verify_and_decode(&body, Some(&header)),
            Err(WebhookError::Fatal(_))
        ));
    }
}
