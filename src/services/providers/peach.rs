use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{CheckoutConfig, PeachConfig};
use crate::error::ApiError;
use crate::services::providers::{
    CheckoutSession, PaymentEvent, PaymentEventStatus, WebhookDecoder, WebhookError,
};

pub const PROVIDER: &str = "peach";

/// Peach Payments hosted-checkout client: OAuth token first, then a checkout
/// call that returns a redirect URL. Webhooks are verified with HMAC-SHA256
/// over the raw body.
#[derive(Clone)]
pub struct PeachPaymentService {
    client: Client,
    config: PeachConfig,
    checkout: CheckoutConfig,
    currency: String,
}

impl PeachPaymentService {
    pub fn new(
        config: PeachConfig,
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

    async fn get_oauth_token(&self) -> Result<String, ApiError> {
        let payload = json!({
            "clientId": self.config.client_id,
            "clientSecret": self.config.client_secret,
            "merchantId": self.config.merchant_id,
        });

        let response = self
            .client
            .post(&self.config.auth_service_url)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(ApiError::Internal(format!(
                "Peach OAuth failed with status {status}"
            )));
        }

        body["access_token"]
            .as_str()
            .map(|token| token.to_string())
            .ok_or_else(|| ApiError::Internal("no access_token in Peach response".to_string()))
    }

    /// Creates a hosted checkout for a pass purchase. The tenant, user and
    /// pass travel in `customParameters` and come back on the webhook, so no
    /// pending-payment record is needed on our side.
    pub async fn create_checkout(
        &self,
        tenant_id: &str,
        user_id: &str,
        pass_key: &str,
        amount_minor_units: i64,
    ) -> Result<CheckoutSession, ApiError> {
        let token = self.get_oauth_token().await?;
        let reference = format!("TXN_{}", Uuid::new_v4().simple());

        let payload = json!({
            "authentication": { "entityId": self.config.entity_id },
            "amount": format_major_units(amount_minor_units),
            "currency": self.currency,
            "merchantTransactionId": reference,
            "paymentType": "DB",
            "nonce": Uuid::new_v4().to_string(),
            "customer": { "merchantCustomerId": user_id },
            "customParameters": {
                "tenant_id": tenant_id,
                "user_id": user_id,
                "pass_id": pass_key,
            },
            "notificationUrl": self.config.notification_url,
            "shopperResultUrl": self.checkout.success_url,
            "cancelUrl": self.checkout.cancel_url,
        });

        let response = self
            .client
            .post(&self.config.checkout_endpoint)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(map_transport_error)?;

        if !status.is_success() {
            log::warn!("Peach checkout rejected with status {status}: {body}");
            return Err(ApiError::Internal(format!(
                "Peach checkout failed with status {status}"
            )));
        }

        let redirect_url = body["redirectUrl"]
            .as_str()
            .or_else(|| body["checkoutUrl"].as_str())
            .ok_or_else(|| ApiError::Internal("no redirect URL in Peach response".to_string()))?;

        Ok(CheckoutSession {
            provider: PROVIDER,
            redirect_url: redirect_url.to_string(),
            external_payment_reference: reference,
        })
    }

    fn calculate_signature(&self, body: &[u8]) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl WebhookDecoder for PeachPaymentService {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn signature_header(&self) -> &'static str {
        "x-webhook-signature"
    }

    fn verify_and_decode(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentEvent, WebhookError> {
        let signature =
            signature.ok_or_else(|| WebhookError::Fatal("missing signature header".to_string()))?;
        if self.calculate_signature(body) != signature {
            return Err(WebhookError::Fatal("invalid webhook signature".to_string()));
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| WebhookError::Fatal(format!("malformed webhook payload: {e}")))?;

        let reference = payload["merchantTransactionId"]
            .as_str()
            .ok_or_else(|| WebhookError::Fatal("missing merchantTransactionId".to_string()))?;

        let custom = &payload["customParameters"];
        let field = |name: &str| -> Result<String, WebhookError> {
            custom[name]
                .as_str()
                .map(|v| v.to_string())
                .ok_or_else(|| WebhookError::Fatal(format!("missing customParameters.{name}")))
        };

        // Peach encodes the outcome in a dotted result code; 000.000/000.100
        // families are approved transactions.
        let code = payload["result"]["code"].as_str().unwrap_or_default();
        let status = if code.starts_with("000.000") || code.starts_with("000.100") {
            PaymentEventStatus::Completed
        } else {
            PaymentEventStatus::Failed
        };

        let amount_minor_units = payload["amount"]
            .as_str()
            .and_then(parse_major_units)
            .or_else(|| payload["amount"].as_f64().map(|a| (a * 100.0).round() as i64));

        Ok(PaymentEvent {
            provider: PROVIDER,
            external_payment_reference: reference.to_string(),
            tenant_id: field("tenant_id")?,
            user_id: field("user_id")?,
            pass_id: field("pass_id")?,
            amount_minor_units,
            status,
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Internal(format!("Peach request failed: {error}"))
    }
}

fn format_major_units(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

fn parse_major_units(amount: &str) -> Option<i64> {
    let parsed: f64 = amount.parse().ok()?;
    Some((parsed * 100.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn service() -> PeachPaymentService {
        let mut config = Config::default();
        config.peach.webhook_secret = "peach-secret".to_string();
        PeachPaymentService::new(config.peach, config.checkout, "ZAR".to_string(), 10)
    }

    fn completed_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "merchantTransactionId": "TXN_abc",
            "amount": "300.00",
            "result": { "code": "000.000.000", "description": "approved" },
            "customParameters": {
                "tenant_id": "studio-a",
                "user_id": "user-1",
                "pass_id": "pass-1",
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_signature_decodes_event() {
        let service = service();
        let body = completed_payload();
        let signature = service.calculate_signature(&body);

        let event = service
            .verify_and_decode(&body, Some(&signature))
            .unwrap();
        assert_eq!(event.external_payment_reference, "TXN_abc");
        assert_eq!(event.tenant_id, "studio-a");
        assert_eq!(event.status, PaymentEventStatus::Completed);
        assert_eq!(event.amount_minor_units, Some(30_000));
    }

    #[test]
    fn test_bad_signature_is_fatal() {
        let service = service();
        let body = completed_payload();
        let result = service.verify_and_decode(&body, Some("deadbeef"));
        assert!(matches!(result, Err(WebhookError::Fatal(_))));
    }

    #[test]
    fn test_missing_signature_is_fatal() {
        let service = service();
        let body = completed_payload();
        assert!(matches!(
            service.verify_and_decode(&body, None),
            Err(WebhookError::Fatal(_))
        ));
    }

    #[test]
    fn test_declined_code_maps_to_failed() {
        let service = service();
        let body = serde_json::to_vec(&json!({
            "merchantTransactionId": "TXN_declined",
            "result": { "code": "800.100.153", "description": "declined" },
            "customParameters": {
                "tenant_id": "studio-a",
                "user_id": "user-1",
                "pass_id": "pass-1",
            }
        }))
        .unwrap();
        let signature = service.calculate_signature(&body);

        let event = service.verify_and_decode(&body, Some(&signature)).unwrap();
        assert_eq!(event.status, PaymentEventStatus::Failed);
    }

    #[test]
    fn test_amount_formatting_round_trip() {
        assert_eq!(format_major_units(30_000), "300.00");
        assert_eq!(format_major_units(12_345), "123.45");
        assert_eq!(parse_major_units("123.45"), Some(12_345));
    }
}
