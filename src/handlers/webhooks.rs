use actix_web::web::{Bytes, Data, Path};
use actix_web::{post, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::ApiError;
use crate::services::providers::{
    PeachPaymentService, StripePaymentService, WebhookDecoder, WebhookError,
};
use crate::services::reconciliation::PaymentReconciliation;

/// Payment notifications from the gateways. Signature verification runs over
/// the raw body before anything is parsed. The response status steers
/// redelivery: 2xx acknowledges, 4xx tells the provider to stop retrying,
/// 5xx asks for another attempt.
#[post("/webhooks/payment/{provider}")]
pub async fn payment_webhook(
    req: HttpRequest,
    peach: Data<PeachPaymentService>,
    stripe: Data<StripePaymentService>,
    reconciliation: Data<PaymentReconciliation>,
    path: Path<String>,
    body: Bytes,
) -> Result<HttpResponse, ApiError> {
    let provider = path.into_inner();
    let decoder: &dyn WebhookDecoder = match provider.as_str() {
        "peach" => peach.get_ref(),
        "stripe" => stripe.get_ref(),
        _ => return Err(ApiError::NotFound("Payment provider")),
    };

    let signature = req
        .headers()
        .get(decoder.signature_header())
        .and_then(|value| value.to_str().ok());

    let event = decoder
        .verify_and_decode(&body, signature)
        .map_err(|error| match error {
            WebhookError::Fatal(message) => {
                log::warn!("{provider} webhook rejected: {message}");
                ApiError::Validation(format!("Webhook rejected: {message}"))
            }
            WebhookError::Retryable(message) => ApiError::Internal(message),
        })?;

    match reconciliation.handle(&event).await {
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "received": true }))),
        // Store or transport trouble: ask the provider to redeliver.
        Err(error) if error.is_retryable() => Err(error),
        // Anything else cannot succeed on retry; answer 400 so the provider
        // stops, and keep the reason in the logs for the operator.
        Err(error) => {
            log::warn!(
                "{} payment {} not applied: {error}",
                event.provider,
                event.external_payment_reference
            );
            Err(ApiError::Validation(format!(
                "Payment event rejected: {error}"
            )))
        }
    }
}
