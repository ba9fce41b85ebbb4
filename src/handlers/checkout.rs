use actix_web::web::{Data, Json, Path};
use actix_web::{post, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::services::database::DatabaseService;
use crate::services::providers::{PeachPaymentService, StripePaymentService};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Which gateway to pay through: "peach" or "stripe".
    pub provider: String,
}

/// Starts a hosted checkout for a pass purchase. The response carries the
/// redirect URL; the purchase itself lands later via the provider's webhook.
#[post("/passes/{id}/checkout")]
pub async fn create_checkout(
    ctx: AuthContext,
    db: Data<DatabaseService>,
    peach: Data<PeachPaymentService>,
    stripe: Data<StripePaymentService>,
    path: Path<String>,
    payload: Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let pass_key = path.into_inner();
    let pass = db
        .get_pass(&ctx.tenant_id, &pass_key)
        .await?
        .ok_or(ApiError::NotFound("Pass"))?;

    if !pass.is_active {
        return Err(ApiError::Validation(
            "Pass is no longer offered for sale".to_string(),
        ));
    }

    let session = match payload.provider.as_str() {
        "peach" => {
            peach
                .create_checkout(
                    &ctx.tenant_id,
                    &ctx.user_id,
                    &pass_key,
                    pass.price_minor_units,
                )
                .await?
        }
        "stripe" => {
            stripe
                .create_checkout(
                    &ctx.tenant_id,
                    &ctx.user_id,
                    &pass_key,
                    &pass.name,
                    pass.price_minor_units,
                )
                .await?
        }
        other => {
            return Err(ApiError::Validation(format!(
                "Unknown payment provider '{other}'"
            )))
        }
    };

    log::info!(
        "checkout {} created via {} for user {} on pass {}",
        session.external_payment_reference,
        session.provider,
        ctx.user_id,
        pass_key
    );
    Ok(HttpResponse::Ok().json(session))
}
