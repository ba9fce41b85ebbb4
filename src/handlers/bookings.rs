use actix_web::web::{Data, Json, Path};
use actix_web::{post, HttpResponse};
use validator::Validate;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::booking::CreateBookingRequest;
use crate::services::booking::BookingEngine;
use crate::services::database::DatabaseService;

/// Books a seat for the authenticated user on their own subscription.
#[post("/bookings")]
pub async fn create_booking(
    ctx: AuthContext,
    engine: Data<BookingEngine>,
    payload: Json<CreateBookingRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    request.validate()?;

    let booking = engine
        .book(
            &ctx.tenant_id,
            &ctx.user_id,
            &request.class_instance_id,
            &request.subscription_id,
        )
        .await?;
    Ok(HttpResponse::Created().json(booking))
}

/// Idempotent: cancelling an already-cancelled booking returns it unchanged
/// without touching the seat count or credits again.
#[post("/bookings/{id}/cancel")]
pub async fn cancel_booking(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    engine: Data<BookingEngine>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    let booking = db
        .get_booking(&ctx.tenant_id, &key)
        .await?
        .ok_or(ApiError::NotFound("Booking"))?;

    if booking.user_id != ctx.user_id && ctx.require_staff(&config).is_err() {
        return Err(ApiError::NotFound("Booking"));
    }

    let cancelled = engine.cancel_booking(&ctx.tenant_id, &key).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}
