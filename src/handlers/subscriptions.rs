use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::subscription::CreateSubscriptionRequest;
use crate::services::database::DatabaseService;
use crate::services::ledger::SubscriptionLedger;

/// Manual reconciliation surface for payments confirmed out of band. The
/// unique payment reference makes retries converge: a reused reference is a
/// conflict, not a second subscription.
#[post("/passes/{id}/subscriptions")]
pub async fn create_subscription(
    ctx: AuthContext,
    config: Data<Config>,
    ledger: Data<SubscriptionLedger>,
    path: Path<String>,
    payload: Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let request = payload.into_inner();
    request.validate()?;

    let subscription = ledger
        .create_from_payment(
            &ctx.tenant_id,
            &request.user_id,
            &path.into_inner(),
            &request.external_payment_reference,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Created().json(subscription))
}

#[get("/subscriptions/{id}")]
pub async fn get_subscription_status(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    let subscription = db
        .get_subscription(&ctx.tenant_id, &path.into_inner())
        .await?
        .ok_or(ApiError::NotFound("Subscription"))?;

    if subscription.user_id != ctx.user_id && ctx.require_staff(&config).is_err() {
        return Err(ApiError::NotFound("Subscription"));
    }

    Ok(HttpResponse::Ok().json(subscription.to_status_response(Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub user_id: Option<String>,
}

/// A user's subscriptions, newest first. Members see their own; querying
/// another user takes the staff role.
#[get("/subscriptions")]
pub async fn list_subscriptions(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    query: Query<ListSubscriptionsQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match &query.user_id {
        Some(user_id) if *user_id != ctx.user_id => {
            ctx.require_staff(&config)?;
            user_id.clone()
        }
        _ => ctx.user_id.clone(),
    };

    let now = Utc::now();
    let subscriptions: Vec<_> = db
        .list_subscriptions_for_user(&ctx.tenant_id, &user_id)
        .await?
        .iter()
        .map(|sub| sub.to_status_response(now))
        .collect();
    Ok(HttpResponse::Ok().json(subscriptions))
}
