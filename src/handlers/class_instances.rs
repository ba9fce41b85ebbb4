use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::class_instance::CancelInstanceRequest;
use crate::services::database::DatabaseService;
use crate::services::schedule::ScheduleService;

#[derive(Debug, Deserialize)]
pub struct ListInstancesQuery {
    pub template_id: Option<String>,
}

#[get("/class-instances")]
pub async fn list_instances(
    ctx: AuthContext,
    db: Data<DatabaseService>,
    query: Query<ListInstancesQuery>,
) -> Result<HttpResponse, ApiError> {
    let instances = db
        .list_instances(&ctx.tenant_id, query.template_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(instances))
}

/// Cancelling twice is fine; the first reason sticks. Existing bookings stay
/// confirmed and members cancel them for a refund on their own schedule.
#[post("/class-instances/{id}/cancel")]
pub async fn cancel_instance(
    ctx: AuthContext,
    config: Data<Config>,
    schedule: Data<ScheduleService>,
    path: Path<String>,
    payload: Json<CancelInstanceRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let instance = schedule
        .cancel_instance(
            &ctx.tenant_id,
            &path.into_inner(),
            payload.into_inner().reason,
        )
        .await?;
    Ok(HttpResponse::Ok().json(instance))
}

/// Administrative hard delete. Bookings on the instance go with it.
#[delete("/class-instances/{id}")]
pub async fn delete_instance(
    ctx: AuthContext,
    config: Data<Config>,
    schedule: Data<ScheduleService>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let bookings_deleted = schedule
        .delete_instance(&ctx.tenant_id, &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "bookings_deleted": bookings_deleted })))
}
