use actix_web::web::{Data, Json, Path};
use actix_web::{post, HttpResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::class_instance::CancelInstanceRequest;
use crate::models::class_template::{ClassTemplate, CreateClassTemplateRequest};
use crate::services::database::DatabaseService;
use crate::services::schedule::ScheduleService;

#[post("/class-templates")]
pub async fn create_template(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    payload: Json<CreateClassTemplateRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let request = payload.into_inner();
    request.validate()?;

    let template = ClassTemplate::new(ctx.tenant_id.clone(), request);
    template.check_rules().map_err(ApiError::Validation)?;

    let created = db.create_template(&template).await?;
    Ok(HttpResponse::Created().json(created))
}

/// Materializes the template's occurrences as bookable instances.
#[post("/class-templates/{id}/instances/generate")]
pub async fn generate_instances(
    ctx: AuthContext,
    config: Data<Config>,
    schedule: Data<ScheduleService>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let instances = schedule
        .generate_instances(&ctx.tenant_id, &path.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "instances_created": instances.len(),
        "instances": instances,
    })))
}

/// Cancels every future, still-scheduled instance of a template in one sweep.
/// Past instances keep their history.
#[post("/class-templates/{id}/cancel-series")]
pub async fn cancel_series(
    ctx: AuthContext,
    config: Data<Config>,
    schedule: Data<ScheduleService>,
    path: Path<String>,
    payload: Json<CancelInstanceRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let cancelled = schedule
        .cancel_series(
            &ctx.tenant_id,
            &path.into_inner(),
            payload.into_inner().reason,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "instances_cancelled": cancelled.len(),
        "instances": cancelled,
    })))
}
