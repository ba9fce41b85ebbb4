use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::Utc;
use validator::Validate;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::pass::{CreatePassRequest, PassDefinition, UpdatePassRequest};
use crate::services::database::DatabaseService;

/// Active passes a member can buy, cheapest first.
#[get("/passes")]
pub async fn list_passes(
    ctx: AuthContext,
    db: Data<DatabaseService>,
) -> Result<HttpResponse, ApiError> {
    let passes = db.list_active_passes(&ctx.tenant_id).await?;
    Ok(HttpResponse::Ok().json(passes))
}

#[get("/passes/{id}")]
pub async fn get_pass(
    ctx: AuthContext,
    db: Data<DatabaseService>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    let pass = db
        .get_pass(&ctx.tenant_id, &path.into_inner())
        .await?
        .ok_or(ApiError::NotFound("Pass"))?;
    Ok(HttpResponse::Ok().json(pass))
}

#[post("/passes")]
pub async fn create_pass(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    payload: Json<CreatePassRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let request = payload.into_inner();
    request.validate()?;

    let pass = PassDefinition::new(ctx.tenant_id.clone(), request);
    pass.check_rules(Utc::now()).map_err(ApiError::Validation)?;

    let created = db.create_pass(&pass).await?;
    Ok(HttpResponse::Created().json(created))
}

#[put("/passes/{id}")]
pub async fn update_pass(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    path: Path<String>,
    payload: Json<UpdatePassRequest>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    let request = payload.into_inner();
    request.validate()?;

    let key = path.into_inner();
    let mut pass = db
        .get_pass(&ctx.tenant_id, &key)
        .await?
        .ok_or(ApiError::NotFound("Pass"))?;

    pass.apply_update(request);
    pass.check_rules(Utc::now()).map_err(ApiError::Validation)?;

    let updated = db.replace_pass(&key, &pass).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Hard delete, refused while any active subscription still references the
/// pass. Deactivation via PUT is the soft alternative.
#[delete("/passes/{id}")]
pub async fn delete_pass(
    ctx: AuthContext,
    config: Data<Config>,
    db: Data<DatabaseService>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    ctx.require_staff(&config)?;
    db.delete_pass(&ctx.tenant_id, &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
