use actix_web::web::Data;
use actix_web::{get, HttpResponse};
use serde_json::json;

use crate::error::ApiError;
use crate::services::database::DatabaseService;

#[get("/health")]
pub async fn health_check(db: Data<DatabaseService>) -> Result<HttpResponse, ApiError> {
    db.health_check().await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}
