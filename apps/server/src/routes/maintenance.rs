use actix_web::{HttpResponse, post, web};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route retention_sweep,
}

#[derive(Debug, Deserialize)]
pub struct RetentionQuery {
    days: Option<i64>,
}

/// Prune the status log, defaulting to the configured retention window
#[post("/maintenance/retention")]
pub async fn retention_sweep(
    state: web::Data<AppState>,
    query: web::Query<RetentionQuery>,
) -> Result<HttpResponse, ApiError> {
    let days = query.days.unwrap_or(state.nimbus.config.retention.days);
    let deleted = state.nimbus.retention().sweep(days).await?;

    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}
