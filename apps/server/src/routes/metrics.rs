use actix_web::{HttpResponse, get, web};
use nimbus_prober::metrics::{EXPOSITION_CONTENT_TYPE, SnapshotScope};

use crate::error::ApiError;
use crate::state::{AppState, Caller};

macros_utils::routes! {
    route exposition,
    route summary,
}

/// Scrape endpoint covering every service
#[get("/metrics")]
pub async fn exposition(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let text = state.nimbus.aggregator.render_exposition(SnapshotScope::All).await?;

    Ok(HttpResponse::Ok().content_type(EXPOSITION_CONTENT_TYPE).body(text))
}

/// Structured snapshot, limited to the caller's services when one is known
#[get("/metrics/summary")]
pub async fn summary(state: web::Data<AppState>, caller: Option<Caller>) -> Result<HttpResponse, ApiError> {
    let scope = caller.map_or(SnapshotScope::All, |Caller(user_id)| SnapshotScope::User(user_id));
    let snapshot = state.nimbus.aggregator.snapshot(scope).await?;

    Ok(HttpResponse::Ok().json(snapshot))
}
