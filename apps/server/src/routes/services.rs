use actix_web::{HttpResponse, get, post, web};
use nimbus_prober::metrics::{ActivityLimit, BucketWidth, TimeRange};
use nimbus_prober::monitoring::ServiceId;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::{AppState, Caller};

macros_utils::routes! {
    route check_service,
    route service_activity,
    route service_report,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    range: Option<String>,
    bucket: Option<i64>,
}

/// Probe a service now and return the recorded outcome
#[post("/services/{id}/check")]
pub async fn check_service(
    state: web::Data<AppState>,
    path: web::Path<ServiceId>,
    caller: Caller,
) -> Result<HttpResponse, ApiError> {
    let service = state.owned_service(path.into_inner(), &caller).await?;
    let outcome = state.nimbus.checker.check(&service, &state.nimbus.probe_deadline()).await?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/services/{id}/activity")]
pub async fn service_activity(
    state: web::Data<AppState>,
    path: web::Path<ServiceId>,
    query: web::Query<ActivityQuery>,
    caller: Caller,
) -> Result<HttpResponse, ApiError> {
    let service = state.owned_service(path.into_inner(), &caller).await?;
    let entries = state
        .nimbus
        .aggregator
        .recent_activity(service.id, ActivityLimit::clamped(query.limit))
        .await?;

    Ok(HttpResponse::Ok().json(entries))
}

#[get("/services/{id}/report")]
pub async fn service_report(
    state: web::Data<AppState>,
    path: web::Path<ServiceId>,
    query: web::Query<ReportQuery>,
    caller: Caller,
) -> Result<HttpResponse, ApiError> {
    // reject bad parameters before touching the store
    let range = TimeRange::parse_or_default(query.range.as_deref())?;
    let bucket = BucketWidth::parse_or_default(query.bucket)?;

    let service = state.owned_service(path.into_inner(), &caller).await?;
    let report = state.nimbus.aggregator.service_report(service.id, range, bucket).await?;

    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::Value;

    use crate::routes::test_support::TestApp;

    #[actix_web::test]
    async fn test_check_records_outcome_for_owner() {
        let fixture = TestApp::new().await;
        let id = fixture.seed_service(7, "http://127.0.0.1:1/").await;
        let app = test::init_service(App::new().app_data(fixture.state()).configure(crate::routes::routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/services/{id}/check"))
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["service_id"], id);
        assert_eq!(body["status"], "offline");
        assert!(body["response_time_ms"].is_i64());
    }

    #[actix_web::test]
    async fn test_check_enforces_ownership() {
        let fixture = TestApp::new().await;
        let id = fixture.seed_service(7, "http://127.0.0.1:1/").await;
        let app = test::init_service(App::new().app_data(fixture.state()).configure(crate::routes::routes)).await;

        let foreign = test::TestRequest::post()
            .uri(&format!("/services/{id}/check"))
            .insert_header(("X-User-Id", "8"))
            .to_request();
        let anonymous = test::TestRequest::post().uri(&format!("/services/{id}/check")).to_request();
        let missing = test::TestRequest::post()
            .uri("/services/9999/check")
            .insert_header(("X-User-Id", "7"))
            .to_request();

        assert_eq!(test::call_service(&app, foreign).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(test::call_service(&app, anonymous).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_report_validates_parameters() {
        let fixture = TestApp::new().await;
        let id = fixture.seed_service(7, "http://a.example").await;
        let app = test::init_service(App::new().app_data(fixture.state()).configure(crate::routes::routes)).await;

        let bad_range = test::TestRequest::get()
            .uri(&format!("/services/{id}/report?range=2w"))
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let bad_bucket = test::TestRequest::get()
            .uri(&format!("/services/{id}/report?bucket=0"))
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let ok = test::TestRequest::get()
            .uri(&format!("/services/{id}/report?range=7d&bucket=60"))
            .insert_header(("X-User-Id", "7"))
            .to_request();

        assert_eq!(test::call_service(&app, bad_range).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test::call_service(&app, bad_bucket).await.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::call_and_read_body_json(&app, ok).await;
        assert_eq!(body["range"], "7d");
        assert_eq!(body["bucket_minutes"], 60);
        assert_eq!(body["stats"]["total_checks"], 0);
    }

    #[actix_web::test]
    async fn test_activity_is_newest_first() {
        let fixture = TestApp::new().await;
        let id = fixture.seed_service(7, "http://127.0.0.1:1/").await;
        let app = test::init_service(App::new().app_data(fixture.state()).configure(crate::routes::routes)).await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri(&format!("/services/{id}/check"))
                .insert_header(("X-User-Id", "7"))
                .to_request();
            test::call_service(&app, req).await;
        }

        let req = test::TestRequest::get()
            .uri(&format!("/services/{id}/activity?limit=1"))
            .insert_header(("X-User-Id", "7"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["status"], "offline");
    }
}
