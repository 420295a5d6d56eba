use actix_web::{HttpResponse, Responder, get};

macros_utils::routes! {
    route health_route,
}

/// Liveness probe for whatever runs the server.
/// The status alone answers, there is no body.
#[get("/")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}
