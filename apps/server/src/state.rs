use std::future::{Ready, ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use nimbus_prober::Nimbus;
use nimbus_prober::database::ServiceRepository;
use nimbus_prober::monitoring::{Service, ServiceId, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated user, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";

pub struct AppState {
    pub nimbus: Arc<Nimbus>,
}

impl AppState {
    pub fn new(nimbus: Arc<Nimbus>) -> Self {
        Self { nimbus }
    }

    /// Load a service the caller owns
    pub async fn owned_service(&self, id: ServiceId, caller: &Caller) -> Result<Service, ApiError> {
        let service = self
            .nimbus
            .services
            .get_by_id(id)
            .await
            .map_err(|e| ApiError::Internal(format!("{e:#}")))?
            .ok_or(ApiError::NotFound(id))?;

        if service.user_id != caller.0 {
            return Err(ApiError::Forbidden(id));
        }
        Ok(service)
    }
}

/// The requesting user, from [`USER_ID_HEADER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map(Caller)
            .ok_or(ApiError::Unauthorized);

        ready(caller)
    }
}
