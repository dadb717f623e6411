use crate::api::error::ApiError;
use crate::{consts, AppState};
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web,
};

fn bearer(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(consts::AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// 配置了 `server.api_token` 时要求请求携带相同的 Bearer 令牌
pub async fn verify_api_token(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let expected = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.api_token.clone());
    if let Some(expected) = expected {
        if bearer(&req) != Some(expected.as_str()) {
            log::warn!(
                "Rejected {} {} from {:?}: bad token",
                req.method(),
                req.path(),
                req.peer_addr()
            );
            return Err(ApiError::Unauthorized.into());
        }
    }
    next.call(req).await
}
