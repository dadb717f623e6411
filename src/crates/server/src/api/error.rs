use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use application::error::AppError;
use domain::resolver::ResolveError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or invalid token")]
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    /// 稳定的错误码，调用方按它区分提示文案
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::Unauthorized => "unauthorized",
            ApiError::App(err) => match err {
                AppError::InvalidInput(_) => "invalid_input",
                AppError::Resolution(ResolveError::NotFound(_)) => "not_found",
                AppError::Resolution(_) => "resolution_failed",
                AppError::NoActiveCall(_) => "no_active_call",
                AppError::AlreadyJoined(_) => "already_joined",
                AppError::DriverTransient(_) => "driver_transient",
                AppError::DriverFatal(_) => "driver_fatal",
                AppError::StaleState(_) => "stale_state",
                AppError::NotJoined(_) => "not_joined",
                AppError::Transcode(_) => "transcode_failed",
            },
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::App(err) => match err {
                AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AppError::Resolution(ResolveError::NotFound(_)) => StatusCode::NOT_FOUND,
                AppError::Resolution(_) => StatusCode::BAD_GATEWAY,
                AppError::NoActiveCall(_)
                | AppError::AlreadyJoined(_)
                | AppError::StaleState(_)
                | AppError::NotJoined(_) => StatusCode::CONFLICT,
                AppError::DriverTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
                AppError::DriverFatal(_) => StatusCode::BAD_GATEWAY,
                AppError::Transcode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        })
    }
}
