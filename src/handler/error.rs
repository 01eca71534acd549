use actix_web::{HttpResponse, ResponseError, cookie::Cookie, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::domain::error::DomainError;

/// Uniform JSON body for every API response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: Option<T>,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: Option<T>, message: impl Into<String>) -> Self {
        ApiResponse {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.as_u16() < 400,
        }
    }
}

pub fn respond<T: Serialize>(status: StatusCode, data: T, message: &str) -> HttpResponse {
    respond_with_cookies(status, data, message, std::iter::empty::<Cookie>())
}

pub fn respond_with_cookies<'c, T: Serialize>(
    status: StatusCode,
    data: T,
    message: &str,
    cookies: impl IntoIterator<Item = Cookie<'c>>,
) -> HttpResponse {
    let mut builder = HttpResponse::build(status);
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder.json(ApiResponse::new(status, Some(data), message))
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Parameter error: {0}")]
    ParamError(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::ParamError(_) => StatusCode::BAD_REQUEST,
            HandlerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HandlerError::Domain(e) => match e {
                DomainError::Invalid(_) => StatusCode::BAD_REQUEST,
                DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            HandlerError::Domain(DomainError::Internal(e)) => {
                tracing::error!("Internal Server Error: {:?}", e);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(status).json(ApiResponse::<()>::new(status, None, message))
    }
}
