use std::future::{Ready, ready};

use actix_web::{
    FromRequest, HttpRequest, dev::Payload, http::header::AUTHORIZATION, web,
};
use anyhow::anyhow;

use crate::{
    auth::token::{AccessClaims, TokenService},
    domain::error::DomainError,
    handler::error::HandlerError,
};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Verified access-token claims of the caller.
///
/// The token is taken from the `accessToken` cookie, or failing that from an
/// `Authorization: Bearer` header. Whether the subject still exists is checked
/// by the handler, since that needs the store.
#[derive(Debug, Clone)]
pub struct Authenticated(pub AccessClaims);

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn authenticate(req: &HttpRequest) -> Result<Authenticated, HandlerError> {
    let tokens = req.app_data::<web::Data<TokenService>>().ok_or_else(|| {
        HandlerError::Domain(DomainError::Internal(anyhow!(
            "Token service is not registered"
        )))
    })?;

    let token = req
        .cookie(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(req))
        .ok_or_else(|| HandlerError::Unauthorized("Unauthorized request".to_string()))?;

    let claims = tokens
        .verify_access(&token)
        .map_err(|e| HandlerError::Unauthorized(format!("Invalid access token: {}", e)))?;
    Ok(Authenticated(claims))
}

impl FromRequest for Authenticated {
    type Error = HandlerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}
