use std::sync::Arc;

use actix_web::{
    HttpRequest, HttpResponse, Responder,
    cookie::{Cookie, SameSite},
    http::StatusCode,
    web::{self, Redirect},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::token::TokenService,
    domain::{
        models::{ShortLink, User},
        repository::Store,
    },
    handler::{
        config::Config,
        error::{HandlerError, respond, respond_with_cookies},
        extract::{ACCESS_TOKEN_COOKIE, Authenticated, REFRESH_TOKEN_COOKIE},
    },
    usecase::{CreateLink, Session, Usecase},
};

pub struct Handler<T: Store> {
    usecase: Usecase<T>,
    base_url: String,
    cookie_secure: bool,
}

impl<T: Store> Handler<T> {
    pub fn new(repo: T, tokens: Arc<TokenService>, config: &Config) -> Self {
        Handler {
            usecase: Usecase::new(repo, tokens),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie_secure: config.cookie_secure,
        }
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .finish()
    }

    fn expired_cookie(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = self.cookie(name, String::new());
        cookie.make_removal();
        cookie
    }

    fn session_response(&self, session: Session, message: &str) -> HttpResponse {
        let access = self.cookie(ACCESS_TOKEN_COOKIE, session.tokens.access_token.clone());
        let refresh = self.cookie(REFRESH_TOKEN_COOKIE, session.tokens.refresh_token.clone());
        let body = json!({
            "user": session.user,
            "accessToken": session.tokens.access_token,
            "refreshToken": session.tokens.refresh_token,
        });
        respond_with_cookies(StatusCode::OK, body, message, [access, refresh])
    }

    fn link_view(&self, link: ShortLink) -> LinkView {
        LinkView {
            short_url: format!("{}/{}", self.base_url, link.short_link),
            link,
        }
    }

    async fn caller(&self, auth: &Authenticated) -> Result<User, HandlerError> {
        Ok(self.usecase.current_user(auth.0.sub).await?)
    }

    pub async fn livez(&self) -> impl Responder + use<T> {
        HttpResponse::Ok().body("Ok")
    }

    pub async fn readyz(&self) -> HttpResponse {
        match self.usecase.ping().await {
            Ok(()) => HttpResponse::Ok().body("Ok"),
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed");
                HttpResponse::ServiceUnavailable().body("Unavailable")
            }
        }
    }

    pub async fn register(&self, params: RegisterParams) -> Result<HttpResponse, HandlerError> {
        let user = self
            .usecase
            .register(&params.email, &params.full_name, &params.password)
            .await?;
        Ok(respond(
            StatusCode::CREATED,
            json!({ "user": user }),
            "User registered successfully",
        ))
    }

    pub async fn login(&self, params: LoginParams) -> Result<HttpResponse, HandlerError> {
        let session = self.usecase.login(&params.email, &params.password).await?;
        Ok(self.session_response(session, "User logged in successfully"))
    }

    pub async fn refresh(
        &self,
        req: HttpRequest,
        params: Option<RefreshParams>,
    ) -> Result<HttpResponse, HandlerError> {
        let token = req
            .cookie(REFRESH_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| params.and_then(|p| p.refresh_token))
            .ok_or_else(|| HandlerError::Unauthorized("Unauthorized request".to_string()))?;

        let session = self.usecase.refresh(&token).await?;
        Ok(self.session_response(session, "Access token refreshed"))
    }

    pub async fn logout(&self, auth: Authenticated) -> Result<HttpResponse, HandlerError> {
        let user = self.caller(&auth).await?;
        self.usecase.logout(user.id).await?;

        Ok(respond_with_cookies(
            StatusCode::OK,
            json!({}),
            "User logged out",
            [
                self.expired_cookie(ACCESS_TOKEN_COOKIE),
                self.expired_cookie(REFRESH_TOKEN_COOKIE),
            ],
        ))
    }

    pub async fn me(&self, auth: Authenticated) -> Result<HttpResponse, HandlerError> {
        let user = self.caller(&auth).await?;
        Ok(respond(
            StatusCode::OK,
            json!({ "user": user }),
            "Current user fetched successfully",
        ))
    }

    pub async fn create_link(
        &self,
        auth: Authenticated,
        params: CreateLinkParams,
    ) -> Result<HttpResponse, HandlerError> {
        let user = self.caller(&auth).await?;
        let link = self
            .usecase
            .create_link(
                user.id,
                CreateLink {
                    original_link: params.original_link,
                    creation_date: params.creation_date,
                    expiry_date: params.expiry_date,
                    custom_code: params.custom_code,
                },
                Utc::now(),
            )
            .await?;
        Ok(respond(
            StatusCode::CREATED,
            json!({ "createdLink": self.link_view(link) }),
            "Link registered Successfully",
        ))
    }

    pub async fn list_links(&self, auth: Authenticated) -> Result<HttpResponse, HandlerError> {
        let user = self.caller(&auth).await?;
        let links: Vec<LinkView> = self
            .usecase
            .list_links(user.id)
            .await?
            .into_iter()
            .map(|l| self.link_view(l))
            .collect();
        Ok(respond(
            StatusCode::OK,
            json!({ "userLinks": links }),
            "Links retrieved successfully",
        ))
    }

    pub async fn delete_link(
        &self,
        auth: Authenticated,
        path: web::Path<String>,
    ) -> Result<HttpResponse, HandlerError> {
        let user = self.caller(&auth).await?;
        let deleted = self.usecase.delete_link(user.id, &path.into_inner()).await?;
        Ok(respond(
            StatusCode::OK,
            json!({ "deletedLink": self.link_view(deleted) }),
            "Link deleted successfully",
        ))
    }

    pub async fn redirect(&self, path: web::Path<String>) -> Result<Redirect, HandlerError> {
        let link = self.usecase.resolve(&path.into_inner(), Utc::now()).await?;
        Ok(Redirect::to(link.original_link).using_status_code(StatusCode::FOUND))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkView {
    #[serde(flatten)]
    pub link: ShortLink,
    pub short_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshParams {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkParams {
    #[serde(default)]
    pub original_link: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub custom_code: Option<String>,
}
