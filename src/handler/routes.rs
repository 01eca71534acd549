use actix_web::web;

use crate::{
    domain::repository::Store,
    handler::{
        error::HandlerError,
        extract::Authenticated,
        handlers::{CreateLinkParams, Handler, LoginParams, RefreshParams, RegisterParams},
    },
};

const MAX_JSON_BODY: usize = 16 * 1024;

/// Rejects malformed bodies with the same envelope as every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BODY)
        .error_handler(|err, _req| HandlerError::ParamError(err.to_string()).into())
}

/// Mounts every route. Expects `web::Data<Handler<T>>` and
/// `web::Data<TokenService>` to be registered on the app.
pub fn configure<T: Store + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route(
                "/livez",
                web::get().to(|handler: web::Data<Handler<T>>| async move {
                    handler.livez().await
                }),
            )
            .route(
                "/readyz",
                web::get().to(|handler: web::Data<Handler<T>>| async move {
                    handler.readyz().await
                }),
            ),
    )
    .service(
        web::scope("/api/v1")
            .service(
                web::scope("/users")
                    .route(
                        "/register",
                        web::post().to(
                            |handler: web::Data<Handler<T>>,
                             params: web::Json<RegisterParams>| async move {
                                handler.register(params.into_inner()).await
                            },
                        ),
                    )
                    .route(
                        "/login",
                        web::post().to(
                            |handler: web::Data<Handler<T>>, params: web::Json<LoginParams>| async move {
                                handler.login(params.into_inner()).await
                            },
                        ),
                    )
                    .route(
                        "/refresh-token",
                        web::post().to(
                            |handler: web::Data<Handler<T>>,
                             req: actix_web::HttpRequest,
                             params: Option<web::Json<RefreshParams>>| async move {
                                handler.refresh(req, params.map(|p| p.into_inner())).await
                            },
                        ),
                    )
                    .route(
                        "/logout",
                        web::post().to(
                            |handler: web::Data<Handler<T>>, auth: Authenticated| async move {
                                handler.logout(auth).await
                            },
                        ),
                    )
                    .route(
                        "/me",
                        web::get().to(
                            |handler: web::Data<Handler<T>>, auth: Authenticated| async move {
                                handler.me(auth).await
                            },
                        ),
                    ),
            )
            .service(
                web::scope("/links")
                    .route(
                        "",
                        web::post().to(
                            |handler: web::Data<Handler<T>>,
                             auth: Authenticated,
                             params: web::Json<CreateLinkParams>| async move {
                                handler.create_link(auth, params.into_inner()).await
                            },
                        ),
                    )
                    .route(
                        "",
                        web::get().to(
                            |handler: web::Data<Handler<T>>, auth: Authenticated| async move {
                                handler.list_links(auth).await
                            },
                        ),
                    )
                    .route(
                        "/{id}",
                        web::delete().to(
                            |handler: web::Data<Handler<T>>,
                             auth: Authenticated,
                             path: web::Path<String>| async move {
                                handler.delete_link(auth, path).await
                            },
                        ),
                    ),
            ),
    )
    .route(
        "/{short_link}",
        web::get().to(
            |handler: web::Data<Handler<T>>, path: web::Path<String>| async move {
                handler.redirect(path).await
            },
        ),
    );
}
