use actix_web::{App, HttpServer, middleware::Logger, web};
use linkcut::{
    auth::token::TokenService,
    config::{self, Config, logger::LoggerConfig, storage::StorageBackend},
    domain::repository::Store,
    handler::{handlers::Handler, routes},
    memory, postgres,
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

fn build_logger(config: &LoggerConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(ChronoLocal::rfc_3339());

    match config.format {
        config::logger::LogFormat::Json => builder.json().init(),
        config::logger::LogFormat::Text => builder.init(),
    }
}

async fn serve<T>(repo: T, cfg: &Config) -> std::io::Result<()>
where
    T: Store + Send + Sync + 'static,
{
    let tokens = Arc::new(TokenService::from_config(&cfg.auth));
    let handler = web::Data::new(Handler::new(repo, Arc::clone(&tokens), &cfg.handler));
    let tokens = web::Data::from(tokens);

    tracing::info!(
        address = cfg.handler.bind_address.as_str(),
        port = cfg.handler.port,
        base_url = cfg.handler.base_url.as_str(),
        "Starting HTTP server"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(handler.clone())
            .app_data(tokens.clone())
            .app_data(routes::json_config())
            .configure(routes::configure::<T>)
    })
    .bind((cfg.handler.bind_address.as_str(), cfg.handler.port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };
    build_logger(&cfg.logger);

    tracing::debug!(config = ?cfg, "Configuration loaded successfully");
    match cfg.storage.backend {
        StorageBackend::Postgres => {
            let db = postgres::db::DB::new(cfg.postgres.clone())
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "Failed to connect to Postgres");
                    std::io::Error::other(e.to_string())
                })?;
            serve(Arc::new(db), &cfg).await
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            serve(Arc::new(memory::db::DB::new()), &cfg).await
        }
    }
}
