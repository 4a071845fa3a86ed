use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quill::config::AppConfig;
use quill::infra::cache::RedisCache;
use quill::infra::db::Db;
use quill::infra::mail::{LogMailer, Mailer, SmtpMailer};
use quill::infra::queue::SqsQueue;
use quill::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;
    let queue = SqsQueue::new(&config).await?;

    match config.app_mode.as_str() {
        "api" => {
            let state = AppState {
                db,
                cache: Arc::new(cache),
                queue: Arc::new(queue),
                token_key: config.token_key,
                token_ttl_hours: config.token_ttl_hours,
            };

            let app: Router = quill::http::router(state)
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            let mailer: Arc<dyn Mailer> = if config.smtp_host.is_some() {
                Arc::new(SmtpMailer::new(&config)?)
            } else {
                Arc::new(LogMailer)
            };

            tracing::info!("starting worker mode");
            tokio::select! {
                result = quill::jobs::run(db, queue, mailer) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
