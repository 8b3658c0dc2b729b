//! Mentor - streaming software-engineering assistant API
//!
//! Classifies each question by topic and depth, routes it to a fast or a
//! capable model tier, streams the answer back as plain text, and keeps an
//! append-only log of every exchange.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use crate::config::Config;
use crate::conversation::SessionStore;
use crate::core::{ChatEngine, ChatLog, StreamingResponder};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_engine: Arc<ChatEngine>,
    pub chat_log: Arc<ChatLog>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentor_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let chat_log = Arc::new(ChatLog::connect(&config.database_url).await?);
    tracing::info!("Chat log ready at {}", config.database_url);

    let provider = providers::from_settings(&config.provider)?;
    tracing::info!(
        "Using provider '{}' (fast: {}, capable: {})",
        provider.name(),
        config.models.fast,
        config.models.capable
    );

    let base_prompt = config.base_prompt().await?;

    let chat_engine = Arc::new(
        ChatEngine::new(
            StreamingResponder::new(provider, config.upstream_timeout()),
            Arc::new(SessionStore::new()),
            chat_log.clone(),
            config.models.clone(),
            base_prompt,
        )
        .with_session_wait(config.upstream_timeout()),
    );

    let state = AppState {
        chat_engine,
        chat_log: chat_log.clone(),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Mentor API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    chat_log.close().await;
    tracing::info!("Chat log closed, bye");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
