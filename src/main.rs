use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod client;
mod config;
mod dispatch;
mod errors;
mod models;
mod services;

use crate::config::AppConfig;
use crate::services::game::{Game, GameConfig};
use crate::services::sink::DurableSink;

pub struct AppState {
    pub game: Mutex<Game>,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "figgie_market=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting Figgie marketplace v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        players = config.players,
        trading_duration_secs = config.trading_duration_secs,
        "configuration loaded"
    );

    let sink = Arc::new(DurableSink::open(&config.sink_path)?);
    tracing::info!(path = %config.sink_path, "durable sink opened");

    let game = Game::new(
        GameConfig {
            players: config.players,
            trading_duration_secs: config.trading_duration_secs,
        },
        sink,
    );

    let state = Arc::new(AppState {
        game: Mutex::new(game),
        config: config.clone(),
    });

    let app = api::routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from((
        config.bind_addr.parse::<std::net::IpAddr>().unwrap_or_else(|_| [0, 0, 0, 0].into()),
        config.port,
    ));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
