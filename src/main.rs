mod accrual;
mod bot;
mod config;
mod db;
mod error;
mod payments;
mod state;
mod web;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::initialize_database(&pool).await?;

    let state = Arc::new(AppState::new(pool, config));

    if let Some(token) = state.config.telegram_token.clone() {
        tokio::spawn(bot::run_bot(state.clone(), token));
    } else {
        tracing::info!("TELEGRAM_BOT_TOKEN not set, bot disabled");
    }

    let port = state.config.port;
    let routes = web::routes(state);

    tracing::info!("listening on port {}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
