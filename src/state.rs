use sqlx::SqlitePool;

use crate::config::AppConfig;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
