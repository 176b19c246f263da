use std::env;

use crate::error::{AppError, AppResult};

/// USD price per robot level, index = level. Level 0 is the free tier and
/// cannot be purchased.
pub const LEVEL_PRICES_USD: [f64; 6] = [0.0, 50.0, 100.0, 150.0, 200.0, 250.0];

pub const MAX_ROBOT_LEVEL: i64 = (LEVEL_PRICES_USD.len() - 1) as i64;

/// Default cap on offline accrual time: two hours.
pub const DEFAULT_MAX_OFFLINE_SECS: i64 = 7200;

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 20;

/// Price for a purchasable level (1..=MAX_ROBOT_LEVEL).
pub fn price_for_level(level: i64) -> Option<f64> {
    if (1..=MAX_ROBOT_LEVEL).contains(&level) {
        Some(LEVEL_PRICES_USD[level as usize])
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_secret: String,
    pub trc20_wallet: String,
    pub telegram_token: Option<String>,
    pub nowpayments_api_key: Option<String>,
    pub max_offline_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://pratique.db?mode=rwc".to_string());

        let admin_secret = env::var("ADMIN_SECRET")
            .map_err(|_| AppError::MissingSecret("ADMIN_SECRET"))?;

        let trc20_wallet = env::var("TRC20_WALLET_ADDRESS")
            .map_err(|_| AppError::MissingSecret("TRC20_WALLET_ADDRESS"))?;

        let telegram_token = env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.is_empty());
        let nowpayments_api_key = env::var("NOWPAYMENTS_API_KEY").ok().filter(|k| !k.is_empty());

        // The accrual clamp needs a non-negative cap.
        let max_offline_secs = env::var("MAX_OFFLINE_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_MAX_OFFLINE_SECS)
            .max(0);

        Ok(Self {
            port,
            database_url,
            admin_secret,
            trc20_wallet,
            telegram_token,
            nowpayments_api_key,
            max_offline_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_is_not_purchasable() {
        assert_eq!(price_for_level(0), None);
        assert_eq!(price_for_level(-1), None);
        assert_eq!(price_for_level(MAX_ROBOT_LEVEL + 1), None);
    }

    #[test]
    fn prices_match_tier_table() {
        assert_eq!(price_for_level(1), Some(50.0));
        assert_eq!(price_for_level(5), Some(250.0));
    }

    #[test]
    fn negative_offline_cap_is_floored_at_zero() {
        env::set_var("ADMIN_SECRET", "s");
        env::set_var("TRC20_WALLET_ADDRESS", "w");
        env::set_var("MAX_OFFLINE_SECONDS", "-5");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.max_offline_secs, 0);

        env::remove_var("MAX_OFFLINE_SECONDS");
    }
}
