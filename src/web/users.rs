use std::sync::Arc;

use serde::Deserialize;
use warp::{Rejection, Reply};

use crate::config::DEFAULT_LEADERBOARD_LIMIT;
use crate::db::users::{self, NewProfile};
use crate::error::{reject, AppError};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub telegram_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub photo_url: Option<String>,
    pub invited_by: Option<String>,
}

pub async fn register(
    payload: RegisterPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if payload.telegram_id.trim().is_empty() {
        return Err(reject(AppError::MissingTelegramId));
    }

    let profile = NewProfile {
        username: payload.username,
        first_name: payload.first_name,
        photo_url: payload.photo_url,
        invited_by: payload.invited_by,
    };

    let record = users::get_or_create(
        &state.pool,
        &payload.telegram_id,
        &profile,
        state.now(),
        state.config.max_offline_secs,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&record))
}

pub async fn get_user(
    telegram_id: String,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let record = users::settle(
        &state.pool,
        &telegram_id,
        state.now(),
        state.config.max_offline_secs,
        None,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&record))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalancePayload {
    pub telegram_id: String,
    pub balance: f64,
}

pub async fn update_balance(
    payload: UpdateBalancePayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if !payload.balance.is_finite() || payload.balance < 0.0 {
        return Err(reject(AppError::InvalidBalance(payload.balance)));
    }

    let record = users::settle(
        &state.pool,
        &payload.telegram_id,
        state.now(),
        state.config.max_offline_secs,
        Some(payload.balance),
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "success": true,
        "balance": record.balance,
    })))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

pub async fn leaderboard(
    query: LeaderboardQuery,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);

    let records = users::leaderboard(
        &state.pool,
        state.now(),
        state.config.max_offline_secs,
        limit,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&records))
}
