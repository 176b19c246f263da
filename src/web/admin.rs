use std::sync::Arc;

use serde::Deserialize;
use warp::{Rejection, Reply};

use crate::config::MAX_ROBOT_LEVEL;
use crate::db::payments::{self, PaymentStatus};
use crate::db::users;
use crate::error::{reject, AppError};
use crate::payments::settle_payment;
use crate::state::AppState;

const ADMIN_USER_LIST_LIMIT: i64 = 200;

pub async fn list_payments(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let listings = payments::list(&state.pool).await.map_err(reject)?;
    Ok(warp::reply::json(&serde_json::json!({ "payments": listings })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefPayload {
    pub payment_id: i64,
}

pub async fn approve_payment(
    payload: PaymentRefPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let payment = settle_payment(
        &state.pool,
        payload.payment_id,
        state.now(),
        state.config.max_offline_secs,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "message": "Robot level activated.",
        "payment": payment,
    })))
}

pub async fn reject_payment(
    payload: PaymentRefPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let payment = payments::set_status(&state.pool, payload.payment_id, PaymentStatus::Rejected)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "message": "Payment rejected.",
        "payment": payment,
    })))
}

pub async fn list_users(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let records = users::list(&state.pool, ADMIN_USER_LIST_LIMIT)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "total": records.len(),
        "users": records,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatePayload {
    pub telegram_id: String,
    pub level: i64,
}

/// Direct activation path for debugging and manual intervention. Unlike a
/// purchase, level 0 is allowed here to switch a robot off.
pub async fn activate_user(
    payload: ActivatePayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if !(0..=MAX_ROBOT_LEVEL).contains(&payload.level) {
        return Err(reject(AppError::InvalidLevel(payload.level)));
    }

    let record = users::set_level(
        &state.pool,
        &payload.telegram_id,
        payload.level,
        state.now(),
        state.config.max_offline_secs,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&record))
}
