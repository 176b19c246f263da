use std::sync::Arc;

use serde::Deserialize;
use warp::{Rejection, Reply};

use crate::config::price_for_level;
use crate::db::payments::{self, PaymentMethod, PaymentStatus};
use crate::db::users;
use crate::error::{reject, AppError};
use crate::payments::{create_invoice, new_order_id, settle_payment, IpnPayload};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualStartPayload {
    pub user_id: String,
    pub level: i64,
}

pub async fn manual_start(
    payload: ManualStartPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let amount_usd =
        price_for_level(payload.level).ok_or_else(|| reject(AppError::InvalidLevel(payload.level)))?;

    let user = users::require(&state.pool, &payload.user_id)
        .await
        .map_err(reject)?;

    let payment = payments::create(
        &state.pool,
        &user.telegram_id,
        payload.level,
        amount_usd,
        PaymentMethod::ManualTrc20,
        None,
        state.now(),
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "message": "Payment record created.",
        "wallet": state.config.trc20_wallet,
        "amountUSD": amount_usd,
        "paymentId": payment.id,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualConfirmPayload {
    pub payment_id: i64,
    pub tx_hash: String,
}

pub async fn manual_confirm(
    payload: ManualConfirmPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let payment = payments::set_tx_hash(&state.pool, payload.payment_id, &payload.tx_hash)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "message": "Hash recorded.",
        "payment": payment,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub telegram_id: String,
    pub level: i64,
}

pub async fn nowpayments_invoice(
    payload: InvoicePayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let api_key = state
        .config
        .nowpayments_api_key
        .clone()
        .ok_or_else(|| reject(AppError::ProviderNotConfigured))?;

    let amount_usd =
        price_for_level(payload.level).ok_or_else(|| reject(AppError::InvalidLevel(payload.level)))?;

    let user = users::require(&state.pool, &payload.telegram_id)
        .await
        .map_err(reject)?;

    let order_id = new_order_id(&user.telegram_id, payload.level);
    let payment = payments::create(
        &state.pool,
        &user.telegram_id,
        payload.level,
        amount_usd,
        PaymentMethod::Nowpayments,
        Some(&order_id),
        state.now(),
    )
    .await
    .map_err(reject)?;

    let description = format!("Pratique robot level {}", payload.level);
    let invoice = create_invoice(&state.http, &api_key, &order_id, amount_usd, &description)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "invoiceUrl": invoice.invoice_url,
        "orderId": order_id,
        "paymentId": payment.id,
        "amountUSD": amount_usd,
    })))
}

pub async fn nowpayments_ipn(
    payload: IpnPayload,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if !payload.is_finished() {
        tracing::info!(
            "ipn for order {}: status {}, ignoring",
            payload.order_id,
            payload.payment_status
        );
        return Ok(warp::reply::json(&serde_json::json!({ "ok": true })));
    }

    let payment = payments::find_by_order_id(&state.pool, &payload.order_id)
        .await
        .map_err(reject)?
        .ok_or_else(|| reject(AppError::OrderNotFound(payload.order_id.clone())))?;

    // The provider retries delivery; a settled payment stays settled.
    if payment.status != PaymentStatus::Pending {
        return Ok(warp::reply::json(&serde_json::json!({ "ok": true })));
    }

    settle_payment(
        &state.pool,
        payment.id,
        state.now(),
        state.config.max_offline_secs,
    )
    .await
    .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({ "ok": true })))
}
