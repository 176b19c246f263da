//! Payment settlement.
//!
//! Both settlement paths, admin approval of a manual TRC20 transfer and the
//! NOWPayments IPN, funnel into [`settle_payment`] so a completed payment
//! always raises the robot level through the same accrual-settling
//! activation, whatever the money came in through.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::payments::{self, Payment, PaymentStatus};
use crate::db::users;
use crate::error::{AppError, AppResult};

const NOWPAYMENTS_API: &str = "https://api.nowpayments.io/v1";

/// Marks the payment approved and activates the purchased level. Reward at
/// the old level is settled up to `now` before the new level takes effect.
pub async fn settle_payment(
    pool: &SqlitePool,
    payment_id: i64,
    now: i64,
    max_offline_secs: i64,
) -> AppResult<Payment> {
    let payment = payments::require(pool, payment_id).await?;

    let payment = payments::set_status(pool, payment.id, PaymentStatus::Approved).await?;
    users::set_level(pool, &payment.telegram_id, payment.level, now, max_offline_secs).await?;

    tracing::info!(
        "settled payment {} for user {}: robot level {}",
        payment.id,
        payment.telegram_id,
        payment.level
    );
    Ok(payment)
}

/// Order id carried through the provider round-trip, `PRTQ-<id>-<level>-<nonce>`.
pub fn new_order_id(telegram_id: &str, level: i64) -> String {
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("PRTQ-{}-{}-{:06}", telegram_id, level, nonce)
}

#[derive(Serialize)]
struct InvoiceRequest<'a> {
    price_amount: f64,
    price_currency: &'a str,
    pay_currency: &'a str,
    order_id: &'a str,
    order_description: &'a str,
}

#[derive(Deserialize)]
pub struct InvoiceResponse {
    pub invoice_url: String,
}

/// Creates a USDT invoice with NOWPayments.
pub async fn create_invoice(
    client: &reqwest::Client,
    api_key: &str,
    order_id: &str,
    amount_usd: f64,
    description: &str,
) -> AppResult<InvoiceResponse> {
    let request = InvoiceRequest {
        price_amount: amount_usd,
        price_currency: "usd",
        pay_currency: "usdttrc20",
        order_id,
        order_description: description,
    };

    let response = client
        .post(format!("{}/invoice", NOWPAYMENTS_API))
        .header("x-api-key", api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Custom(format!(
            "NOWPayments invoice failed: {} {}",
            status, body
        )));
    }

    Ok(response.json::<InvoiceResponse>().await?)
}

/// The subset of the IPN callback body the backend acts on.
#[derive(Debug, Deserialize)]
pub struct IpnPayload {
    pub payment_status: String,
    pub order_id: String,
}

impl IpnPayload {
    pub fn is_finished(&self) -> bool {
        self.payment_status == "finished"
    }
}
