use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

pub const PAYMENTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS payments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        telegram_id TEXT NOT NULL REFERENCES users(telegram_id),
        level INTEGER NOT NULL,
        amount_usd REAL NOT NULL,
        method TEXT NOT NULL,               -- 'manual-trc20' or 'nowpayments'
        external_ref TEXT,                  -- tx hash or provider order id
        status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL
    );
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    ManualTrc20,
    Nowpayments,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub telegram_id: String,
    pub level: i64,
    pub amount_usd: f64,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
}

/// Payment joined with a short user summary, for the admin listing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListing {
    pub id: i64,
    pub telegram_id: String,
    pub username: Option<String>,
    pub robot_level: i64,
    pub level: i64,
    pub amount_usd: f64,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
}

pub async fn create(
    pool: &SqlitePool,
    telegram_id: &str,
    level: i64,
    amount_usd: f64,
    method: PaymentMethod,
    external_ref: Option<&str>,
    now: i64,
) -> AppResult<Payment> {
    let result = sqlx::query(
        r#"
        INSERT INTO payments (telegram_id, level, amount_usd, method, external_ref, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6)
        "#,
    )
    .bind(telegram_id)
    .bind(level)
    .bind(amount_usd)
    .bind(method)
    .bind(external_ref)
    .bind(now)
    .execute(pool)
    .await?;

    require(pool, result.last_insert_rowid()).await
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(payment)
}

pub async fn require(pool: &SqlitePool, id: i64) -> AppResult<Payment> {
    get(pool, id).await?.ok_or(AppError::PaymentNotFound(id))
}

pub async fn find_by_order_id(pool: &SqlitePool, order_id: &str) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE external_ref = ?1 ORDER BY id DESC",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(payment)
}

/// Records the user-submitted TRC20 transaction hash. The hash is stored
/// for the admin to eyeball, never verified on-chain. Restricted to manual
/// payments; a provider payment's external_ref is its order id and must
/// stay intact for the IPN lookup.
pub async fn set_tx_hash(pool: &SqlitePool, id: i64, tx_hash: &str) -> AppResult<Payment> {
    let result = sqlx::query("UPDATE payments SET external_ref = ?1 WHERE id = ?2 AND method = ?3")
        .bind(tx_hash)
        .bind(id)
        .bind(PaymentMethod::ManualTrc20)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::PaymentNotFound(id));
    }
    require(pool, id).await
}

pub async fn set_status(pool: &SqlitePool, id: i64, status: PaymentStatus) -> AppResult<Payment> {
    let result = sqlx::query("UPDATE payments SET status = ?1 WHERE id = ?2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::PaymentNotFound(id));
    }
    require(pool, id).await
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<PaymentListing>> {
    let listings = sqlx::query_as::<_, PaymentListing>(
        r#"
        SELECT p.id, p.telegram_id, u.username, u.robot_level,
               p.level, p.amount_usd, p.method, p.external_ref, p.status, p.created_at
        FROM payments p
        JOIN users u ON u.telegram_id = p.telegram_id
        ORDER BY p.id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(listings)
}
