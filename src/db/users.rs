use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::accrual;
use crate::error::{AppError, AppResult};

pub const USERS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        telegram_id TEXT PRIMARY KEY,       -- Telegram user id, string to avoid precision loss
        username TEXT,
        first_name TEXT,
        photo_url TEXT,
        invite_code TEXT NOT NULL UNIQUE,   -- INV-<telegram_id>
        invited_by TEXT,                    -- invite code this user signed up with
        invite_count INTEGER NOT NULL DEFAULT 0,
        balance REAL NOT NULL DEFAULT 0,    -- PRTQ points
        robot_level INTEGER NOT NULL DEFAULT 0,
        last_accrual_ts INTEGER NOT NULL,   -- unix seconds
        created_at INTEGER NOT NULL
    );
";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub telegram_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub photo_url: Option<String>,
    pub invite_code: String,
    pub invited_by: Option<String>,
    pub invite_count: i64,
    pub balance: f64,
    pub robot_level: i64,
    pub last_accrual_ts: i64,
    pub created_at: i64,
}

/// Profile fields supplied by the mini-app or the bot on registration.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub photo_url: Option<String>,
    pub invited_by: Option<String>,
}

pub async fn get(pool: &SqlitePool, telegram_id: &str) -> AppResult<Option<UserRecord>> {
    let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE telegram_id = ?1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

pub async fn require(pool: &SqlitePool, telegram_id: &str) -> AppResult<UserRecord> {
    get(pool, telegram_id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(telegram_id.to_string()))
}

async fn fetch_for_update(
    conn: &mut SqliteConnection,
    telegram_id: &str,
) -> AppResult<Option<UserRecord>> {
    let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE telegram_id = ?1")
        .bind(telegram_id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Writes back the mutable accrual state of a record.
async fn persist(conn: &mut SqliteConnection, record: &UserRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET balance = ?1, robot_level = ?2, last_accrual_ts = ?3
        WHERE telegram_id = ?4
        "#,
    )
    .bind(record.balance)
    .bind(record.robot_level)
    .bind(record.last_accrual_ts)
    .bind(&record.telegram_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// First touch creates the record with zero balance, level 0 and
/// `last_accrual_ts = now`, credits the inviter when a referral code was
/// supplied, and returns it. Subsequent calls refresh the profile fields and
/// settle accrual up to `now`.
pub async fn get_or_create(
    pool: &SqlitePool,
    telegram_id: &str,
    profile: &NewProfile,
    now: i64,
    max_offline_secs: i64,
) -> AppResult<UserRecord> {
    let mut tx = pool.begin().await?;

    if let Some(mut record) = fetch_for_update(&mut tx, telegram_id).await? {
        accrual::accrue(&mut record, now, max_offline_secs);
        record.username = profile.username.clone().or(record.username);
        record.first_name = profile.first_name.clone().or(record.first_name);
        record.photo_url = profile.photo_url.clone().or(record.photo_url);

        sqlx::query(
            r#"
            UPDATE users
            SET username = ?1, first_name = ?2, photo_url = ?3,
                balance = ?4, last_accrual_ts = ?5
            WHERE telegram_id = ?6
            "#,
        )
        .bind(&record.username)
        .bind(&record.first_name)
        .bind(&record.photo_url)
        .bind(record.balance)
        .bind(record.last_accrual_ts)
        .bind(telegram_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        return Ok(record);
    }

    let invite_code = format!("INV-{}", telegram_id);
    let record = UserRecord {
        telegram_id: telegram_id.to_string(),
        username: profile.username.clone(),
        first_name: profile.first_name.clone(),
        photo_url: profile.photo_url.clone(),
        invite_code: invite_code.clone(),
        invited_by: profile.invited_by.clone(),
        invite_count: 0,
        balance: 0.0,
        robot_level: 0,
        last_accrual_ts: now,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO users (telegram_id, username, first_name, photo_url,
                           invite_code, invited_by, invite_count,
                           balance, robot_level, last_accrual_ts, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, ?7, ?7)
        "#,
    )
    .bind(&record.telegram_id)
    .bind(&record.username)
    .bind(&record.first_name)
    .bind(&record.photo_url)
    .bind(&record.invite_code)
    .bind(&record.invited_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if let Some(ref_code) = &record.invited_by {
        let normalized = ref_code.trim().to_uppercase();
        sqlx::query("UPDATE users SET invite_count = invite_count + 1 WHERE invite_code = ?1")
            .bind(&normalized)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(record)
}

/// One settle cycle: load, accrue to `now`, optionally reconcile a
/// client-reported balance, write back. Runs in one transaction so a
/// concurrent cycle for the same user cannot double-credit.
pub async fn settle(
    pool: &SqlitePool,
    telegram_id: &str,
    now: i64,
    max_offline_secs: i64,
    client_balance: Option<f64>,
) -> AppResult<UserRecord> {
    let mut tx = pool.begin().await?;

    let mut record = fetch_for_update(&mut tx, telegram_id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(telegram_id.to_string()))?;

    accrual::accrue(&mut record, now, max_offline_secs);
    if let Some(reported) = client_balance {
        accrual::reconcile(&mut record, reported);
    }

    persist(&mut tx, &record).await?;
    tx.commit().await?;
    Ok(record)
}

/// Settles the user at the old level, then switches to `new_level`.
pub async fn set_level(
    pool: &SqlitePool,
    telegram_id: &str,
    new_level: i64,
    now: i64,
    max_offline_secs: i64,
) -> AppResult<UserRecord> {
    let mut tx = pool.begin().await?;

    let mut record = fetch_for_update(&mut tx, telegram_id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(telegram_id.to_string()))?;

    accrual::activate(&mut record, new_level, now, max_offline_secs);

    persist(&mut tx, &record).await?;
    tx.commit().await?;
    Ok(record)
}

/// Accrues every record up to `now`, persists the results and returns the
/// top `limit` by balance, descending. Tie-break on telegram_id so the
/// ordering is stable.
pub async fn leaderboard(
    pool: &SqlitePool,
    now: i64,
    max_offline_secs: i64,
    limit: i64,
) -> AppResult<Vec<UserRecord>> {
    let mut tx = pool.begin().await?;

    let mut records = sqlx::query_as::<_, UserRecord>("SELECT * FROM users")
        .fetch_all(&mut *tx)
        .await?;

    for record in &mut records {
        accrual::accrue(record, now, max_offline_secs);
        persist(&mut tx, record).await?;
    }

    tx.commit().await?;

    records.sort_by(|a, b| {
        b.balance
            .partial_cmp(&a.balance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.telegram_id.cmp(&b.telegram_id))
    });
    records.truncate(limit.max(0) as usize);
    Ok(records)
}

/// Raw record listing for the admin surface, newest first. No accrual.
pub async fn list(pool: &SqlitePool, limit: i64) -> AppResult<Vec<UserRecord>> {
    let records =
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users ORDER BY created_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(pool)
            .await?;
    Ok(records)
}
