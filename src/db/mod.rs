use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub mod payments;
pub mod users;

/// SQLite permits one writer at a time, and a deferred transaction that
/// upgrades to a write fails with SQLITE_BUSY instead of queueing on the
/// lock. A single-connection pool serializes every settle cycle, so
/// concurrent read-modify-write cycles on the same record queue instead of
/// erroring.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await
}

pub async fn initialize_database(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(users::USERS_TABLE).execute(pool).await?;
    sqlx::query(payments::PAYMENTS_TABLE).execute(pool).await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_payments_status
        ON payments (status);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_payments_external_ref
        ON payments (external_ref);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:").await.expect("in-memory pool");
    initialize_database(&pool).await.expect("schema");
    pool
}
