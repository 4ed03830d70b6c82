//! Processed-message ledger.
//!
//! A write-once set of dedup keys. Inserting a key is the claim: the unique
//! primary key guarantees that exactly one of several concurrent deliveries
//! wins, across processes.

use sqlx::SqlitePool;

use crate::now_millis;
use crate::Result;

/// How long a claimed key blocks reprocessing, in milliseconds.
pub const LEDGER_TTL_MILLIS: i64 = 60 * 60 * 1000;

/// Try to claim a dedup key.
///
/// Returns `true` when this caller claimed the key, `false` when it was
/// already claimed. A key older than [`LEDGER_TTL_MILLIS`] counts as free even
/// if cleanup has not removed it yet.
pub async fn claim(pool: &SqlitePool, key: &str) -> Result<bool> {
    let now = now_millis();
    let result = sqlx::query(
        r#"
        INSERT INTO processed_messages (key, created_at)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET created_at = excluded.created_at
        WHERE processed_messages.created_at < ?
        "#,
    )
    .bind(key)
    .bind(now)
    .bind(now - LEDGER_TTL_MILLIS)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Give a claimed key back, so a redelivery can process the event.
pub async fn release(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM processed_messages WHERE key = ?
        "#,
    )
    .bind(key)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether a key has been claimed.
pub async fn is_claimed(pool: &SqlitePool, key: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1 FROM processed_messages WHERE key = ?
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(found.is_some())
}

/// Delete keys claimed before `cutoff_millis`. Returns the number removed.
pub async fn purge_older_than(pool: &SqlitePool, cutoff_millis: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM processed_messages WHERE created_at < ?
        "#,
    )
    .bind(cutoff_millis)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete keys older than [`LEDGER_TTL_MILLIS`].
pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    purge_older_than(pool, now_millis() - LEDGER_TTL_MILLIS).await
}
