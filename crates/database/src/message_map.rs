//! Message map storage: the join between CRM and gateway message ids.
//!
//! The CRM echoes back only its own ids and the gateway only its own, so every
//! edit/react/delete correlation goes through this table.

use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{MessageMapEntry, NewMessageMapEntry};
use crate::now_millis;

const ENTRY_COLUMNS: &str = r#"
    ghl_message_id, gateway_message_id, location_id, contact_id, instance_id,
    message_text, message_type, from_me, reactions, is_deleted, is_edited,
    original_timestamp, created_at
"#;

/// Create an entry, or fill in missing fields of an existing one.
///
/// An existing row keeps its mutation state (reactions, edit/delete flags); a
/// known gateway id is never replaced by `NULL`.
pub async fn upsert_entry(pool: &SqlitePool, entry: &NewMessageMapEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO message_map (
            ghl_message_id, gateway_message_id, location_id, contact_id, instance_id,
            message_text, message_type, from_me, reactions, is_deleted, is_edited,
            original_timestamp, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', 0, 0, ?, ?)
        ON CONFLICT(ghl_message_id) DO UPDATE SET
            gateway_message_id = COALESCE(excluded.gateway_message_id, message_map.gateway_message_id),
            contact_id = COALESCE(excluded.contact_id, message_map.contact_id),
            instance_id = COALESCE(excluded.instance_id, message_map.instance_id),
            message_text = excluded.message_text,
            message_type = excluded.message_type,
            from_me = excluded.from_me
        "#,
    )
    .bind(&entry.ghl_message_id)
    .bind(&entry.gateway_message_id)
    .bind(&entry.location_id)
    .bind(&entry.contact_id)
    .bind(&entry.instance_id)
    .bind(&entry.message_text)
    .bind(&entry.message_type)
    .bind(entry.from_me)
    .bind(entry.original_timestamp)
    .bind(now_millis())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an entry by CRM message id.
pub async fn get_by_ghl_id(pool: &SqlitePool, ghl_message_id: &str) -> Result<Option<MessageMapEntry>> {
    let query = format!("SELECT {ENTRY_COLUMNS} FROM message_map WHERE ghl_message_id = ?");
    let record = sqlx::query_as::<_, MessageMapEntry>(&query)
        .bind(ghl_message_id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Get the oldest entry carrying a gateway message id.
pub async fn get_by_gateway_id(
    pool: &SqlitePool,
    gateway_message_id: &str,
) -> Result<Option<MessageMapEntry>> {
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM message_map WHERE gateway_message_id = ? \
         ORDER BY created_at ASC LIMIT 1"
    );
    let record = sqlx::query_as::<_, MessageMapEntry>(&query)
        .bind(gateway_message_id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// List entries of a contact conversation, oldest first.
pub async fn list_for_contact(
    pool: &SqlitePool,
    location_id: &str,
    contact_id: &str,
    limit: i64,
) -> Result<Vec<MessageMapEntry>> {
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM message_map \
         WHERE location_id = ? AND contact_id = ? \
         ORDER BY original_timestamp DESC LIMIT ?"
    );
    let mut entries = sqlx::query_as::<_, MessageMapEntry>(&query)
        .bind(location_id)
        .bind(contact_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    entries.reverse();

    Ok(entries)
}

/// List entries for a set of CRM message ids. Unknown ids are skipped.
pub async fn list_by_ghl_ids(pool: &SqlitePool, ids: &[String]) -> Result<Vec<MessageMapEntry>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM message_map WHERE ghl_message_id IN ({placeholders}) \
         ORDER BY original_timestamp ASC"
    );
    let mut q = sqlx::query_as::<_, MessageMapEntry>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Append a reaction to the entry's reaction list.
pub async fn append_reaction(pool: &SqlitePool, ghl_message_id: &str, emoji: &str) -> Result<Vec<String>> {
    let entry = get_by_ghl_id(pool, ghl_message_id)
        .await?
        .ok_or_else(|| not_found(ghl_message_id))?;

    let mut reactions = entry.reactions.0;
    reactions.push(emoji.to_string());
    write_reactions(pool, ghl_message_id, &reactions).await?;

    Ok(reactions)
}

/// Replace the entry's reaction list.
pub async fn replace_reactions(pool: &SqlitePool, ghl_message_id: &str, reactions: &[String]) -> Result<()> {
    write_reactions(pool, ghl_message_id, reactions).await
}

/// Store new text and flag the entry as edited.
pub async fn mark_edited(pool: &SqlitePool, ghl_message_id: &str, new_text: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE message_map SET message_text = ?, is_edited = 1 WHERE ghl_message_id = ?
        "#,
    )
    .bind(new_text)
    .bind(ghl_message_id)
    .execute(pool)
    .await?;

    ensure_touched(result.rows_affected(), ghl_message_id)
}

/// Soft-delete an entry.
pub async fn mark_deleted(pool: &SqlitePool, ghl_message_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE message_map SET is_deleted = 1 WHERE ghl_message_id = ?
        "#,
    )
    .bind(ghl_message_id)
    .execute(pool)
    .await?;

    ensure_touched(result.rows_affected(), ghl_message_id)
}

/// Delete entries created before `cutoff_millis`. Returns the number removed.
pub async fn purge_older_than(pool: &SqlitePool, cutoff_millis: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM message_map WHERE created_at < ?
        "#,
    )
    .bind(cutoff_millis)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

async fn write_reactions(pool: &SqlitePool, ghl_message_id: &str, reactions: &[String]) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE message_map SET reactions = ? WHERE ghl_message_id = ?
        "#,
    )
    .bind(Json(reactions))
    .bind(ghl_message_id)
    .execute(pool)
    .await?;

    ensure_touched(result.rows_affected(), ghl_message_id)
}

fn ensure_touched(rows: u64, ghl_message_id: &str) -> Result<()> {
    if rows == 0 {
        return Err(not_found(ghl_message_id));
    }
    Ok(())
}

fn not_found(ghl_message_id: &str) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "MessageMapEntry",
        id: ghl_message_id.to_string(),
    }
}
