//! Contact id to phone index.

use sqlx::SqlitePool;

use crate::models::ContactPhone;
use crate::now_millis;
use crate::phone::{self, SUFFIX_MATCH_DIGITS};
use crate::Result;

/// Remember the phone of a CRM contact.
///
/// Phones shorter than a routable number are ignored.
pub async fn upsert_contact_phone(
    pool: &SqlitePool,
    contact_id: &str,
    location_id: &str,
    raw_phone: &str,
) -> Result<()> {
    let digits = phone::normalize(raw_phone);
    if digits.len() < SUFFIX_MATCH_DIGITS {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO contact_phones (contact_id, location_id, phone, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(contact_id) DO UPDATE SET
            location_id = excluded.location_id,
            phone = excluded.phone,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(contact_id)
    .bind(location_id)
    .bind(digits)
    .bind(now_millis())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the stored phone of a contact.
pub async fn get_phone(pool: &SqlitePool, contact_id: &str) -> Result<Option<String>> {
    let phone = sqlx::query_scalar::<_, String>(
        r#"
        SELECT phone FROM contact_phones WHERE contact_id = ?
        "#,
    )
    .bind(contact_id)
    .fetch_optional(pool)
    .await?;

    Ok(phone)
}

/// The first contact id ever recorded for a phone in a location.
///
/// A lead can accumulate several CRM contact ids over time; callers use this
/// one as the canonical id so preference rows converge.
pub async fn canonical_contact_for_phone(
    pool: &SqlitePool,
    location_id: &str,
    raw_phone: &str,
) -> Result<Option<String>> {
    let digits = phone::normalize(raw_phone);
    if digits.len() < SUFFIX_MATCH_DIGITS {
        return Ok(None);
    }

    let pattern = format!("%{}", phone::suffix(&digits, SUFFIX_MATCH_DIGITS));
    let rows = sqlx::query_as::<_, ContactPhone>(
        r#"
        SELECT contact_id, location_id, phone, updated_at
        FROM contact_phones
        WHERE location_id = ? AND phone LIKE ?
        ORDER BY rowid ASC
        "#,
    )
    .bind(location_id)
    .bind(pattern)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .find(|row| phone::phones_match(&row.phone, &digits))
        .map(|row| row.contact_id))
}
