//! Contact instance preference storage.
//!
//! Rows map a lead (by phone and/or CRM contact id) to the instance last used
//! for it within a location. Phones are stored digits-only and matched on
//! their trailing digits (see [`crate::phone`]).

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::ContactInstancePreference;
use crate::now_millis;
use crate::phone::{self, SUFFIX_MATCH_DIGITS};

const PREFERENCE_COLUMNS: &str = r#"
    id, location_id, contact_id, lead_phone, instance_id, created_at, updated_at
"#;

/// All rows of a location whose phone shares the trailing
/// [`SUFFIX_MATCH_DIGITS`] digits with `phone`, best match first.
///
/// Ranking: longer shared suffix first, then oldest row.
pub async fn list_by_phone(
    pool: &SqlitePool,
    location_id: &str,
    phone: &str,
) -> Result<Vec<ContactInstancePreference>> {
    let digits = phone::normalize(phone);
    if digits.is_empty() {
        return Ok(Vec::new());
    }

    let rows = if digits.len() < SUFFIX_MATCH_DIGITS {
        let query = format!(
            "SELECT {PREFERENCE_COLUMNS} FROM contact_instance_preferences \
             WHERE location_id = ? COLLATE NOCASE AND lead_phone = ? \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ContactInstancePreference>(&query)
            .bind(location_id)
            .bind(&digits)
            .fetch_all(pool)
            .await?
    } else {
        let pattern = format!("%{}", phone::suffix(&digits, SUFFIX_MATCH_DIGITS));
        let query = format!(
            "SELECT {PREFERENCE_COLUMNS} FROM contact_instance_preferences \
             WHERE location_id = ? COLLATE NOCASE AND lead_phone LIKE ? \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ContactInstancePreference>(&query)
            .bind(location_id)
            .bind(pattern)
            .fetch_all(pool)
            .await?
    };

    let mut matches: Vec<_> = rows
        .into_iter()
        .filter(|row| {
            row.lead_phone
                .as_deref()
                .is_some_and(|stored| phone::phones_match(stored, &digits))
        })
        .collect();

    // Stable sort keeps the oldest-first order among equal ranks.
    matches.sort_by_key(|row| {
        let stored = row.lead_phone.as_deref().unwrap_or_default();
        std::cmp::Reverse(phone::shared_suffix_len(stored, &digits))
    });

    Ok(matches)
}

/// Best preference row for a lead phone.
pub async fn find_by_phone(
    pool: &SqlitePool,
    location_id: &str,
    phone: &str,
) -> Result<Option<ContactInstancePreference>> {
    Ok(list_by_phone(pool, location_id, phone).await?.into_iter().next())
}

/// Preference row for an exact CRM contact id.
pub async fn find_by_contact(
    pool: &SqlitePool,
    location_id: &str,
    contact_id: &str,
) -> Result<Option<ContactInstancePreference>> {
    let query = format!(
        "SELECT {PREFERENCE_COLUMNS} FROM contact_instance_preferences \
         WHERE location_id = ? COLLATE NOCASE AND contact_id = ?"
    );
    let record = sqlx::query_as::<_, ContactInstancePreference>(&query)
        .bind(location_id)
        .bind(contact_id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Point the best phone-matched row at `instance_id`.
///
/// Returns `false` when no row matches the phone.
pub async fn update_by_phone(
    pool: &SqlitePool,
    location_id: &str,
    phone: &str,
    instance_id: &str,
) -> Result<bool> {
    let Some(row) = find_by_phone(pool, location_id, phone).await? else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE contact_instance_preferences
        SET instance_id = ?, lead_phone = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(instance_id)
    .bind(phone::normalize(phone))
    .bind(now_millis())
    .bind(row.id)
    .execute(pool)
    .await?;

    Ok(true)
}

/// Point the row of an exact contact id at `instance_id`, filling in the
/// phone when one is given.
///
/// Returns `false` when no row exists for the contact.
pub async fn update_by_contact(
    pool: &SqlitePool,
    location_id: &str,
    contact_id: &str,
    instance_id: &str,
    phone: Option<&str>,
) -> Result<bool> {
    let digits = phone.map(phone::normalize).filter(|d| !d.is_empty());
    let result = sqlx::query(
        r#"
        UPDATE contact_instance_preferences
        SET instance_id = ?, lead_phone = COALESCE(?, lead_phone), updated_at = ?
        WHERE location_id = ? COLLATE NOCASE AND contact_id = ?
        "#,
    )
    .bind(instance_id)
    .bind(digits)
    .bind(now_millis())
    .bind(location_id)
    .bind(contact_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert a new preference row.
///
/// Fails with `AlreadyExists` when the (location, contact) pair is taken.
pub async fn insert_preference(
    pool: &SqlitePool,
    location_id: &str,
    instance_id: &str,
    contact_id: Option<&str>,
    phone: Option<&str>,
) -> Result<()> {
    let digits = phone.map(phone::normalize).filter(|d| !d.is_empty());
    if contact_id.is_none() && digits.is_none() {
        return Err(DatabaseError::InvalidInput(
            "preference needs a contact id or a phone".to_string(),
        ));
    }

    let now = now_millis();
    sqlx::query(
        r#"
        INSERT INTO contact_instance_preferences (
            location_id, contact_id, lead_phone, instance_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(location_id)
    .bind(contact_id)
    .bind(digits)
    .bind(instance_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::from_insert(
            e,
            "ContactInstancePreference",
            format!("{}/{}", location_id, contact_id.unwrap_or_default()),
        )
    })?;

    Ok(())
}

/// Create or update the row keyed by (location, contact id).
pub async fn upsert_by_contact(
    pool: &SqlitePool,
    location_id: &str,
    contact_id: &str,
    instance_id: &str,
    phone: Option<&str>,
) -> Result<()> {
    let digits = phone.map(phone::normalize).filter(|d| !d.is_empty());
    let now = now_millis();
    sqlx::query(
        r#"
        INSERT INTO contact_instance_preferences (
            location_id, contact_id, lead_phone, instance_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(location_id, contact_id) DO UPDATE SET
            instance_id = excluded.instance_id,
            lead_phone = COALESCE(excluded.lead_phone, contact_instance_preferences.lead_phone),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(location_id)
    .bind(contact_id)
    .bind(digits)
    .bind(instance_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Collapse the phone-matched rows onto the oldest one, pointed at
/// `instance_id`.
///
/// The survivor is re-pointed before the others are deleted, so whichever
/// row the caller just wrote, the phone keeps resolving to `instance_id`.
/// Returns the number of rows removed. Only touches rows by id.
pub async fn prune_phone_duplicates(
    pool: &SqlitePool,
    location_id: &str,
    phone: &str,
    instance_id: &str,
) -> Result<u64> {
    let mut rows = list_by_phone(pool, location_id, phone).await?;
    if rows.len() < 2 {
        return Ok(0);
    }

    rows.sort_by_key(|row| (row.created_at, row.id));
    let survivor = &rows[0];
    if survivor.instance_id != instance_id {
        sqlx::query(
            r#"
            UPDATE contact_instance_preferences SET instance_id = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(instance_id)
        .bind(now_millis())
        .bind(survivor.id)
        .execute(pool)
        .await?;
    }

    let mut removed = 0;
    for row in rows.iter().skip(1) {
        let result = sqlx::query(
            r#"
            DELETE FROM contact_instance_preferences WHERE id = ?
            "#,
        )
        .bind(row.id)
        .execute(pool)
        .await?;
        removed += result.rows_affected();
    }

    if removed > 0 {
        tracing::debug!(location_id, removed, "Pruned duplicate phone preferences");
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_phone_lookup_tolerates_country_code() {
        let db = test_db().await;
        insert_preference(db.pool(), "L1", "I1", Some("c1"), Some("5511999998888"))
            .await
            .unwrap();

        let with_code = find_by_phone(db.pool(), "L1", "+55 11 99999-8888").await.unwrap();
        let without_code = find_by_phone(db.pool(), "L1", "11999998888").await.unwrap();
        assert_eq!(with_code.map(|p| p.instance_id), Some("I1".to_string()));
        assert_eq!(without_code.map(|p| p.instance_id), Some("I1".to_string()));

        let other_location = find_by_phone(db.pool(), "L2", "11999998888").await.unwrap();
        assert!(other_location.is_none());
    }

    #[tokio::test]
    async fn test_location_match_is_case_insensitive() {
        let db = test_db().await;
        insert_preference(db.pool(), "LocAbc", "I1", Some("c1"), Some("5511999998888"))
            .await
            .unwrap();
        assert!(find_by_phone(db.pool(), "locabc", "5511999998888")
            .await
            .unwrap()
            .is_some());
        assert!(find_by_contact(db.pool(), "LOCABC", "c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_longer_suffix_ranks_first() {
        let db = test_db().await;
        insert_preference(db.pool(), "L1", "I-short", Some("c1"), Some("551199998888"))
            .await
            .unwrap();
        insert_preference(db.pool(), "L1", "I-long", Some("c2"), Some("5511999998888"))
            .await
            .unwrap();

        let best = find_by_phone(db.pool(), "L1", "5511999998888").await.unwrap().unwrap();
        assert_eq!(best.instance_id, "I-long");
    }

    #[tokio::test]
    async fn test_update_paths() {
        let db = test_db().await;
        assert!(!update_by_phone(db.pool(), "L1", "5511999998888", "I2").await.unwrap());
        assert!(!update_by_contact(db.pool(), "L1", "c1", "I2", None).await.unwrap());

        insert_preference(db.pool(), "L1", "I1", Some("c1"), None).await.unwrap();
        assert!(update_by_contact(db.pool(), "L1", "c1", "I2", Some("5511999998888"))
            .await
            .unwrap());
        assert!(update_by_phone(db.pool(), "L1", "11999998888", "I3").await.unwrap());

        let row = find_by_contact(db.pool(), "L1", "c1").await.unwrap().unwrap();
        assert_eq!(row.instance_id, "I3");
        assert_eq!(row.lead_phone.as_deref(), Some("11999998888"));
    }

    #[tokio::test]
    async fn test_insert_conflict_and_upsert() {
        let db = test_db().await;
        insert_preference(db.pool(), "L1", "I1", Some("c1"), None).await.unwrap();
        let err = insert_preference(db.pool(), "L1", "I2", Some("c1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));

        upsert_by_contact(db.pool(), "L1", "c1", "I2", None).await.unwrap();
        let row = find_by_contact(db.pool(), "L1", "c1").await.unwrap().unwrap();
        assert_eq!(row.instance_id, "I2");

        let err = insert_preference(db.pool(), "L1", "I2", None, Some("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_prune_keeps_oldest_pointed_at_new_instance() {
        let db = test_db().await;
        insert_preference(db.pool(), "L1", "I1", Some("c1"), Some("5511999998888"))
            .await
            .unwrap();
        insert_preference(db.pool(), "L1", "I2", Some("c2"), Some("11999998888"))
            .await
            .unwrap();
        insert_preference(db.pool(), "L1", "I3", Some("c3"), Some("5511777776666"))
            .await
            .unwrap();

        let removed = prune_phone_duplicates(db.pool(), "L1", "5511999998888", "I2")
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = list_by_phone(db.pool(), "L1", "5511999998888").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].contact_id.as_deref(), Some("c1"));
        assert_eq!(remaining[0].instance_id, "I2");
        assert!(find_by_contact(db.pool(), "L1", "c3").await.unwrap().is_some());
    }
}
