//! CRM location (sub-account) storage.
//!
//! Two tenants may configure the same CRM location. The owner row
//! (`is_mirror = 0`) receives token writes; mirrored rows are read-only copies.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::Location;
use crate::now_millis;

const LOCATION_COLUMNS: &str = r#"
    id, location_id, tenant_id, access_token, refresh_token, expires_at,
    embed_token, is_mirror, created_at
"#;

/// Data needed to link a CRM location to a tenant.
#[derive(Debug, Clone, Default)]
pub struct NewLocation {
    pub location_id: String,
    pub tenant_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub embed_token: Option<String>,
    pub is_mirror: bool,
}

/// Create or update a location row for a tenant.
pub async fn upsert_location(pool: &SqlitePool, location: &NewLocation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO locations (
            location_id, tenant_id, access_token, refresh_token, expires_at,
            embed_token, is_mirror, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(location_id, tenant_id) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at = excluded.expires_at,
            embed_token = COALESCE(excluded.embed_token, locations.embed_token),
            is_mirror = excluded.is_mirror
        "#,
    )
    .bind(&location.location_id)
    .bind(&location.tenant_id)
    .bind(&location.access_token)
    .bind(&location.refresh_token)
    .bind(location.expires_at)
    .bind(&location.embed_token)
    .bind(location.is_mirror)
    .bind(now_millis())
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Location", location.location_id.clone()))?;

    Ok(())
}

/// Get a CRM location, preferring the owner row over mirrors.
pub async fn get_location(pool: &SqlitePool, location_id: &str) -> Result<Location> {
    let query = format!(
        "SELECT {LOCATION_COLUMNS} FROM locations WHERE location_id = ? \
         ORDER BY is_mirror ASC, id ASC LIMIT 1"
    );
    sqlx::query_as::<_, Location>(&query)
        .bind(location_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Location",
            id: location_id.to_string(),
        })
}

/// Find a location by its public embed token.
pub async fn find_by_embed_token(pool: &SqlitePool, embed_token: &str) -> Result<Option<Location>> {
    let query = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE embed_token = ?");
    let record = sqlx::query_as::<_, Location>(&query)
        .bind(embed_token)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Persist refreshed OAuth tokens on the owner row of a location.
pub async fn update_tokens(
    pool: &SqlitePool,
    location_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_at: i64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE locations
        SET access_token = ?, refresh_token = ?, expires_at = ?
        WHERE location_id = ? AND is_mirror = 0
        "#,
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .bind(location_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Location",
            id: location_id.to_string(),
        });
    }

    Ok(())
}
