//! Tenant storage.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::Tenant;

const TENANT_COLUMNS: &str = r#"
    id, name, role, track_id, gateway_base_url, gateway_admin_token,
    oauth_client_id, oauth_client_secret, language, created_at
"#;

/// Create a new tenant.
pub async fn create_tenant(pool: &SqlitePool, tenant: &Tenant) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tenants (
            id, name, role, track_id, gateway_base_url, gateway_admin_token,
            oauth_client_id, oauth_client_secret, language, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tenant.id)
    .bind(&tenant.name)
    .bind(&tenant.role)
    .bind(&tenant.track_id)
    .bind(&tenant.gateway_base_url)
    .bind(&tenant.gateway_admin_token)
    .bind(&tenant.oauth_client_id)
    .bind(&tenant.oauth_client_secret)
    .bind(&tenant.language)
    .bind(tenant.created_at)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Tenant", tenant.id.clone()))?;

    Ok(())
}

/// Get a tenant by ID.
pub async fn get_tenant(pool: &SqlitePool, id: &str) -> Result<Tenant> {
    let query = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?");
    sqlx::query_as::<_, Tenant>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Tenant",
            id: id.to_string(),
        })
}

/// Whether the tenant carries the admin role.
///
/// Unknown tenants are not admins.
pub async fn is_admin(pool: &SqlitePool, id: &str) -> Result<bool> {
    let role = sqlx::query_scalar::<_, String>(
        r#"
        SELECT role FROM tenants WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(role.as_deref() == Some("admin"))
}

/// Set the echo-suppression track id for a tenant.
pub async fn set_track_id(pool: &SqlitePool, id: &str, track_id: Option<&str>) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE tenants SET track_id = ? WHERE id = ?
        "#,
    )
    .bind(track_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Tenant",
            id: id.to_string(),
        });
    }

    Ok(())
}
