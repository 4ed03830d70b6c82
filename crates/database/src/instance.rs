//! Instance (WhatsApp connection) storage.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Instance, InstanceStatus};

const INSTANCE_COLUMNS: &str = r#"
    id, tenant_id, location_id, name, gateway_token, gateway_base_url, status,
    phone, avatar_url, assigned_user_id, webhook_url, ignore_groups, is_official,
    created_at
"#;

/// Create a new instance.
pub async fn create_instance(pool: &SqlitePool, instance: &Instance) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO instances (
            id, tenant_id, location_id, name, gateway_token, gateway_base_url, status,
            phone, avatar_url, assigned_user_id, webhook_url, ignore_groups, is_official,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&instance.id)
    .bind(&instance.tenant_id)
    .bind(&instance.location_id)
    .bind(&instance.name)
    .bind(&instance.gateway_token)
    .bind(&instance.gateway_base_url)
    .bind(instance.status)
    .bind(&instance.phone)
    .bind(&instance.avatar_url)
    .bind(&instance.assigned_user_id)
    .bind(&instance.webhook_url)
    .bind(instance.ignore_groups)
    .bind(instance.is_official)
    .bind(instance.created_at)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Instance", instance.id.clone()))?;

    Ok(())
}

/// Get an instance by ID.
pub async fn get_instance(pool: &SqlitePool, id: &str) -> Result<Instance> {
    let query = format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?");
    sqlx::query_as::<_, Instance>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Instance",
            id: id.to_string(),
        })
}

/// Find the instance that owns a gateway token.
pub async fn find_by_token(pool: &SqlitePool, gateway_token: &str) -> Result<Option<Instance>> {
    let query = format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE gateway_token = ?");
    let record = sqlx::query_as::<_, Instance>(&query)
        .bind(gateway_token)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// List the connected instances of a CRM location in default list order
/// (creation time, then insertion order).
pub async fn list_connected_for_location(
    pool: &SqlitePool,
    location_id: &str,
) -> Result<Vec<Instance>> {
    let query = format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances \
         WHERE location_id = ? AND status = 'connected' \
         ORDER BY created_at ASC, rowid ASC"
    );
    let instances = sqlx::query_as::<_, Instance>(&query)
        .bind(location_id)
        .fetch_all(pool)
        .await?;

    Ok(instances)
}

/// Persist a polled connection state.
///
/// Phone and avatar are only overwritten when the poll resolved them.
pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    status: InstanceStatus,
    phone: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE instances
        SET status = ?,
            phone = COALESCE(?, phone),
            avatar_url = COALESCE(?, avatar_url)
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(phone)
    .bind(avatar_url)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Instance",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Persist the webhook configuration of an instance.
pub async fn update_webhook(
    pool: &SqlitePool,
    id: &str,
    webhook_url: &str,
    ignore_groups: bool,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE instances
        SET webhook_url = ?, ignore_groups = ?
        WHERE id = ?
        "#,
    )
    .bind(webhook_url)
    .bind(ignore_groups)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Instance",
            id: id.to_string(),
        });
    }

    Ok(())
}
