//! SQLite persistence layer for the WhatsApp/CRM bridge.
//!
//! This crate provides async database operations for tenants, CRM locations,
//! gateway instances, the message id map, routing preferences and the
//! processed-message ledger using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{ledger, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:bridge.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Claim a webhook delivery exactly once
//!     if ledger::claim(db.pool(), "tok1:3EB0C767D26A").await? {
//!         println!("first delivery");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod contact_phone;
pub mod error;
pub mod instance;
pub mod ledger;
pub mod location;
pub mod message_map;
pub mod models;
pub mod phone;
pub mod preference;
pub mod tenant;

pub use error::{DatabaseError, Result};
pub use location::NewLocation;
pub use models::{
    ContactInstancePreference, ContactPhone, Instance, InstanceStatus, Location,
    MessageMapEntry, NewMessageMapEntry, Tenant,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Current time in unix milliseconds, the unit of every `*_at` column.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    /// Set high enough to handle concurrent webhook deliveries.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:data/bridge.db?mode=rwc").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Open a migrated in-memory database.
    ///
    /// Every connection of an in-memory SQLite pool is its own database, so
    /// the pool is pinned to a single connection.
    pub async fn connect_in_memory() -> Result<Self> {
        let db = Self::connect_with_pool_size("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn test_db() -> Database {
        Database::connect_in_memory().await.unwrap()
    }

    pub fn sample_tenant(id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: format!("Tenant {id}"),
            role: "member".to_string(),
            track_id: None,
            gateway_base_url: Some("https://gateway.example".to_string()),
            gateway_admin_token: None,
            oauth_client_id: None,
            oauth_client_secret: None,
            language: "pt".to_string(),
            created_at: 1_000,
        }
    }

    pub fn sample_instance(id: &str, tenant_id: &str, location_id: Option<&str>) -> Instance {
        Instance {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            location_id: location_id.map(str::to_string),
            name: format!("Instance {id}"),
            gateway_token: format!("tok-{id}"),
            gateway_base_url: None,
            status: InstanceStatus::Connected,
            phone: Some("5511911112222".to_string()),
            avatar_url: None,
            assigned_user_id: None,
            webhook_url: None,
            ignore_groups: false,
            is_official: false,
            created_at: 1_000,
        }
    }
}
