//! Explicit instance actions from the dashboard.
//!
//! Unlike webhook handling these surface typed gateway errors to the caller.

use database::{instance, tenant, Instance, InstanceStatus};
use gateway_client::{ConnectOutcome, ConnectionState, HealthReport, StatusReport};
use tracing::info;

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};

fn to_instance_status(state: ConnectionState) -> InstanceStatus {
    match state {
        ConnectionState::Connected => InstanceStatus::Connected,
        ConnectionState::Connecting => InstanceStatus::Connecting,
        ConnectionState::Disconnected => InstanceStatus::Disconnected,
    }
}

impl SyncEngine {
    /// Load an instance the tenant may act on: its own, or any for admins.
    pub async fn authorize_instance(&self, tenant_id: &str, instance_id: &str) -> Result<Instance> {
        let pool = self.database().pool();
        let found = instance::get_instance(pool, instance_id)
            .await
            .map_err(|e| match e {
                database::DatabaseError::NotFound { .. } => {
                    SyncError::NotFound(format!("instance {instance_id}"))
                }
                other => other.into(),
            })?;

        if found.tenant_id == tenant_id || tenant::is_admin(pool, tenant_id).await? {
            Ok(found)
        } else {
            Err(SyncError::Forbidden(format!(
                "tenant {tenant_id} may not manage instance {instance_id}"
            )))
        }
    }

    /// Poll the gateway and persist the resulting state.
    ///
    /// Polling never fails on gateway errors; an unreachable gateway reads as
    /// disconnected.
    pub async fn refresh_status(&self, inst: &Instance) -> Result<StatusReport> {
        let config = self.gateway_config(inst).await?;
        let report = self.gateway().fetch_status(&config).await;

        instance::update_status(
            self.database().pool(),
            &inst.id,
            to_instance_status(report.state),
            report.phone.as_deref(),
            report.avatar_url.as_deref(),
        )
        .await?;

        Ok(report)
    }

    pub async fn connect_instance(&self, inst: &Instance) -> Result<ConnectOutcome> {
        let config = self.gateway_config(inst).await?;
        let outcome = self.gateway().connect(&config).await?;
        instance::update_status(
            self.database().pool(),
            &inst.id,
            to_instance_status(outcome.status.state),
            outcome.status.phone.as_deref(),
            outcome.status.avatar_url.as_deref(),
        )
        .await?;
        info!(instance_id = %inst.id, qr = outcome.qr_code.is_some(), "Connect requested");
        Ok(outcome)
    }

    /// Renderable QR code image URI.
    pub async fn instance_qr_code(&self, inst: &Instance) -> Result<String> {
        let config = self.gateway_config(inst).await?;
        Ok(self.gateway().fetch_qr_code(&config).await?)
    }

    pub async fn disconnect_instance(&self, inst: &Instance) -> Result<()> {
        let config = self.gateway_config(inst).await?;
        self.gateway().disconnect(&config).await?;
        instance::update_status(
            self.database().pool(),
            &inst.id,
            InstanceStatus::Disconnected,
            None,
            None,
        )
        .await?;
        info!(instance_id = %inst.id, "Instance disconnected");
        Ok(())
    }

    /// Register the webhook on the gateway and remember it.
    ///
    /// Without an explicit URL the engine's public webhook URL is used.
    pub async fn configure_webhook(
        &self,
        inst: &Instance,
        url: Option<&str>,
        ignore_groups: bool,
    ) -> Result<String> {
        let url = url
            .filter(|u| !u.trim().is_empty())
            .or(self.config().public_webhook_url.as_deref())
            .map(|u| u.trim().to_string())
            .ok_or_else(|| SyncError::Configuration("no webhook URL configured".to_string()))?;

        let config = self.gateway_config(inst).await?;
        self.gateway().set_webhook(&config, &url, ignore_groups).await?;
        instance::update_webhook(self.database().pool(), &inst.id, &url, ignore_groups).await?;

        info!(instance_id = %inst.id, url = %url, ignore_groups, "Webhook configured");
        Ok(url)
    }

    /// Probe a gateway, defaulting to the engine's default URL.
    pub async fn gateway_health(&self, base_url: Option<&str>) -> Result<HealthReport> {
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .or(self.config().gateway_default_url.as_deref())
            .ok_or_else(|| SyncError::Configuration("no gateway base URL configured".to_string()))?;
        Ok(self.gateway().health_check(base_url).await)
    }
}
