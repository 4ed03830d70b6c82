//! Picks the instance that owns an exchange with a lead.

use database::{contact_phone, instance, phone, preference, Database, Instance};
use tracing::debug;

use crate::error::{Result, SyncError};

/// Resolves a CRM location (and optionally a contact) to one connected
/// instance.
///
/// Resolution is a read over current data and never writes. With several
/// connected instances the order is: phone preference, contact preference,
/// then the first instance in list order.
#[derive(Debug, Clone)]
pub struct InstanceResolver {
    db: Database,
}

impl InstanceResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve the instance for a location and optional contact.
    ///
    /// `phone_hint` is used when the contact has no stored phone mapping.
    pub async fn resolve(
        &self,
        location_id: &str,
        contact_id: Option<&str>,
        phone_hint: Option<&str>,
    ) -> Result<Instance> {
        let pool = self.db.pool();
        let mut connected = instance::list_connected_for_location(pool, location_id).await?;

        match connected.len() {
            0 => return Err(SyncError::NoInstanceAvailable(location_id.to_string())),
            1 => return Ok(connected.remove(0)),
            _ => {}
        }

        let mapped_phone = match contact_id {
            Some(contact_id) => contact_phone::get_phone(pool, contact_id).await?,
            None => None,
        };
        let lead_phone = mapped_phone
            .or_else(|| phone_hint.map(phone::normalize))
            .filter(|p| !p.is_empty());

        if let Some(lead_phone) = lead_phone.as_deref() {
            if let Some(pref) = preference::find_by_phone(pool, location_id, lead_phone).await? {
                if let Some(pos) = connected.iter().position(|i| i.id == pref.instance_id) {
                    debug!(location_id, instance_id = %pref.instance_id, "Resolved by phone preference");
                    return Ok(connected.swap_remove(pos));
                }
            }
        }

        if let Some(contact_id) = contact_id {
            if let Some(pref) = preference::find_by_contact(pool, location_id, contact_id).await? {
                if let Some(pos) = connected.iter().position(|i| i.id == pref.instance_id) {
                    debug!(location_id, instance_id = %pref.instance_id, "Resolved by contact preference");
                    return Ok(connected.swap_remove(pos));
                }
            }
        }

        debug!(location_id, "No usable preference, using first connected instance");
        Ok(connected.remove(0))
    }
}
