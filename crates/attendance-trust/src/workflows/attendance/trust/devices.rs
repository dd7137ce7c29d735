use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::telemetry::AUDIT_TARGET;

use super::domain::{DeviceStatus, EmployeeId, OrgId, TrustedDevice, Viewer};
use super::repository::{DeviceRepository, RepositoryError};

/// Tracks which device fingerprints have produced accepted punches for an employee.
pub struct DeviceTrustTracker<D: ?Sized> {
    repository: Arc<D>,
}

impl<D> DeviceTrustTracker<D>
where
    D: DeviceRepository + ?Sized,
{
    pub fn new(repository: Arc<D>) -> Self {
        Self { repository }
    }

    pub fn is_trusted(
        &self,
        employee_id: &EmployeeId,
        device_hash: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let Some(hash) = device_hash else {
            return Ok(false);
        };

        Ok(self
            .repository
            .fetch_device(employee_id, hash)?
            .map(|device| device.status == DeviceStatus::Active)
            .unwrap_or(false))
    }

    /// Count a successful punch. Revoked devices are left untouched.
    pub fn record_seen(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        device_hash: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let Some(hash) = device_hash else {
            return Ok(());
        };

        match self.repository.fetch_device(employee_id, hash)? {
            None => {
                debug!(employee_id = %employee_id, "learned new trusted device");
                self.repository.store_device(TrustedDevice {
                    org_id: org_id.clone(),
                    employee_id: employee_id.clone(),
                    device_hash: hash.to_string(),
                    first_seen_at: at,
                    last_seen_at: at,
                    successful_punches: 1,
                    status: DeviceStatus::Active,
                })
            }
            Some(mut device) if device.status == DeviceStatus::Active => {
                device.last_seen_at = at;
                device.successful_punches = device.successful_punches.saturating_add(1);
                self.repository.store_device(device)
            }
            Some(_) => Ok(()),
        }
    }

    /// Explicit administrative revocation; trust is never re-earned afterwards.
    pub fn revoke(
        &self,
        viewer: &Viewer,
        employee_id: &EmployeeId,
        device_hash: &str,
    ) -> Result<TrustedDevice, DeviceError> {
        if !viewer.role.can_administer_policy() {
            return Err(DeviceError::Unauthorized(format!(
                "role {} cannot revoke devices",
                viewer.role.label()
            )));
        }

        let mut device = self
            .repository
            .fetch_device(employee_id, device_hash)?
            .filter(|device| device.org_id == viewer.org_id)
            .ok_or(DeviceError::NotFound)?;

        device.status = DeviceStatus::Revoked;
        self.repository.store_device(device.clone())?;

        info!(
            target: AUDIT_TARGET,
            employee_id = %employee_id,
            revoked_by = %viewer.user_id,
            "trusted device revoked"
        );

        Ok(device)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("device not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
