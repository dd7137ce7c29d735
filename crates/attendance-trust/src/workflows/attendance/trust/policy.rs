use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::telemetry::AUDIT_TARGET;

use super::domain::{Geofence, OrgId, OrgPolicy, PolicyMode, ReasonRiskLevel, TrustPolicy, Viewer};
use super::repository::{PolicyRepository, RepositoryError};

/// Requested policy as submitted by an administrator, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub mode: PolicyMode,
    pub warn_threshold: i64,
    pub hold_threshold: i64,
    pub deny_threshold: i64,
    #[serde(default = "default_reason_level")]
    pub require_reason_at_risk: ReasonRiskLevel,
    #[serde(default = "default_travel_speed")]
    pub impossible_travel_speed_kph: f64,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_reason_level() -> ReasonRiskLevel {
    TrustPolicy::default().require_reason_at_risk
}

fn default_travel_speed() -> f64 {
    TrustPolicy::default().impossible_travel_speed_kph
}

fn default_enabled() -> bool {
    true
}

impl PolicyUpdate {
    pub fn into_policy(self) -> Result<TrustPolicy, PolicyViolation> {
        let policy = TrustPolicy {
            mode: self.mode,
            warn_threshold: threshold("warn", self.warn_threshold)?,
            hold_threshold: threshold("hold", self.hold_threshold)?,
            deny_threshold: threshold("deny", self.deny_threshold)?,
            require_reason_at_risk: self.require_reason_at_risk,
            impossible_travel_speed_kph: self.impossible_travel_speed_kph,
            geofence: self.geofence,
            enabled: self.enabled,
        };
        validate_policy(&policy)?;
        Ok(policy)
    }
}

impl From<&TrustPolicy> for PolicyUpdate {
    fn from(policy: &TrustPolicy) -> Self {
        Self {
            mode: policy.mode,
            warn_threshold: i64::from(policy.warn_threshold),
            hold_threshold: i64::from(policy.hold_threshold),
            deny_threshold: i64::from(policy.deny_threshold),
            require_reason_at_risk: policy.require_reason_at_risk,
            impossible_travel_speed_kph: policy.impossible_travel_speed_kph,
            geofence: policy.geofence,
            enabled: policy.enabled,
        }
    }
}

fn threshold(name: &'static str, value: i64) -> Result<u32, PolicyViolation> {
    if value < 0 {
        return Err(PolicyViolation::NegativeThreshold { name, value });
    }
    u32::try_from(value).map_err(|_| PolicyViolation::ThresholdOutOfRange { name, value })
}

/// Ordering, speed, and geofence checks shared by upserts and configured defaults.
pub fn validate_policy(policy: &TrustPolicy) -> Result<(), PolicyViolation> {
    if policy.warn_threshold > policy.hold_threshold {
        return Err(PolicyViolation::ThresholdOrder {
            lower: "warn",
            lower_value: policy.warn_threshold,
            upper: "hold",
            upper_value: policy.hold_threshold,
        });
    }
    if policy.hold_threshold > policy.deny_threshold {
        return Err(PolicyViolation::ThresholdOrder {
            lower: "hold",
            lower_value: policy.hold_threshold,
            upper: "deny",
            upper_value: policy.deny_threshold,
        });
    }

    let speed = policy.impossible_travel_speed_kph;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(PolicyViolation::TravelSpeed(speed));
    }

    if let Some(fence) = &policy.geofence {
        if !fence.latitude.is_finite() || !(-90.0..=90.0).contains(&fence.latitude) {
            return Err(PolicyViolation::GeofenceLatitude(fence.latitude));
        }
        if !fence.longitude.is_finite() || !(-180.0..=180.0).contains(&fence.longitude) {
            return Err(PolicyViolation::GeofenceLongitude(fence.longitude));
        }
        if !fence.radius_meters.is_finite() || fence.radius_meters <= 0.0 {
            return Err(PolicyViolation::GeofenceRadius(fence.radius_meters));
        }
    }

    Ok(())
}

/// Specific constraint a submitted policy violated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("{name} threshold must be non-negative (found {value})")]
    NegativeThreshold { name: &'static str, value: i64 },
    #[error("{name} threshold {value} is out of range")]
    ThresholdOutOfRange { name: &'static str, value: i64 },
    #[error("{lower} threshold ({lower_value}) must not exceed {upper} threshold ({upper_value})")]
    ThresholdOrder {
        lower: &'static str,
        lower_value: u32,
        upper: &'static str,
        upper_value: u32,
    },
    #[error("impossible travel speed must be a positive number of km/h (found {0})")]
    TravelSpeed(f64),
    #[error("geofence latitude must be within [-90, 90] (found {0})")]
    GeofenceLatitude(f64),
    #[error("geofence longitude must be within [-180, 180] (found {0})")]
    GeofenceLongitude(f64),
    #[error("geofence radius must be a positive number of meters (found {0})")]
    GeofenceRadius(f64),
}

/// Error raised while reading or administering policies.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid policy: {0}")]
    Invalid(#[from] PolicyViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Resolves the active policy per organization, falling back to injected defaults.
pub struct TrustPolicyStore<P: ?Sized> {
    repository: Arc<P>,
    defaults: TrustPolicy,
}

impl<P> TrustPolicyStore<P>
where
    P: PolicyRepository + ?Sized,
{
    pub fn new(repository: Arc<P>, defaults: TrustPolicy) -> Self {
        Self {
            repository,
            defaults,
        }
    }

    pub fn defaults(&self) -> &TrustPolicy {
        &self.defaults
    }

    pub fn resolve(&self, org_id: &OrgId) -> Result<TrustPolicy, RepositoryError> {
        Ok(self.get(org_id)?.policy)
    }

    /// Stored policy with its stamps, or the defaults with no stamps.
    pub fn get(&self, org_id: &OrgId) -> Result<OrgPolicy, RepositoryError> {
        let stored = self.repository.fetch_policy(org_id)?;
        Ok(stored.unwrap_or_else(|| OrgPolicy {
            org_id: org_id.clone(),
            policy: self.defaults.clone(),
            updated_by: None,
            updated_at: None,
        }))
    }

    pub fn upsert(
        &self,
        viewer: &Viewer,
        org_id: &OrgId,
        update: PolicyUpdate,
        at: DateTime<Utc>,
    ) -> Result<OrgPolicy, PolicyError> {
        if !viewer.role.can_administer_policy() {
            return Err(PolicyError::Unauthorized(format!(
                "role {} cannot administer attendance trust policy",
                viewer.role.label()
            )));
        }
        if &viewer.org_id != org_id {
            return Err(PolicyError::Unauthorized(
                "policy belongs to another organization".to_string(),
            ));
        }

        let policy = update.into_policy()?;
        let stored = OrgPolicy {
            org_id: org_id.clone(),
            policy,
            updated_by: Some(viewer.user_id.clone()),
            updated_at: Some(at),
        };
        self.repository.store_policy(stored.clone())?;

        info!(
            target: AUDIT_TARGET,
            org_id = %org_id,
            updated_by = %viewer.user_id,
            mode = stored.policy.mode.label(),
            enabled = stored.policy.enabled,
            "attendance trust policy updated"
        );

        Ok(stored)
    }
}
