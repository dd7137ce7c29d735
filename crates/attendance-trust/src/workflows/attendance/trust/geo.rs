use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{EmployeeId, Geofence, OrgId, TrustPolicy, TrustSignals};
use super::repository::{RepositoryError, TrustEventRepository};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Upper bound on how much reported sensor inaccuracy widens a geofence.
pub const MAX_ACCURACY_GRACE_METERS: f64 = 500.0;

const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_meters(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Great-circle distance in meters using the haversine formula on a spherical Earth.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Geographic anomalies detected for one capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRisk {
    pub outside_geofence: bool,
    pub impossible_travel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_speed_kph: Option<f64>,
}

/// True when the point lies beyond the fence radius plus a capped accuracy allowance.
pub fn outside_geofence(fence: &Geofence, point: &GeoPoint, accuracy_meters: Option<f64>) -> bool {
    let grace = accuracy_meters
        .unwrap_or(0.0)
        .max(0.0)
        .min(MAX_ACCURACY_GRACE_METERS);
    fence.center().distance_to(point) > fence.radius_meters + grace
}

/// Speed needed to travel between two punches, or `None` when time did not move forward.
pub fn implied_speed_kph(
    from: &GeoPoint,
    from_at: DateTime<Utc>,
    to: &GeoPoint,
    to_at: DateTime<Utc>,
) -> Option<f64> {
    if from_at >= to_at {
        return None;
    }

    let elapsed_hours = (to_at - from_at).num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_HOUR;
    if elapsed_hours <= 0.0 {
        return None;
    }

    let distance_km = from.distance_to(to) / 1_000.0;
    Some(distance_km / elapsed_hours)
}

/// Flags geofence violations and impossible travel against the employee's punch history.
pub struct GeoRiskEvaluator<E: ?Sized> {
    events: Arc<E>,
}

impl<E> GeoRiskEvaluator<E>
where
    E: TrustEventRepository + ?Sized,
{
    pub fn new(events: Arc<E>) -> Self {
        Self { events }
    }

    pub fn evaluate(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        signals: &TrustSignals,
        policy: &TrustPolicy,
        captured_at: DateTime<Utc>,
    ) -> Result<GeoRisk, RepositoryError> {
        let Some(point) = signals.point() else {
            return Ok(GeoRisk::default());
        };

        let outside = policy
            .geofence
            .as_ref()
            .map(|fence| outside_geofence(fence, &point, signals.accuracy_meters))
            .unwrap_or(false);

        let implied_speed = self
            .events
            .latest_geo_event_before(org_id, employee_id, captured_at)?
            .and_then(|previous| {
                let previous_point = previous.point()?;
                implied_speed_kph(&previous_point, previous.captured_at, &point, captured_at)
            });

        let impossible_travel = implied_speed
            .map(|speed| speed > policy.impossible_travel_speed_kph)
            .unwrap_or(false);

        debug!(
            org_id = %org_id,
            employee_id = %employee_id,
            outside_geofence = outside,
            implied_speed_kph = ?implied_speed,
            "evaluated geo risk"
        );

        Ok(GeoRisk {
            outside_geofence: outside,
            impossible_travel,
            implied_speed_kph: implied_speed,
        })
    }
}
