use serde::{Deserialize, Serialize};

use super::super::domain::{RiskLevel, TrustSignals};
use super::super::geo::GeoRisk;

/// Reported accuracy beyond which a location fix is considered weak.
pub const LOW_ACCURACY_METERS: f64 = 200.0;

/// Prefix of the audit-only entry echoing a client-supplied reason code.
pub const REASON_CODE_PREFIX: &str = "REASON_CODE:";

/// Condition contributing points to a capture's risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFactor {
    ManualEntry,
    MissingDeviceSignal,
    NewDevice,
    MissingGeo,
    LowGeoAccuracy,
    OutsideGeofence,
    ImpossibleTravel,
}

impl RiskFactor {
    pub const fn code(self) -> &'static str {
        match self {
            RiskFactor::ManualEntry => "MANUAL_ENTRY",
            RiskFactor::MissingDeviceSignal => "MISSING_DEVICE_SIGNAL",
            RiskFactor::NewDevice => "NEW_DEVICE",
            RiskFactor::MissingGeo => "MISSING_GEO",
            RiskFactor::LowGeoAccuracy => "LOW_GEO_ACCURACY",
            RiskFactor::OutsideGeofence => "OUTSIDE_GEOFENCE",
            RiskFactor::ImpossibleTravel => "IMPOSSIBLE_TRAVEL",
        }
    }

    pub const fn points(self) -> u32 {
        match self {
            RiskFactor::ManualEntry => 35,
            RiskFactor::MissingDeviceSignal => 25,
            RiskFactor::NewDevice => 35,
            RiskFactor::MissingGeo => 20,
            RiskFactor::LowGeoAccuracy => 10,
            RiskFactor::OutsideGeofence => 25,
            RiskFactor::ImpossibleTravel => 35,
        }
    }
}

/// Score, band, and ordered audit reasons for one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub reasons: Vec<String>,
}

/// Additive point model. Factor order is fixed so audit trails are reproducible.
pub fn score_capture(
    signals: &TrustSignals,
    is_known_device: bool,
    is_manual_entry: bool,
    geo: &GeoRisk,
) -> RiskAssessment {
    let mut factors = Vec::new();

    if is_manual_entry {
        factors.push(RiskFactor::ManualEntry);
    }

    if signals.device_hash.is_none() {
        factors.push(RiskFactor::MissingDeviceSignal);
    } else if !is_known_device {
        factors.push(RiskFactor::NewDevice);
    }

    if signals.lacks_geo() {
        factors.push(RiskFactor::MissingGeo);
    }

    if signals
        .accuracy_meters
        .map(|accuracy| accuracy > LOW_ACCURACY_METERS)
        .unwrap_or(false)
    {
        factors.push(RiskFactor::LowGeoAccuracy);
    }

    if geo.outside_geofence {
        factors.push(RiskFactor::OutsideGeofence);
    }

    if geo.impossible_travel {
        factors.push(RiskFactor::ImpossibleTravel);
    }

    let risk_score = factors.iter().map(|factor| factor.points()).sum();
    let mut reasons: Vec<String> = factors
        .iter()
        .map(|factor| factor.code().to_string())
        .collect();

    if let Some(code) = &signals.reason_code {
        reasons.push(format!("{REASON_CODE_PREFIX}{code}"));
    }

    RiskAssessment {
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        factors,
        reasons,
    }
}
