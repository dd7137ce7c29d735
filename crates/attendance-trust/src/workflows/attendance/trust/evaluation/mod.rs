mod config;
mod decision;
mod rules;

pub use config::TrustEngineConfig;
pub use decision::{decide, requires_reason, DecisionOutcome, REASON_REQUIRED_MISSING};
pub use rules::{
    score_capture, RiskAssessment, RiskFactor, LOW_ACCURACY_METERS, REASON_CODE_PREFIX,
};

use serde::{Deserialize, Serialize};

use super::domain::{
    EventType, PendingAction, PolicyMode, RiskLevel, TrustDecision, TrustPolicy, TrustSignals,
};
use super::geo::GeoRisk;

/// Full verdict for one capture: score, matrix decision, and reason gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureAssessment {
    pub event_type: EventType,
    pub policy_mode: PolicyMode,
    pub decision: TrustDecision,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub requires_reason: bool,
    pub blocked: bool,
    /// A justification was demanded and none was supplied.
    pub missing_reason: bool,
    pub geo: GeoRisk,
    /// Write that approval would perform, reported when the capture would be held.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

/// What the caller must do with an assessed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureGate {
    Proceed,
    ReasonRequired,
    Hold,
    Deny,
}

impl CaptureAssessment {
    pub fn gate(&self) -> CaptureGate {
        if self.missing_reason {
            CaptureGate::ReasonRequired
        } else if !self.blocked {
            CaptureGate::Proceed
        } else if self.decision == TrustDecision::Held {
            CaptureGate::Hold
        } else {
            CaptureGate::Deny
        }
    }
}

/// Score the signals and run the decision matrix.
///
/// Enforced captures that need a reason and lack one are turned into a blocked denial
/// carrying `REASON_REQUIRED_MISSING`. Unenforced captures are never blocked.
pub fn assess_capture(
    policy: &TrustPolicy,
    event_type: EventType,
    signals: &TrustSignals,
    is_known_device: bool,
    geo: GeoRisk,
    enforce: bool,
) -> CaptureAssessment {
    let RiskAssessment {
        risk_score,
        risk_level,
        mut reasons,
        ..
    } = score_capture(
        signals,
        is_known_device,
        event_type == EventType::ManualEntry,
        &geo,
    );
    let outcome = decide(policy, risk_score, risk_level, enforce);

    let missing_reason = enforce && outcome.requires_reason && !signals.has_reason();
    let (decision, blocked) = if missing_reason {
        reasons.push(REASON_REQUIRED_MISSING.to_string());
        (TrustDecision::Denied, true)
    } else {
        (outcome.decision, outcome.blocked)
    };

    CaptureAssessment {
        event_type,
        policy_mode: policy.mode,
        decision,
        risk_score,
        risk_level,
        reasons,
        requires_reason: outcome.requires_reason,
        blocked,
        missing_reason,
        geo,
        pending_action: None,
    }
}
