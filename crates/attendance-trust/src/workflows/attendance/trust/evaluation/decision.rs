use serde::{Deserialize, Serialize};

use super::super::domain::{PolicyMode, RiskLevel, TrustDecision, TrustPolicy};

/// Reason appended when a justification was demanded but not supplied.
pub const REASON_REQUIRED_MISSING: &str = "REASON_REQUIRED_MISSING";

/// Result of running a score through the policy's decision matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: TrustDecision,
    pub requires_reason: bool,
    pub blocked: bool,
}

impl DecisionOutcome {
    const fn passing(decision: TrustDecision, requires_reason: bool) -> Self {
        Self {
            decision,
            requires_reason,
            blocked: false,
        }
    }

    const fn blocking(decision: TrustDecision, requires_reason: bool) -> Self {
        Self {
            decision,
            requires_reason,
            blocked: true,
        }
    }
}

pub fn requires_reason(policy: &TrustPolicy, risk_score: u32, risk_level: RiskLevel) -> bool {
    policy.enabled
        && risk_score >= policy.warn_threshold
        && risk_level.rank() >= policy.require_reason_at_risk.rank()
}

/// Map (mode, thresholds, score, enforce) onto a decision. Rules apply in order.
///
/// `enforce = false` scores and logs without ever blocking; manual entries use it.
pub fn decide(
    policy: &TrustPolicy,
    risk_score: u32,
    risk_level: RiskLevel,
    enforce: bool,
) -> DecisionOutcome {
    let reason = requires_reason(policy, risk_score, risk_level);

    if !policy.enabled || policy.mode == PolicyMode::Observe {
        return DecisionOutcome::passing(TrustDecision::Observed, reason);
    }

    if risk_score < policy.warn_threshold {
        return DecisionOutcome::passing(TrustDecision::Allowed, reason);
    }

    let reaches_hold = enforce && risk_score >= policy.hold_threshold;
    let reaches_deny = enforce && risk_score >= policy.deny_threshold;

    match policy.mode {
        PolicyMode::Observe | PolicyMode::Warn => {
            DecisionOutcome::passing(TrustDecision::Warned, reason)
        }
        PolicyMode::Hold if reaches_hold => DecisionOutcome::blocking(TrustDecision::Held, reason),
        PolicyMode::Hold => DecisionOutcome::passing(TrustDecision::Warned, reason),
        PolicyMode::Deny if reaches_deny => {
            DecisionOutcome::blocking(TrustDecision::Denied, reason)
        }
        PolicyMode::Deny if reaches_hold => DecisionOutcome::blocking(TrustDecision::Held, reason),
        PolicyMode::Deny => DecisionOutcome::passing(TrustDecision::Warned, reason),
    }
}
