use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::super::domain::TrustPolicy;

/// Engine settings injected at startup rather than compiled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEngineConfig {
    /// Policy applied to organizations that never configured one.
    pub default_policy: TrustPolicy,
    /// Clock-ins after this UTC time of day are recorded as late.
    pub late_after: NaiveTime,
}

impl TrustEngineConfig {
    pub const DEFAULT_LATE_AFTER: (u32, u32) = (9, 30);

    pub fn default_late_after() -> NaiveTime {
        let (hour, minute) = Self::DEFAULT_LATE_AFTER;
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl Default for TrustEngineConfig {
    fn default() -> Self {
        Self {
            default_policy: TrustPolicy::default(),
            late_after: Self::default_late_after(),
        }
    }
}
