//! Rule kind and severity enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, inherited by alerts from their rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The supported rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    DistanceBelow,
    ZoneEntry,
    SpeedOver,
    CrowdInZone,
    LineCross,
    Approaching,
    CollisionRisk,
    FallDetection,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::DistanceBelow => "distance_below",
            RuleType::ZoneEntry => "zone_entry",
            RuleType::SpeedOver => "speed_over",
            RuleType::CrowdInZone => "crowd_in_zone",
            RuleType::LineCross => "line_cross",
            RuleType::Approaching => "approaching",
            RuleType::CollisionRisk => "collision_risk",
            RuleType::FallDetection => "fall_detection",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
