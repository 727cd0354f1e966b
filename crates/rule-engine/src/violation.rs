//! Rule evaluation output

use serde::{Deserialize, Serialize};

use rules::{CrossDirection, RuleType, Severity};
use track_store::Position;

/// Kind-specific violation payload, flattened into the violation object
/// on the wire. Exactly one variant is populated, selected by the
/// producing rule's type.
///
/// Variant order matters for untagged deserialization: payloads with
/// larger field sets come first so a superset never matches a subset
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViolationDetail {
    FallDetection {
        pre_duration: f64,
        post_duration: f64,
        y_change: f64,
        time_duration: f64,
        frame_gap: u64,
        fall_detected: bool,
        record_video: bool,
    },
    CollisionRisk {
        distance: f64,
        min_distance: f64,
        collision_risk: bool,
    },
    CrowdInZone {
        zone_name: String,
        count: u32,
        max_count: u32,
        duration: f64,
    },
    SpeedOver {
        speed: f64,
        max_speed: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zone_name: Option<String>,
    },
    Approaching {
        approach_duration: f64,
        distance: f64,
    },
    DistanceBelow {
        distance: f64,
        min_distance: f64,
    },
    LineCross {
        line_name: String,
        direction: CrossDirection,
    },
    ZoneEntry {
        zone_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        danger_level: Option<Severity>,
    },
}

/// A single rule match on a single frame, before alert-level dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub position: Position,
    /// Entity ids involved (one for single-entity rules, two for pairs).
    pub objects: Vec<String>,
    pub timestamp_ms: i64,
    pub video_id: String,
    pub frame_number: u64,
    #[serde(flatten)]
    pub detail: ViolationDetail,
}

/// Everything one rule produced for one frame; becomes the alert detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub rule_type: RuleType,
    #[serde(skip)]
    pub severity: Severity,
    pub violations: Vec<Violation>,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_payload_flattens() {
        let violation = Violation {
            position: Position::new(10.0, 20.0),
            objects: vec!["person_1".into(), "forklift_2".into()],
            timestamp_ms: 4000,
            video_id: "v1".into(),
            frame_number: 100,
            detail: ViolationDetail::CollisionRisk {
                distance: 1.2,
                min_distance: 2.0,
                collision_risk: true,
            },
        };

        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["distance"], 1.2);
        assert_eq!(json["min_distance"], 2.0);
        assert_eq!(json["collision_risk"], true);
        assert_eq!(json["objects"][0], "person_1");
        // No tag key leaks into the wire object.
        assert!(json.get("CollisionRisk").is_none());
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_untagged_round_trip_distinguishes_supersets() {
        let collision = ViolationDetail::CollisionRisk {
            distance: 30.0,
            min_distance: 50.0,
            collision_risk: true,
        };
        let json = serde_json::to_value(&collision).unwrap();
        let parsed: ViolationDetail = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, collision);

        let plain = ViolationDetail::DistanceBelow {
            distance: 30.0,
            min_distance: 50.0,
        };
        let json = serde_json::to_value(&plain).unwrap();
        let parsed: ViolationDetail = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, plain);
    }
}
