//! Typed rule parameters
//!
//! The wire format carries a loose `params` bag whose meaningful fields
//! depend on the rule type. Internally each rule holds a [`RuleSpec`]
//! variant with only its relevant, validated fields; conversion in both
//! directions happens here so a new rule kind cannot be added without the
//! compiler pointing at every match that needs extending.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::RuleType;
use crate::types::Severity;

/// Named polygon used by zone-scoped rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Ordered vertex list, pixel coordinates.
    pub polygon: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger_level: Option<Severity>,
}

/// Direction filter for line crossings, relative to the line vector
/// (start → end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    #[default]
    Any,
    LeftToRight,
    RightToLeft,
}

/// Named two-point segment used by line_cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Exactly two points: start and end.
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub direction: CrossDirection,
}

/// The loose wire-format parameter bag. Every field is optional here;
/// which ones are required or even recognized depends on the rule type
/// and is enforced by [`RuleSpec::from_bag`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsBag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_fall_pixels: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_gap: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_range: Option<[u64; 2]>,
}

/// Validated, type-keyed rule parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSpec {
    DistanceBelow {
        min_distance: f64,
        labels: Vec<String>,
    },
    ZoneEntry {
        zone: Zone,
        labels: Vec<String>,
    },
    SpeedOver {
        max_speed: f64,
        /// When set, only entities inside the zone are speed-checked.
        zone: Option<Zone>,
        labels: Vec<String>,
    },
    CrowdInZone {
        zone: Zone,
        max_count: u32,
        duration: f64,
        labels: Vec<String>,
    },
    LineCross {
        line: Line,
        labels: Vec<String>,
    },
    Approaching {
        duration: f64,
        labels: Vec<String>,
    },
    CollisionRisk {
        min_distance: f64,
        person_labels: Vec<String>,
    },
    FallDetection {
        min_fall_pixels: f64,
        max_frame_gap: u64,
        frame_range: Option<(u64, u64)>,
        labels: Vec<String>,
    },
}

fn default_labels(kinds: &[&str]) -> Vec<String> {
    kinds.iter().map(|s| s.to_string()).collect()
}

fn validate_zone(rule_type: RuleType, zone: &Zone) -> Result<(), ValidationError> {
    if zone.polygon.len() < 3 {
        return Err(ValidationError::InvalidParam {
            rule_type,
            field: "zone",
            reason: format!("polygon needs at least 3 vertices, got {}", zone.polygon.len()),
        });
    }
    Ok(())
}

fn validate_line(rule_type: RuleType, line: &Line) -> Result<(), ValidationError> {
    if line.points.len() != 2 {
        return Err(ValidationError::InvalidParam {
            rule_type,
            field: "line",
            reason: format!("expected exactly 2 points, got {}", line.points.len()),
        });
    }
    Ok(())
}

fn validate_positive(
    rule_type: RuleType,
    field: &'static str,
    value: f64,
) -> Result<f64, ValidationError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::InvalidParam {
            rule_type,
            field,
            reason: format!("must be a positive finite number, got {value}"),
        })
    }
}

/// Fields each rule type recognizes in the wire bag. Anything else
/// present is rejected rather than silently ignored.
fn recognized_fields(rule_type: RuleType) -> &'static [&'static str] {
    match rule_type {
        RuleType::DistanceBelow => &["min_distance", "labels"],
        RuleType::ZoneEntry => &["zone", "labels"],
        RuleType::SpeedOver => &["max_speed", "zone", "labels"],
        RuleType::CrowdInZone => &["zone", "max_count", "duration", "labels"],
        RuleType::LineCross => &["line", "labels"],
        RuleType::Approaching => &["duration", "labels"],
        RuleType::CollisionRisk => &["min_distance", "person_labels"],
        RuleType::FallDetection => {
            &["min_fall_pixels", "max_frame_gap", "frame_range", "labels"]
        }
    }
}

fn check_unrecognized(rule_type: RuleType, bag: &ParamsBag) -> Result<(), ValidationError> {
    let present: &[(&'static str, bool)] = &[
        ("zone", bag.zone.is_some()),
        ("line", bag.line.is_some()),
        ("duration", bag.duration.is_some()),
        ("labels", bag.labels.is_some()),
        ("person_labels", bag.person_labels.is_some()),
        ("max_speed", bag.max_speed.is_some()),
        ("max_count", bag.max_count.is_some()),
        ("min_distance", bag.min_distance.is_some()),
        ("min_fall_pixels", bag.min_fall_pixels.is_some()),
        ("max_frame_gap", bag.max_frame_gap.is_some()),
        ("frame_range", bag.frame_range.is_some()),
    ];

    let allowed = recognized_fields(rule_type);
    for (field, is_present) in present {
        if *is_present && !allowed.contains(field) {
            return Err(ValidationError::UnrecognizedParam { rule_type, field });
        }
    }
    Ok(())
}

impl RuleSpec {
    /// Build a typed spec from the wire bag, applying per-kind defaults
    /// and rejecting missing, invalid, or unrecognized parameters.
    pub fn from_bag(rule_type: RuleType, bag: &ParamsBag) -> Result<Self, ValidationError> {
        check_unrecognized(rule_type, bag)?;

        match rule_type {
            RuleType::DistanceBelow => Ok(RuleSpec::DistanceBelow {
                min_distance: validate_positive(
                    rule_type,
                    "min_distance",
                    bag.min_distance.unwrap_or(2.0),
                )?,
                labels: bag
                    .labels
                    .clone()
                    .unwrap_or_else(|| default_labels(&["person", "forklift"])),
            }),
            RuleType::ZoneEntry => {
                let zone = bag.zone.clone().ok_or(ValidationError::MissingParam {
                    rule_type,
                    field: "zone",
                })?;
                validate_zone(rule_type, &zone)?;
                Ok(RuleSpec::ZoneEntry {
                    zone,
                    labels: bag
                        .labels
                        .clone()
                        .unwrap_or_else(|| default_labels(&["person", "forklift", "car"])),
                })
            }
            RuleType::SpeedOver => {
                if let Some(zone) = &bag.zone {
                    validate_zone(rule_type, zone)?;
                }
                Ok(RuleSpec::SpeedOver {
                    max_speed: validate_positive(
                        rule_type,
                        "max_speed",
                        bag.max_speed.unwrap_or(5.0),
                    )?,
                    zone: bag.zone.clone(),
                    labels: bag
                        .labels
                        .clone()
                        .unwrap_or_else(|| default_labels(&["forklift", "car", "truck"])),
                })
            }
            RuleType::CrowdInZone => {
                let zone = bag.zone.clone().ok_or(ValidationError::MissingParam {
                    rule_type,
                    field: "zone",
                })?;
                validate_zone(rule_type, &zone)?;
                let max_count = bag.max_count.unwrap_or(3);
                if max_count == 0 {
                    return Err(ValidationError::InvalidParam {
                        rule_type,
                        field: "max_count",
                        reason: "must be at least 1".into(),
                    });
                }
                Ok(RuleSpec::CrowdInZone {
                    zone,
                    max_count,
                    duration: validate_positive(
                        rule_type,
                        "duration",
                        bag.duration.unwrap_or(5.0),
                    )?,
                    labels: bag
                        .labels
                        .clone()
                        .unwrap_or_else(|| default_labels(&["person"])),
                })
            }
            RuleType::LineCross => {
                let line = bag.line.clone().ok_or(ValidationError::MissingParam {
                    rule_type,
                    field: "line",
                })?;
                validate_line(rule_type, &line)?;
                Ok(RuleSpec::LineCross {
                    line,
                    labels: bag
                        .labels
                        .clone()
                        .unwrap_or_else(|| default_labels(&["person", "forklift"])),
                })
            }
            RuleType::Approaching => Ok(RuleSpec::Approaching {
                duration: validate_positive(rule_type, "duration", bag.duration.unwrap_or(3.0))?,
                labels: bag
                    .labels
                    .clone()
                    .unwrap_or_else(|| default_labels(&["person", "forklift"])),
            }),
            RuleType::CollisionRisk => Ok(RuleSpec::CollisionRisk {
                min_distance: validate_positive(
                    rule_type,
                    "min_distance",
                    bag.min_distance.unwrap_or(2.0),
                )?,
                person_labels: bag
                    .person_labels
                    .clone()
                    .unwrap_or_else(|| default_labels(&["person"])),
            }),
            RuleType::FallDetection => {
                let max_frame_gap = bag.max_frame_gap.unwrap_or(30);
                if max_frame_gap == 0 {
                    return Err(ValidationError::InvalidParam {
                        rule_type,
                        field: "max_frame_gap",
                        reason: "must be at least 1".into(),
                    });
                }
                let frame_range = match bag.frame_range {
                    Some([start, end]) if start > end => {
                        return Err(ValidationError::InvalidParam {
                            rule_type,
                            field: "frame_range",
                            reason: format!("start {start} is after end {end}"),
                        })
                    }
                    Some([start, end]) => Some((start, end)),
                    None => None,
                };
                Ok(RuleSpec::FallDetection {
                    min_fall_pixels: validate_positive(
                        rule_type,
                        "min_fall_pixels",
                        bag.min_fall_pixels.unwrap_or(70.0),
                    )?,
                    max_frame_gap,
                    frame_range,
                    labels: bag
                        .labels
                        .clone()
                        .unwrap_or_else(|| default_labels(&["person"])),
                })
            }
        }
    }

    /// Expand back into the wire bag, emitting only the fields this kind
    /// carries.
    pub fn to_bag(&self) -> ParamsBag {
        let mut bag = ParamsBag::default();
        match self {
            RuleSpec::DistanceBelow {
                min_distance,
                labels,
            } => {
                bag.min_distance = Some(*min_distance);
                bag.labels = Some(labels.clone());
            }
            RuleSpec::ZoneEntry { zone, labels } => {
                bag.zone = Some(zone.clone());
                bag.labels = Some(labels.clone());
            }
            RuleSpec::SpeedOver {
                max_speed,
                zone,
                labels,
            } => {
                bag.max_speed = Some(*max_speed);
                bag.zone = zone.clone();
                bag.labels = Some(labels.clone());
            }
            RuleSpec::CrowdInZone {
                zone,
                max_count,
                duration,
                labels,
            } => {
                bag.zone = Some(zone.clone());
                bag.max_count = Some(*max_count);
                bag.duration = Some(*duration);
                bag.labels = Some(labels.clone());
            }
            RuleSpec::LineCross { line, labels } => {
                bag.line = Some(line.clone());
                bag.labels = Some(labels.clone());
            }
            RuleSpec::Approaching { duration, labels } => {
                bag.duration = Some(*duration);
                bag.labels = Some(labels.clone());
            }
            RuleSpec::CollisionRisk {
                min_distance,
                person_labels,
            } => {
                bag.min_distance = Some(*min_distance);
                bag.person_labels = Some(person_labels.clone());
            }
            RuleSpec::FallDetection {
                min_fall_pixels,
                max_frame_gap,
                frame_range,
                labels,
            } => {
                bag.min_fall_pixels = Some(*min_fall_pixels);
                bag.max_frame_gap = Some(*max_frame_gap);
                bag.frame_range = frame_range.map(|(s, e)| [s, e]);
                bag.labels = Some(labels.clone());
            }
        }
        bag
    }

    /// The rule type this spec belongs to.
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleSpec::DistanceBelow { .. } => RuleType::DistanceBelow,
            RuleSpec::ZoneEntry { .. } => RuleType::ZoneEntry,
            RuleSpec::SpeedOver { .. } => RuleType::SpeedOver,
            RuleSpec::CrowdInZone { .. } => RuleType::CrowdInZone,
            RuleSpec::LineCross { .. } => RuleType::LineCross,
            RuleSpec::Approaching { .. } => RuleType::Approaching,
            RuleSpec::CollisionRisk { .. } => RuleType::CollisionRisk,
            RuleSpec::FallDetection { .. } => RuleType::FallDetection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_zone() -> Zone {
        Zone {
            id: Some("zone_1".into()),
            name: "loading dock".into(),
            polygon: vec![[100.0, 100.0], [300.0, 100.0], [300.0, 300.0], [100.0, 300.0]],
            danger_level: Some(Severity::High),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let spec = RuleSpec::from_bag(RuleType::DistanceBelow, &ParamsBag::default()).unwrap();
        match spec {
            RuleSpec::DistanceBelow {
                min_distance,
                labels,
            } => {
                assert_eq!(min_distance, 2.0);
                assert_eq!(labels, vec!["person", "forklift"]);
            }
            other => panic!("wrong spec: {other:?}"),
        }
    }

    #[test]
    fn test_zone_required_for_zone_entry() {
        let err = RuleSpec::from_bag(RuleType::ZoneEntry, &ParamsBag::default()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParam {
                rule_type: RuleType::ZoneEntry,
                field: "zone"
            }
        );
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let bag = ParamsBag {
            zone: Some(Zone {
                id: None,
                name: "broken".into(),
                polygon: vec![[0.0, 0.0], [10.0, 0.0]],
                danger_level: None,
            }),
            ..Default::default()
        };
        let err = RuleSpec::from_bag(RuleType::ZoneEntry, &bag).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParam { field: "zone", .. }));
    }

    #[test]
    fn test_unrecognized_param_rejected() {
        let bag = ParamsBag {
            zone: Some(square_zone()),
            ..Default::default()
        };
        let err = RuleSpec::from_bag(RuleType::DistanceBelow, &bag).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnrecognizedParam {
                rule_type: RuleType::DistanceBelow,
                field: "zone"
            }
        );
    }

    #[test]
    fn test_frame_range_ordering_validated() {
        let bag = ParamsBag {
            frame_range: Some([900, 800]),
            ..Default::default()
        };
        let err = RuleSpec::from_bag(RuleType::FallDetection, &bag).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParam { field: "frame_range", .. }));
    }

    #[test]
    fn test_bag_round_trip() {
        let bag = ParamsBag {
            zone: Some(square_zone()),
            max_count: Some(4),
            duration: Some(5.0),
            labels: Some(vec!["person".into()]),
            ..Default::default()
        };
        let spec = RuleSpec::from_bag(RuleType::CrowdInZone, &bag).unwrap();
        assert_eq!(spec.to_bag(), bag);
    }

    #[test]
    fn test_wire_bag_omits_absent_fields() {
        let spec = RuleSpec::from_bag(RuleType::Approaching, &ParamsBag::default()).unwrap();
        let json = serde_json::to_value(spec.to_bag()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("duration"));
        assert!(obj.contains_key("labels"));
        assert!(!obj.contains_key("zone"));
        assert!(!obj.contains_key("max_speed"));
    }
}
