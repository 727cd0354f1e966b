//! Rule resource
//!
//! Wire shape: `{id, name, type, enabled, severity, description, params}`.
//! The loose `params` object is converted to a typed [`RuleSpec`] on the
//! way in (where validation happens) and expanded back on the way out.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::params::{ParamsBag, RuleSpec};
use crate::types::{RuleType, Severity};

/// A validated rule as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleWire", into = "RuleWire")]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub rule_type: RuleType,
    pub enabled: bool,
    pub severity: Severity,
    pub description: Option<String>,
    pub spec: RuleSpec,
}

/// Exact wire representation of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleWire {
    id: String,
    name: String,
    #[serde(rename = "type")]
    rule_type: RuleType,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    params: ParamsBag,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RuleWire> for Rule {
    type Error = ValidationError;

    fn try_from(wire: RuleWire) -> Result<Self, Self::Error> {
        let spec = RuleSpec::from_bag(wire.rule_type, &wire.params)?;
        Ok(Rule {
            id: wire.id,
            name: wire.name,
            rule_type: wire.rule_type,
            enabled: wire.enabled,
            severity: wire.severity,
            description: wire.description,
            spec,
        })
    }
}

impl From<Rule> for RuleWire {
    fn from(rule: Rule) -> Self {
        RuleWire {
            id: rule.id,
            name: rule.name,
            rule_type: rule.rule_type,
            enabled: rule.enabled,
            severity: rule.severity,
            description: rule.description,
            params: rule.spec.to_bag(),
        }
    }
}

/// Payload for rule creation. The id is assigned by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: ParamsBag,
}

/// Partial update payload. The rule type is immutable; new params are
/// validated against the existing type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub params: Option<ParamsBag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_wire_round_trip() {
        let wire = json!({
            "id": "r-1",
            "name": "no forklifts near people",
            "type": "distance_below",
            "enabled": true,
            "severity": "high",
            "description": "keeps pedestrians clear",
            "params": { "min_distance": 1.5, "labels": ["person", "forklift"] }
        });

        let rule: Rule = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(rule.rule_type, RuleType::DistanceBelow);
        assert_eq!(rule.severity, Severity::High);

        let back = serde_json::to_value(rule).unwrap();
        assert_eq!(back["type"], "distance_below");
        assert_eq!(back["params"]["min_distance"], 1.5);
        assert_eq!(back["params"]["labels"], json!(["person", "forklift"]));
    }

    #[test]
    fn test_mismatched_params_rejected_on_deserialize() {
        let wire = json!({
            "id": "r-2",
            "name": "bad rule",
            "type": "line_cross",
            "params": { "max_speed": 9.0 }
        });
        let result: Result<Rule, _> = serde_json::from_value(wire);
        assert!(result.is_err());
    }
}
