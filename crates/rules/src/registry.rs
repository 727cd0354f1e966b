//! Rule registry
//!
//! Rules are stored as independent units in insertion order; evaluation
//! passes take a snapshot of the enabled set at start, so edits made while
//! a pass is running apply from the next pass (hot-swap, no restart).

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::params::RuleSpec;
use crate::rule::{Rule, RuleDraft, RuleUpdate};

/// Concurrent-read rule store. Writers take the lock exclusively, so a
/// reader sees either the old or the new rule set, never a partial write.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: RwLock<Vec<Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with pre-validated rules (e.g. from config).
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// All rules in registry order; optionally only the enabled ones.
    pub async fn list(&self, enabled_only: bool) -> Vec<Rule> {
        self.rules
            .read()
            .await
            .iter()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect()
    }

    /// Snapshot of the enabled rules for one evaluation pass.
    pub async fn snapshot(&self) -> Vec<Rule> {
        self.list(true).await
    }

    pub async fn get(&self, id: &str) -> Option<Rule> {
        self.rules.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }

    /// Validate and insert a new rule; the id is generated here.
    pub async fn create(&self, draft: RuleDraft) -> Result<Rule, RegistryError> {
        let spec = RuleSpec::from_bag(draft.rule_type, &draft.params)?;
        let rule = Rule {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            rule_type: draft.rule_type,
            enabled: draft.enabled,
            severity: draft.severity,
            description: draft.description,
            spec,
        };

        self.rules.write().await.push(rule.clone());
        info!(rule_id = %rule.id, rule_type = %rule.rule_type, "rule created");
        Ok(rule)
    }

    /// Apply a partial update. Params, when present, are validated against
    /// the rule's existing type before anything is written.
    pub async fn update(&self, id: &str, update: RuleUpdate) -> Result<Rule, RegistryError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Validate before mutating so a failure leaves the rule untouched.
        let new_spec = match &update.params {
            Some(bag) => Some(RuleSpec::from_bag(rule.rule_type, bag)?),
            None => None,
        };

        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        if let Some(severity) = update.severity {
            rule.severity = severity;
        }
        if let Some(description) = update.description {
            rule.description = Some(description);
        }
        if let Some(spec) = new_spec {
            rule.spec = spec;
        }

        info!(rule_id = %rule.id, "rule updated");
        Ok(rule.clone())
    }

    /// Remove a rule. Alerts already generated under it are untouched.
    pub async fn delete(&self, id: &str) -> Result<Rule, RegistryError> {
        let mut rules = self.rules.write().await;
        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let removed = rules.remove(idx);
        info!(rule_id = %removed.id, "rule deleted");
        Ok(removed)
    }

    /// Flip a rule's enabled flag without a full update.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Rule, RegistryError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        rule.enabled = enabled;
        info!(rule_id = %rule.id, enabled, "rule toggled");
        Ok(rule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::params::ParamsBag;
    use crate::types::{RuleType, Severity};

    fn draft(rule_type: RuleType) -> RuleDraft {
        RuleDraft {
            name: format!("{rule_type} rule"),
            rule_type,
            enabled: true,
            severity: Severity::Medium,
            description: None,
            params: ParamsBag::default(),
        }
    }

    #[tokio::test]
    async fn test_create_list_get() {
        let registry = RuleRegistry::new();
        let rule = registry.create(draft(RuleType::DistanceBelow)).await.unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(&rule.id).await.unwrap().id, rule.id);
        assert_eq!(registry.list(false).await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_create_leaves_registry_unchanged() {
        let registry = RuleRegistry::new();
        // zone_entry without a zone must be rejected.
        let result = registry.create(draft(RuleType::ZoneEntry)).await;
        assert!(matches!(
            result,
            Err(RegistryError::Validation(ValidationError::MissingParam { .. }))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_disabled_rules_excluded_from_snapshot() {
        let registry = RuleRegistry::new();
        let a = registry.create(draft(RuleType::DistanceBelow)).await.unwrap();
        let _b = registry.create(draft(RuleType::Approaching)).await.unwrap();

        registry.set_enabled(&a.id, false).await.unwrap();

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].rule_type, RuleType::Approaching);
    }

    #[tokio::test]
    async fn test_update_invalid_params_is_atomic() {
        let registry = RuleRegistry::new();
        let rule = registry.create(draft(RuleType::DistanceBelow)).await.unwrap();

        let update = RuleUpdate {
            name: Some("renamed".into()),
            params: Some(ParamsBag {
                min_distance: Some(-1.0),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(registry.update(&rule.id, update).await.is_err());
        // Name must not have been applied alongside the failed params.
        assert_eq!(registry.get(&rule.id).await.unwrap().name, rule.name);
    }

    #[tokio::test]
    async fn test_delete_removes_from_snapshot() {
        let registry = RuleRegistry::new();
        let rule = registry.create(draft(RuleType::FallDetection)).await.unwrap();
        registry.delete(&rule.id).await.unwrap();

        assert!(registry.snapshot().await.is_empty());
        assert!(registry.get(&rule.id).await.is_none());
        assert!(matches!(
            registry.delete(&rule.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
