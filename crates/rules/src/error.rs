//! Rule validation and registry errors

use thiserror::Error;

use crate::types::RuleType;

/// Malformed rule parameters, rejected at the registry boundary so they
/// never reach evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("rule type `{rule_type}` requires param `{field}`")]
    MissingParam {
        rule_type: RuleType,
        field: &'static str,
    },

    #[error("invalid param `{field}` for `{rule_type}`: {reason}")]
    InvalidParam {
        rule_type: RuleType,
        field: &'static str,
        reason: String,
    },

    #[error("param `{field}` is not recognized by rule type `{rule_type}`")]
    UnrecognizedParam {
        rule_type: RuleType,
        field: &'static str,
    },
}

/// Registry operation errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("rule not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
