//! Safety Rule Model & Registry
//!
//! Defines the eight rule kinds, their typed parameter sets, wire-format
//! conversion with validation at the registry boundary, and the
//! hot-reloadable rule registry consumed by evaluation passes.

mod error;
mod params;
mod registry;
mod rule;
mod types;

pub use error::{RegistryError, ValidationError};
pub use params::{CrossDirection, Line, ParamsBag, RuleSpec, Zone};
pub use registry::RuleRegistry;
pub use rule::{Rule, RuleDraft, RuleUpdate};
pub use types::{RuleType, Severity};
