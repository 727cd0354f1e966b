//! Rule Evaluator
//!
//! Evaluates every enabled safety rule against one frame of detections
//! plus the retained entity track history:
//! - Proximity rules (distance_below, approaching, collision_risk)
//! - Zone rules (zone_entry, crowd_in_zone, zone-scoped speed_over)
//! - Motion rules (speed_over, line_cross, fall_detection)
//!
//! Rules are evaluated independently and additively in registry order;
//! one frame may produce matches for several rules at once.

pub mod evaluator;
pub mod frame;
pub mod geometry;
pub mod violation;

pub use evaluator::{EvaluatorConfig, RuleEvaluator};
pub use frame::{Detection, DetectionFrame};
pub use violation::{RuleMatch, Violation, ViolationDetail};
