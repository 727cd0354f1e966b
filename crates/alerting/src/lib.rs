//! Alerting Pipeline
//!
//! Turns rule matches into durable, user-facing alerts: per-video
//! cooldown with a fall-detection exemption, retry-based dedup, clip
//! window selection, persistence before fan-out, and the alert status
//! lifecycle.

mod alert;
mod clip;
mod cooldown;
mod generator;
mod store;

pub use alert::{Alert, AlertStatus};
pub use clip::{clip_window, ClipError, ClipExtractor, ClipRequest};
pub use cooldown::CooldownTracker;
pub use generator::{AlertConfig, AlertError, AlertGenerator};
pub use store::{AlertFilter, AlertStore, StoreError};
