//! Layered application configuration
//!
//! Defaults < optional `sitewatch.toml` < `SITEWATCH_*` environment
//! overrides (double underscore as section separator, e.g.
//! `SITEWATCH_ENGINE__PIXEL_TO_METER=0.05`).

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;
use alerting::AlertConfig;
use rule_engine::EvaluatorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address for the HTTP server.
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Real-world meters per pixel after camera calibration.
    pub pixel_to_meter: f64,
    /// Per-entity track history horizon (frames).
    pub track_horizon: usize,
    /// Speed estimates above this are discarded as tracker noise (m/s).
    pub speed_sanity_max: f64,
    /// Minimum time base for a speed estimate (s).
    pub min_speed_interval_s: f64,
    /// Collision projection look-ahead (s).
    pub collision_horizon_s: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EvaluatorConfig::default();
        Self {
            pixel_to_meter: defaults.pixel_to_meter,
            track_horizon: defaults.track_horizon,
            speed_sanity_max: defaults.speed_sanity_max,
            min_speed_interval_s: defaults.min_speed_interval_s,
            collision_horizon_s: defaults.collision_horizon_s,
        }
    }
}

impl EngineSettings {
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            pixel_to_meter: self.pixel_to_meter,
            track_horizon: self.track_horizon,
            speed_sanity_max: self.speed_sanity_max,
            min_speed_interval_s: self.min_speed_interval_s,
            collision_horizon_s: self.collision_horizon_s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Per-video cooldown window (seconds of video time).
    pub cooldown_seconds: f64,
    /// Alert store write attempts before degrading.
    pub persist_attempts: u32,
    /// Base backoff between store write attempts (ms).
    pub persist_retry_delay_ms: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        let defaults = AlertConfig::default();
        Self {
            cooldown_seconds: defaults.cooldown_seconds,
            persist_attempts: defaults.persist_attempts,
            persist_retry_delay_ms: defaults.persist_retry_delay_ms,
        }
    }
}

impl AlertSettings {
    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            cooldown_seconds: self.cooldown_seconds,
            persist_attempts: self.persist_attempts,
            persist_retry_delay_ms: self.persist_retry_delay_ms,
            ..AlertConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Per-subscriber queue depth before disconnect.
    pub queue_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSettings {
    /// Base directory the external clip extractor writes into.
    pub base_dir: String,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            base_dir: "clips".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub alerting: AlertSettings,
    pub broker: BrokerSettings,
    pub clips: ClipSettings,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load the layered configuration.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("sitewatch").required(false))
            .add_source(config::Environment::with_prefix("SITEWATCH").separator("__"))
            .build()?
            .try_deserialize()
    }
}
