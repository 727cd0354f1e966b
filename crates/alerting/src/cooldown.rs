//! Per-video alert cooldown
//!
//! At most one alert per video inside the window, measured in video time
//! so replays and faster-than-realtime analysis behave identically.
//! Fall detection bypasses the window entirely: falls are rare and
//! high-severity, and must never be suppressed by an unrelated earlier
//! alert. Fall alerts also do not advance the window for other rules.

use std::collections::HashMap;

use rules::RuleType;

#[derive(Debug)]
pub struct CooldownTracker {
    window_ms: i64,
    /// video_id → video timestamp of the last non-fall alert.
    last_alert_ms: HashMap<String, i64>,
}

impl CooldownTracker {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            window_ms: (window_seconds * 1000.0) as i64,
            last_alert_ms: HashMap::new(),
        }
    }

    /// Whether an alert at `ts_ms` for this video must be suppressed.
    pub fn should_suppress(&self, video_id: &str, ts_ms: i64, rule_type: RuleType) -> bool {
        if rule_type == RuleType::FallDetection {
            return false;
        }
        match self.last_alert_ms.get(video_id) {
            Some(last) => ts_ms - last < self.window_ms,
            None => false,
        }
    }

    /// Record an alert that was actually created.
    pub fn mark(&mut self, video_id: &str, ts_ms: i64, rule_type: RuleType) {
        if rule_type == RuleType::FallDetection {
            return;
        }
        self.last_alert_ms.insert(video_id.to_string(), ts_ms);
    }

    pub fn clear_video(&mut self, video_id: &str) {
        self.last_alert_ms.remove(video_id);
    }
}
