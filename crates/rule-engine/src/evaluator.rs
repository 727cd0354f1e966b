//! Per-frame rule evaluation
//!
//! The evaluator is owned by exactly one analysis pass over one video.
//! It keeps the entity track history plus the per-rule episode state
//! needed by transition- and duration-triggered rules, and is torn down
//! (releasing all of it) when the video's analysis completes.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use rules::{CrossDirection, Line, Rule, RuleSpec, RuleType, Zone};
use track_store::{Position, TrackStore};

use crate::frame::{Detection, DetectionFrame};
use crate::geometry;
use crate::violation::{RuleMatch, Violation, ViolationDetail};

/// Clip window (pre, post) seconds for fall evidence.
const FALL_CLIP_PRE_S: f64 = 1.5;
const FALL_CLIP_POST_S: f64 = 3.5;

/// Global evaluation parameters shared by all rules.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Real-world meters per pixel after camera calibration.
    pub pixel_to_meter: f64,
    /// Per-entity track history horizon (frames).
    pub track_horizon: usize,
    /// Minimum time base for a speed estimate; shorter intervals are too
    /// noisy to divide by.
    pub min_speed_interval_s: f64,
    /// Speed estimates above this are discarded as tracker glitches (m/s).
    pub speed_sanity_max: f64,
    /// Look-ahead horizon for collision projection (s).
    pub collision_horizon_s: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            pixel_to_meter: 0.1,
            track_horizon: track_store::DEFAULT_HORIZON,
            min_speed_interval_s: 0.1,
            speed_sanity_max: 100.0,
            collision_horizon_s: 2.0,
        }
    }
}

/// Sustained-condition state for crowd_in_zone.
#[derive(Debug, Clone, Copy)]
struct CrowdEpisode {
    over_since_ms: i64,
    fired: bool,
}

/// Sustained-condition state for approaching pairs.
#[derive(Debug, Clone, Copy)]
struct ApproachEpisode {
    since_ms: i64,
    fired: bool,
}

/// Stateful per-video rule evaluator.
pub struct RuleEvaluator {
    config: EvaluatorConfig,
    video_id: String,
    tracks: TrackStore,
    /// (rule_id, entity_id) → was inside the rule's zone last frame.
    zone_presence: HashMap<(String, String), bool>,
    /// rule_id → current over-capacity episode.
    crowd: HashMap<String, CrowdEpisode>,
    /// (rule_id, entity_a, entity_b) → current closing episode.
    approach: HashMap<(String, String, String), ApproachEpisode>,
    /// (rule_id, entity_id) → displacement condition held last frame.
    fall_active: HashMap<(String, String), bool>,
    /// Rules already reported as misconfigured (warn once, keep going).
    warned_rules: HashSet<String>,
}

impl RuleEvaluator {
    pub fn new(video_id: impl Into<String>, config: EvaluatorConfig) -> Self {
        let horizon = config.track_horizon;
        Self {
            config,
            video_id: video_id.into(),
            tracks: TrackStore::new(horizon),
            zone_presence: HashMap::new(),
            crowd: HashMap::new(),
            approach: HashMap::new(),
            fall_active: HashMap::new(),
            warned_rules: HashSet::new(),
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Number of entities with retained track history.
    pub fn tracked_entities(&self) -> usize {
        self.tracks.entity_count(&self.video_id)
    }

    /// Release every piece of per-video state.
    pub fn clear(&mut self) {
        self.tracks.clear_video(&self.video_id);
        self.zone_presence.clear();
        self.crowd.clear();
        self.approach.clear();
        self.fall_active.clear();
    }

    /// Evaluate all rules against one frame, then fold the frame into the
    /// track history. Returns one match per rule that produced at least
    /// one violation, in the order the rules were given.
    pub fn evaluate(&mut self, frame: &DetectionFrame, rules: &[Rule]) -> Vec<RuleMatch> {
        let mut matches = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            if rule.spec.rule_type() != rule.rule_type {
                self.warn_once(rule, "declared type does not match params");
                continue;
            }

            let violations = self.evaluate_rule(frame, rule);
            if !violations.is_empty() {
                matches.push(RuleMatch {
                    rule_id: rule.id.clone(),
                    rule_type: rule.rule_type,
                    severity: rule.severity,
                    summary: summary_for(rule.rule_type, &violations),
                    violations,
                });
            }
        }

        for detection in &frame.detections {
            self.tracks.record(
                &frame.video_id,
                &detection.entity_id,
                frame.frame_number,
                frame.timestamp_ms,
                detection.position(),
            );
        }

        matches
    }

    fn evaluate_rule(&mut self, frame: &DetectionFrame, rule: &Rule) -> Vec<Violation> {
        let spec = rule.spec.clone();
        match &spec {
            RuleSpec::DistanceBelow {
                min_distance,
                labels,
            } => self.eval_distance_below(frame, *min_distance, labels),
            RuleSpec::ZoneEntry { zone, labels } => self.eval_zone_entry(frame, rule, zone, labels),
            RuleSpec::SpeedOver {
                max_speed,
                zone,
                labels,
            } => self.eval_speed_over(frame, rule, *max_speed, zone.as_ref(), labels),
            RuleSpec::CrowdInZone {
                zone,
                max_count,
                duration,
                labels,
            } => self.eval_crowd_in_zone(frame, rule, zone, *max_count, *duration, labels),
            RuleSpec::LineCross { line, labels } => self.eval_line_cross(frame, rule, line, labels),
            RuleSpec::Approaching { duration, labels } => {
                self.eval_approaching(frame, rule, *duration, labels)
            }
            RuleSpec::CollisionRisk {
                min_distance,
                person_labels,
            } => self.eval_collision_risk(frame, *min_distance, person_labels),
            RuleSpec::FallDetection {
                min_fall_pixels,
                max_frame_gap,
                frame_range,
                labels,
            } => self.eval_fall_detection(
                frame,
                rule,
                *min_fall_pixels,
                *max_frame_gap,
                *frame_range,
                labels,
            ),
        }
    }

    fn meters(&self, pixels: f64) -> f64 {
        pixels * self.config.pixel_to_meter
    }

    fn warn_once(&mut self, rule: &Rule, reason: &str) {
        if self.warned_rules.insert(rule.id.clone()) {
            warn!(rule_id = %rule.id, rule_type = %rule.rule_type, reason, "skipping misconfigured rule");
        }
    }

    fn base_violation(
        &self,
        frame: &DetectionFrame,
        position: Position,
        objects: Vec<String>,
        detail: ViolationDetail,
    ) -> Violation {
        Violation {
            position,
            objects,
            timestamp_ms: frame.timestamp_ms,
            video_id: frame.video_id.clone(),
            frame_number: frame.frame_number,
            detail,
        }
    }

    /// Previous-frame velocity estimate in pixels/second. Prefers the
    /// tracker-supplied value when present.
    fn velocity_of(&self, frame: &DetectionFrame, detection: &Detection) -> Option<(f64, f64)> {
        if let Some([vx, vy]) = detection.velocity {
            return Some((vx, vy));
        }
        let prev = self.tracks.latest(&frame.video_id, &detection.entity_id)?;
        let dt = (frame.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
        if dt <= 0.0 {
            return None;
        }
        Some((
            (detection.center_x - prev.position.x) / dt,
            (detection.center_y - prev.position.y) / dt,
        ))
    }

    // --- distance_below ---------------------------------------------------

    fn eval_distance_below(
        &self,
        frame: &DetectionFrame,
        min_distance: f64,
        labels: &[String],
    ) -> Vec<Violation> {
        let targets: Vec<&Detection> = frame
            .detections
            .iter()
            .filter(|d| has_label(labels, d))
            .collect();

        let mut violations = Vec::new();
        for i in 0..targets.len() {
            for j in (i + 1)..targets.len() {
                let (a, b) = (targets[i], targets[j]);
                let distance = self.meters(a.position().distance_to(&b.position()));
                // Strict inequality: exactly min_distance apart is compliant.
                if distance < min_distance {
                    violations.push(self.base_violation(
                        frame,
                        a.position().midpoint(&b.position()),
                        vec![a.entity_id.clone(), b.entity_id.clone()],
                        ViolationDetail::DistanceBelow {
                            distance,
                            min_distance,
                        },
                    ));
                }
            }
        }
        violations
    }

    // --- zone_entry -------------------------------------------------------

    fn eval_zone_entry(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        zone: &Zone,
        labels: &[String],
    ) -> Vec<Violation> {
        if zone.polygon.len() < 3 {
            self.warn_once(rule, "zone polygon has fewer than 3 vertices");
            return Vec::new();
        }

        let mut violations = Vec::new();
        for detection in frame.detections.iter().filter(|d| has_label(labels, d)) {
            let inside = geometry::point_in_polygon(detection.position(), &zone.polygon);
            let key = (rule.id.clone(), detection.entity_id.clone());
            let was_inside = self.zone_presence.insert(key, inside).unwrap_or(false);

            // Fires on the outside→inside transition only, not on every
            // frame spent inside.
            if inside && !was_inside {
                violations.push(self.base_violation(
                    frame,
                    detection.position(),
                    vec![detection.entity_id.clone()],
                    ViolationDetail::ZoneEntry {
                        zone_name: zone.name.clone(),
                        danger_level: zone.danger_level,
                    },
                ));
            }
        }
        violations
    }

    // --- speed_over -------------------------------------------------------

    fn eval_speed_over(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        max_speed: f64,
        zone: Option<&Zone>,
        labels: &[String],
    ) -> Vec<Violation> {
        if let Some(zone) = zone {
            if zone.polygon.len() < 3 {
                self.warn_once(rule, "zone polygon has fewer than 3 vertices");
                return Vec::new();
            }
        }

        let mut violations = Vec::new();
        for detection in frame.detections.iter().filter(|d| has_label(labels, d)) {
            let Some(prev) = self.tracks.latest(&frame.video_id, &detection.entity_id) else {
                continue;
            };
            let dt = (frame.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
            if dt < self.config.min_speed_interval_s {
                continue;
            }

            let speed = self.meters(prev.position.distance_to(&detection.position())) / dt;
            if speed <= 0.0 || speed > self.config.speed_sanity_max {
                debug!(
                    entity_id = %detection.entity_id,
                    speed,
                    "discarding implausible speed estimate"
                );
                continue;
            }

            if let Some(zone) = zone {
                if !geometry::point_in_polygon(detection.position(), &zone.polygon) {
                    continue;
                }
            }

            if speed > max_speed {
                violations.push(self.base_violation(
                    frame,
                    detection.position(),
                    vec![detection.entity_id.clone()],
                    ViolationDetail::SpeedOver {
                        speed,
                        max_speed,
                        zone_name: zone.map(|z| z.name.clone()),
                    },
                ));
            }
        }
        violations
    }

    // --- crowd_in_zone ----------------------------------------------------

    fn eval_crowd_in_zone(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        zone: &Zone,
        max_count: u32,
        duration: f64,
        labels: &[String],
    ) -> Vec<Violation> {
        if zone.polygon.len() < 3 {
            self.warn_once(rule, "zone polygon has fewer than 3 vertices");
            return Vec::new();
        }

        let inside: Vec<&Detection> = frame
            .detections
            .iter()
            .filter(|d| has_label(labels, d))
            .filter(|d| geometry::point_in_polygon(d.position(), &zone.polygon))
            .collect();
        let count = inside.len() as u32;

        if count <= max_count {
            self.crowd.remove(&rule.id);
            return Vec::new();
        }

        let episode = self.crowd.entry(rule.id.clone()).or_insert(CrowdEpisode {
            over_since_ms: frame.timestamp_ms,
            fired: false,
        });

        let sustained = (frame.timestamp_ms - episode.over_since_ms) as f64 / 1000.0;
        if episode.fired || sustained < duration {
            return Vec::new();
        }
        episode.fired = true;

        let objects = inside.iter().map(|d| d.entity_id.clone()).collect();
        vec![self.base_violation(
            frame,
            geometry::polygon_centroid(&zone.polygon),
            objects,
            ViolationDetail::CrowdInZone {
                zone_name: zone.name.clone(),
                count,
                max_count,
                duration: sustained,
            },
        )]
    }

    // --- line_cross -------------------------------------------------------

    fn eval_line_cross(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        line: &Line,
        labels: &[String],
    ) -> Vec<Violation> {
        if line.points.len() != 2 {
            self.warn_once(rule, "line does not have exactly 2 points");
            return Vec::new();
        }
        let start = Position::new(line.points[0][0], line.points[0][1]);
        let end = Position::new(line.points[1][0], line.points[1][1]);

        let mut violations = Vec::new();
        for detection in frame.detections.iter().filter(|d| has_label(labels, d)) {
            let Some(prev) = self.tracks.latest(&frame.video_id, &detection.entity_id) else {
                continue;
            };

            if !geometry::segments_intersect(prev.position, detection.position(), start, end) {
                continue;
            }

            let before = geometry::side_of_line(start, end, prev.position);
            let crossed = if before > 0.0 {
                CrossDirection::LeftToRight
            } else {
                CrossDirection::RightToLeft
            };

            let direction_matches = match line.direction {
                CrossDirection::Any => true,
                configured => configured == crossed,
            };
            if direction_matches {
                violations.push(self.base_violation(
                    frame,
                    detection.position(),
                    vec![detection.entity_id.clone()],
                    ViolationDetail::LineCross {
                        line_name: line.name.clone(),
                        direction: crossed,
                    },
                ));
            }
        }
        violations
    }

    // --- approaching ------------------------------------------------------

    fn eval_approaching(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        duration: f64,
        labels: &[String],
    ) -> Vec<Violation> {
        let targets: Vec<&Detection> = frame
            .detections
            .iter()
            .filter(|d| has_label(labels, d))
            .collect();

        let mut violations = Vec::new();
        for i in 0..targets.len() {
            for j in (i + 1)..targets.len() {
                // Stable pair key regardless of detection order.
                let (a, b) = if targets[i].entity_id <= targets[j].entity_id {
                    (targets[i], targets[j])
                } else {
                    (targets[j], targets[i])
                };

                let (Some(prev_a), Some(prev_b)) = (
                    self.tracks.latest(&frame.video_id, &a.entity_id),
                    self.tracks.latest(&frame.video_id, &b.entity_id),
                ) else {
                    continue;
                };

                let d_now = self.meters(a.position().distance_to(&b.position()));
                let d_prev = self.meters(prev_a.position.distance_to(&prev_b.position));
                let key = (rule.id.clone(), a.entity_id.clone(), b.entity_id.clone());

                if d_now < d_prev {
                    let episode = self.approach.entry(key).or_insert(ApproachEpisode {
                        since_ms: frame.timestamp_ms,
                        fired: false,
                    });
                    let sustained = (frame.timestamp_ms - episode.since_ms) as f64 / 1000.0;
                    if !episode.fired && sustained >= duration {
                        episode.fired = true;
                        violations.push(self.base_violation(
                            frame,
                            a.position().midpoint(&b.position()),
                            vec![a.entity_id.clone(), b.entity_id.clone()],
                            ViolationDetail::Approaching {
                                approach_duration: sustained,
                                distance: d_now,
                            },
                        ));
                    }
                } else if d_now > d_prev {
                    // Trend broken: a later approach starts a fresh episode.
                    self.approach.remove(&key);
                }
            }
        }
        violations
    }

    // --- collision_risk ---------------------------------------------------

    /// Distance gate identical to distance_below, plus a kinematic check:
    /// the relative velocity must point toward an approach whose closest
    /// pass, within the horizon, is itself under the distance threshold.
    fn eval_collision_risk(
        &self,
        frame: &DetectionFrame,
        min_distance: f64,
        person_labels: &[String],
    ) -> Vec<Violation> {
        let (persons, others): (Vec<&Detection>, Vec<&Detection>) = frame
            .detections
            .iter()
            .partition(|d| has_label(person_labels, d));

        let mut violations = Vec::new();
        for person in &persons {
            for other in &others {
                let distance = self.meters(person.position().distance_to(&other.position()));
                if distance >= min_distance {
                    continue;
                }

                let (Some(vp), Some(vo)) = (
                    self.velocity_of(frame, person),
                    self.velocity_of(frame, other),
                ) else {
                    continue;
                };

                let r = (
                    other.center_x - person.center_x,
                    other.center_y - person.center_y,
                );
                let v = (vo.0 - vp.0, vo.1 - vp.1);
                let r_dot_v = r.0 * v.0 + r.1 * v.1;
                if r_dot_v >= 0.0 {
                    // Separating or parallel, not converging.
                    continue;
                }
                let v_sq = v.0 * v.0 + v.1 * v.1;
                if v_sq <= f64::EPSILON {
                    continue;
                }

                let t_closest = -r_dot_v / v_sq;
                if t_closest > self.config.collision_horizon_s {
                    continue;
                }
                let miss = (
                    r.0 + v.0 * t_closest,
                    r.1 + v.1 * t_closest,
                );
                let miss_distance = self.meters((miss.0 * miss.0 + miss.1 * miss.1).sqrt());
                if miss_distance >= min_distance {
                    continue;
                }

                violations.push(self.base_violation(
                    frame,
                    person.position(),
                    vec![person.entity_id.clone(), other.entity_id.clone()],
                    ViolationDetail::CollisionRisk {
                        distance,
                        min_distance,
                        collision_risk: true,
                    },
                ));
            }
        }
        violations
    }

    // --- fall_detection ---------------------------------------------------

    fn eval_fall_detection(
        &mut self,
        frame: &DetectionFrame,
        rule: &Rule,
        min_fall_pixels: f64,
        max_frame_gap: u64,
        frame_range: Option<(u64, u64)>,
        labels: &[String],
    ) -> Vec<Violation> {
        if let Some((start, end)) = frame_range {
            if frame.frame_number < start || frame.frame_number > end {
                return Vec::new();
            }
        }

        let mut violations = Vec::new();
        for detection in frame.detections.iter().filter(|d| has_label(labels, d)) {
            // Largest downward displacement (y grows downward) against any
            // retained point within the frame-gap window.
            let mut best: Option<(f64, u64, i64)> = None;
            for point in self.tracks.history(&frame.video_id, &detection.entity_id) {
                if point.frame_number >= frame.frame_number {
                    continue;
                }
                let gap = frame.frame_number - point.frame_number;
                if gap > max_frame_gap {
                    continue;
                }
                let y_change = detection.center_y - point.position.y;
                if y_change <= 0.0 {
                    continue;
                }
                if best.map_or(true, |(dy, _, _)| y_change > dy) {
                    best = Some((y_change, gap, frame.timestamp_ms - point.timestamp_ms));
                }
            }

            let falling = best.map_or(false, |(dy, _, _)| dy >= min_fall_pixels);
            let key = (rule.id.clone(), detection.entity_id.clone());
            let was_falling = self.fall_active.insert(key, falling).unwrap_or(false);

            // Edge-triggered: one violation per fall event, not one per
            // frame the displacement window keeps matching.
            if falling && !was_falling {
                let (y_change, frame_gap, elapsed_ms) = best.unwrap_or_default();
                violations.push(self.base_violation(
                    frame,
                    detection.position(),
                    vec![detection.entity_id.clone()],
                    ViolationDetail::FallDetection {
                        pre_duration: FALL_CLIP_PRE_S,
                        post_duration: FALL_CLIP_POST_S,
                        y_change,
                        time_duration: elapsed_ms as f64 / 1000.0,
                        frame_gap,
                        fall_detected: true,
                        record_video: true,
                    },
                ));
            }
        }
        violations
    }
}

fn has_label(labels: &[String], detection: &Detection) -> bool {
    labels.iter().any(|l| l == &detection.label)
}

fn summary_for(rule_type: RuleType, violations: &[Violation]) -> String {
    let n = violations.len();
    match rule_type {
        RuleType::DistanceBelow => {
            format!("Safety distance violation: {n} pair(s) closer than allowed")
        }
        RuleType::ZoneEntry => format!("Danger zone entry: {n} object(s) entered a restricted zone"),
        RuleType::SpeedOver => format!("Overspeed: {n} object(s) above the speed limit"),
        RuleType::CrowdInZone => "Crowding: zone occupancy above limit".to_string(),
        RuleType::LineCross => format!("Safety line crossed: {n} crossing(s)"),
        RuleType::Approaching => format!("Sustained approach: {n} pair(s) closing distance"),
        RuleType::CollisionRisk => format!("Collision risk: {n} close encounter(s)"),
        RuleType::FallDetection => format!("Fall detected: {n} fall event(s)"),
    }
}
