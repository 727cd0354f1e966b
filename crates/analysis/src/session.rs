//! Sequential per-video evaluation session

use tracing::{debug, info, warn};

use alerting::{Alert, AlertGenerator};
use rule_engine::{DetectionFrame, EvaluatorConfig, RuleEvaluator};
use rules::Rule;

/// End-of-pass accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub video_id: String,
    pub frames_processed: u64,
    pub alerts_created: u64,
    /// Alerts lost because the store stayed unavailable through retries.
    pub persist_failures: u64,
}

/// Evaluator + generator for one video, fed frames in order.
///
/// The rule set is the snapshot taken at construction; edits made in the
/// registry while this session runs apply from the next video's pass.
pub struct AnalysisSession {
    rules: Vec<Rule>,
    evaluator: RuleEvaluator,
    generator: AlertGenerator,
    summary: AnalysisSummary,
}

impl AnalysisSession {
    pub fn new(
        video_id: impl Into<String>,
        rules: Vec<Rule>,
        evaluator_config: EvaluatorConfig,
        generator: AlertGenerator,
    ) -> Self {
        let video_id = video_id.into();
        info!(
            video_id = %video_id,
            rule_count = rules.len(),
            "starting analysis pass"
        );
        Self {
            evaluator: RuleEvaluator::new(video_id.clone(), evaluator_config),
            rules,
            generator,
            summary: AnalysisSummary {
                video_id,
                ..Default::default()
            },
        }
    }

    /// Evaluate one frame and generate alerts for its rule matches.
    ///
    /// A persistence failure costs that one alert, never the pass: it is
    /// logged, counted, and evaluation continues with the next match.
    pub async fn process_frame(&mut self, frame: &DetectionFrame) -> Vec<Alert> {
        let matches = self.evaluator.evaluate(frame, &self.rules);
        let mut created = Vec::new();

        for rule_match in matches {
            match self.generator.process(rule_match).await {
                Ok(Some(alert)) => created.push(alert),
                Ok(None) => {}
                Err(e) => {
                    self.summary.persist_failures += 1;
                    warn!(
                        video_id = %self.summary.video_id,
                        frame_number = frame.frame_number,
                        error = %e,
                        "alert dropped, continuing pass in degraded mode"
                    );
                }
            }
        }

        self.summary.frames_processed += 1;
        self.summary.alerts_created += created.len() as u64;
        debug!(
            video_id = %self.summary.video_id,
            frame_number = frame.frame_number,
            detections = frame.detections.len(),
            alerts = created.len(),
            "frame processed"
        );
        created
    }

    /// Tear the session down, releasing all per-video state.
    pub fn finish(mut self) -> AnalysisSummary {
        self.evaluator.clear();
        self.generator.clear_video(&self.summary.video_id);
        info!(
            video_id = %self.summary.video_id,
            frames = self.summary.frames_processed,
            alerts = self.summary.alerts_created,
            "analysis pass finished"
        );
        self.summary
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }
}
