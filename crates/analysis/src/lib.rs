//! Video Analysis Passes
//!
//! One evaluation pass per video: frames are processed strictly in
//! arrival order against a rule snapshot taken when the pass starts,
//! while distinct videos run on independent tasks. Cancellation stops
//! frame processing immediately and releases all per-video state.

mod session;
mod worker;

pub use session::{AnalysisSession, AnalysisSummary};
pub use worker::{AnalysisError, VideoTask};
