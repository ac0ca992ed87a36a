use crate::runner::state::{FeatureReport, RunReport, RunSummary};
use serde::{Deserialize, Serialize};

/// Test results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub session_id: String,
    pub generated_at: String,
    pub features: Vec<FeatureReport>,
    pub summary: RunSummary,
}

impl TestResults {
    pub fn new(report: RunReport) -> Self {
        Self {
            session_id: report.session_id,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            features: report.features,
            summary: report.summary,
        }
    }
}
