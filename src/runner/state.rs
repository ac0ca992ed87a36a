use crate::runner::feature::{FeatureSpec, ScenarioSpec, StepSpec, StepType};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of a step, scenario or feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Undefined,
    Untested,
}

impl Status {
    /// Combine child outcomes into the parent's.
    ///
    /// Any failure fails the parent, then any undefined step; a parent with
    /// no children is untested, one whose children were all skipped (or all
    /// untested) takes that status, anything else passed.
    pub fn aggregate<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
        let statuses: Vec<Status> = statuses.into_iter().collect();
        if statuses.contains(&Status::Failed) {
            Status::Failed
        } else if statuses.contains(&Status::Undefined) {
            Status::Undefined
        } else if statuses.is_empty() {
            Status::Untested
        } else if statuses.iter().all(|s| *s == Status::Skipped) {
            Status::Skipped
        } else if statuses.iter().all(|s| *s == Status::Untested) {
            Status::Untested
        } else {
            Status::Passed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Undefined => "undefined",
            Status::Untested => "untested",
        }
    }
}

fn elapsed_ms(started_at: Option<Instant>) -> Option<u64> {
    started_at.map(|start| start.elapsed().as_millis() as u64)
}

/// State for a single step execution
#[derive(Debug, Clone)]
pub struct StepState {
    pub keyword: String,
    pub step_type: StepType,
    pub name: String,
    pub line: usize,
    pub status: Status,
    pub error: Option<String>,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
    /// Relative to the artifact directory
    pub screenshot_path: Option<String>,
}

impl StepState {
    pub fn new(step: &StepSpec) -> Self {
        Self {
            keyword: step.keyword.trim().to_string(),
            step_type: step.step_type,
            name: step.text.clone(),
            line: step.line,
            status: Status::Untested,
            error: None,
            started_at: None,
            duration_ms: None,
            screenshot_path: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn pass(&mut self) {
        self.finish(Status::Passed);
    }

    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.finish(Status::Failed);
    }

    pub fn undefined(&mut self) {
        self.finish(Status::Undefined);
    }

    pub fn skip(&mut self) {
        self.status = Status::Skipped;
    }

    fn finish(&mut self, status: Status) {
        self.status = status;
        self.duration_ms = elapsed_ms(self.started_at);
    }

    /// Serialize state for reporting (without Instant which isn't serializable)
    pub fn to_report(&self) -> StepReport {
        StepReport {
            keyword: self.keyword.clone(),
            step_type: self.step_type,
            name: self.name.clone(),
            line: self.line,
            status: self.status,
            error: self.error.clone(),
            duration_ms: self.duration_ms,
            screenshot_path: self.screenshot_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub keyword: String,
    pub step_type: StepType,
    pub name: String,
    pub line: usize,
    pub status: Status,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub screenshot_path: Option<String>,
}

/// State for one scenario (background steps included)
#[derive(Debug, Clone)]
pub struct ScenarioState {
    pub name: String,
    pub tags: Vec<String>,
    pub line: usize,
    pub status: Status,
    pub steps: Vec<StepState>,
    /// Failure outside any step, e.g. closing the session
    pub error: Option<String>,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl ScenarioState {
    pub fn new(scenario: &ScenarioSpec) -> Self {
        Self {
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            line: scenario.line,
            status: Status::Untested,
            steps: scenario.steps.iter().map(StepState::new).collect(),
            error: None,
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Mark the scenario and all of its steps skipped.
    pub fn skip(&mut self) {
        for step in &mut self.steps {
            step.skip();
        }
        self.status = Status::Skipped;
    }

    pub fn skip_remaining(&mut self, from: usize) {
        for step in self.steps.iter_mut().skip(from) {
            if step.status == Status::Untested {
                step.skip();
            }
        }
    }

    pub fn finish(&mut self) {
        self.duration_ms = elapsed_ms(self.started_at);
        self.status = if self.error.is_some() {
            Status::Failed
        } else {
            Status::aggregate(self.steps.iter().map(|s| s.status))
        };
    }

    /// Serialize state for reporting
    pub fn to_report(&self) -> ScenarioReport {
        ScenarioReport {
            name: self.name.clone(),
            tags: self.tags.clone(),
            line: self.line,
            status: self.status,
            error: self.error.clone(),
            duration_ms: self.duration_ms,
            steps: self.steps.iter().map(|s| s.to_report()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub tags: Vec<String>,
    pub line: usize,
    pub status: Status,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub steps: Vec<StepReport>,
}

/// State for a feature file
#[derive(Debug, Clone)]
pub struct FeatureState {
    pub name: String,
    pub path: String,
    pub tags: Vec<String>,
    pub status: Status,
    pub scenarios: Vec<ScenarioState>,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl FeatureState {
    pub fn new(feature: &FeatureSpec) -> Self {
        Self {
            name: feature.name.clone(),
            path: feature.path.display().to_string(),
            tags: feature.tags.clone(),
            status: Status::Untested,
            scenarios: feature.scenarios.iter().map(ScenarioState::new).collect(),
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.duration_ms = elapsed_ms(self.started_at);
        self.status = Status::aggregate(self.scenarios.iter().map(|s| s.status));
    }

    pub fn to_report(&self) -> FeatureReport {
        FeatureReport {
            name: self.name.clone(),
            path: self.path.clone(),
            tags: self.tags.clone(),
            status: self.status,
            duration_ms: self.duration_ms,
            scenarios: self.scenarios.iter().map(|s| s.to_report()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureReport {
    pub name: String,
    pub path: String,
    pub tags: Vec<String>,
    pub status: Status,
    pub duration_ms: Option<u64>,
    pub scenarios: Vec<ScenarioReport>,
}

/// Global state of one run
#[derive(Debug, Clone)]
pub struct RunState {
    pub session_id: String,
    pub features: Vec<FeatureState>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    /// Set when the run was interrupted before every feature ran
    pub aborted: bool,
}

impl RunState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            features: Vec::new(),
            started_at: None,
            finished_at: None,
            aborted: false,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    /// Whether the run should exit successfully
    pub fn succeeded(&self) -> bool {
        !self.aborted
            && self
                .features
                .iter()
                .flat_map(|f| &f.scenarios)
                .all(|s| !matches!(s.status, Status::Failed | Status::Undefined))
    }

    pub fn summary(&self) -> RunSummary {
        let mut features = StatusCounts::default();
        let mut scenarios = StatusCounts::default();
        let mut steps = StatusCounts::default();

        for feature in &self.features {
            features.add(feature.status);
            for scenario in &feature.scenarios {
                scenarios.add(scenario.status);
                for step in &scenario.steps {
                    steps.add(step.status);
                }
            }
        }

        let total_duration_ms = self.started_at.map(|start| {
            self.finished_at
                .unwrap_or_else(Instant::now)
                .duration_since(start)
                .as_millis() as u64
        });

        RunSummary {
            session_id: self.session_id.clone(),
            features,
            scenarios,
            steps,
            total_duration_ms,
        }
    }

    /// Serialize state for reporting
    pub fn to_report(&self) -> RunReport {
        RunReport {
            session_id: self.session_id.clone(),
            features: self.features.iter().map(|f| f.to_report()).collect(),
            summary: self.summary(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub undefined: u32,
    pub untested: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Undefined => self.undefined += 1,
            Status::Untested => self.untested += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub session_id: String,
    pub features: StatusCounts,
    pub scenarios: StatusCounts,
    pub steps: StatusCounts,
    pub total_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub features: Vec<FeatureReport>,
    pub summary: RunSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::feature::parse_feature;
    use std::path::Path;

    const LOGIN: &str = r#"Feature: Login
  Scenario: Good password
    Given I run the app on android 5.0
    When I tap on login
    Then home should appear in time
"#;

    fn feature_state() -> FeatureState {
        FeatureState::new(&parse_feature(LOGIN, Path::new("login.feature")).unwrap())
    }

    #[test]
    fn test_aggregate_precedence() {
        use Status::*;
        assert_eq!(Status::aggregate(vec![Passed, Failed, Undefined]), Failed);
        assert_eq!(Status::aggregate(vec![Passed, Undefined, Skipped]), Undefined);
        assert_eq!(Status::aggregate(Vec::new()), Untested);
        assert_eq!(Status::aggregate(vec![Skipped, Skipped]), Skipped);
        assert_eq!(Status::aggregate(vec![Untested, Untested]), Untested);
        assert_eq!(Status::aggregate(vec![Passed, Skipped]), Passed);
    }

    #[test]
    fn test_failed_step_fails_scenario_and_feature() {
        let mut feature = feature_state();
        feature.start();
        let scenario = &mut feature.scenarios[0];
        scenario.start();
        scenario.steps[0].start();
        scenario.steps[0].pass();
        scenario.steps[1].start();
        scenario.steps[1].fail("could not find element 'login'".into());
        scenario.skip_remaining(2);
        scenario.finish();
        feature.finish();

        assert_eq!(feature.scenarios[0].steps[2].status, Status::Skipped);
        assert_eq!(feature.scenarios[0].status, Status::Failed);
        assert_eq!(feature.status, Status::Failed);
        assert!(feature.scenarios[0].steps[0].duration_ms.is_some());
    }

    #[test]
    fn test_scenario_error_overrides_passing_steps() {
        let mut feature = feature_state();
        let scenario = &mut feature.scenarios[0];
        for step in &mut scenario.steps {
            step.start();
            step.pass();
        }
        scenario.error = Some("failed to close session".into());
        scenario.finish();
        assert_eq!(scenario.status, Status::Failed);
    }

    #[test]
    fn test_summary_counts_every_level() {
        let mut run = RunState::new("run-1");
        run.start();
        let mut feature = feature_state();
        feature.scenarios[0].skip();
        feature.scenarios[0].finish();
        feature.finish();
        run.features.push(feature);
        run.finish();

        let summary = run.summary();
        assert_eq!(summary.features.skipped, 1);
        assert_eq!(summary.scenarios.total, 1);
        assert_eq!(summary.steps.skipped, 3);
        assert!(run.succeeded());
    }

    #[test]
    fn test_report_serializes_camel_case_lowercase_status() {
        let mut feature = feature_state();
        feature.scenarios[0].steps[0].start();
        feature.scenarios[0].steps[0].undefined();
        feature.scenarios[0].finish();
        feature.finish();
        let json = serde_json::to_value(feature.to_report()).unwrap();
        assert_eq!(json["status"], "undefined");
        assert_eq!(json["scenarios"][0]["steps"][0]["stepType"], "given");
        assert_eq!(json["scenarios"][0]["steps"][1]["status"], "untested");
        assert!(json["scenarios"][0].get("durationMs").is_some());
    }
}
