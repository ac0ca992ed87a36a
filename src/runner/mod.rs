pub mod context;
pub mod detect;
pub mod events;
pub mod executor;
pub mod feature;
pub mod lifecycle;
pub mod listener;
pub mod state;
pub mod tags;

use crate::driver::capabilities::CapabilityProcessor;
use crate::driver::traits::SessionFactory;
use crate::error::{HarnessError, UndefinedStep};
use crate::report::types::TestResults;
use crate::steps::StepRegistry;
use crate::utils::config::HarnessConfig;
use anyhow::{Context, Result};
use executor::TestExecutor;
use feature::FeatureSpec;
use listener::Listeners;
use state::RunState;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tags::TagExpression;

pub use events::*;
pub use state::*;

/// What a call to [`run_features`] did
#[derive(Debug)]
pub enum RunOutcome {
    /// `dry_run` was set: every step has an implementation, nothing ran
    DryRun { scenarios: usize },
    Completed(RunState),
}

/// Every distinct step without an implementation in the selected scenarios
pub fn find_undefined_steps(
    features: &[FeatureSpec],
    tags: &TagExpression,
    registry: &StepRegistry,
) -> Vec<UndefinedStep> {
    let mut undefined: Vec<UndefinedStep> = Vec::new();
    let steps = features
        .iter()
        .flat_map(|f| &f.scenarios)
        .filter(|s| tags.matches(&s.tags))
        .flat_map(|s| &s.steps);
    for step in steps {
        if registry.find(step.step_type, &step.text).is_some() {
            continue;
        }
        let entry = UndefinedStep {
            step_type: step.step_type.to_string(),
            text: step.text.clone(),
        };
        if !undefined.contains(&entry) {
            undefined.push(entry);
        }
    }
    undefined
}

/// Load, check and run the configured features.
///
/// Bad feature paths, parse errors, bad tag expressions and undefined steps
/// all abort before any scenario runs. With an artifact directory configured
/// the reports are written there once the run ends.
pub async fn run_features(
    config: Arc<HarnessConfig>,
    registry: &StepRegistry,
    factory: Arc<dyn SessionFactory>,
    processor: Option<Arc<dyn CapabilityProcessor>>,
    listeners: Listeners,
    stop: Arc<AtomicBool>,
) -> Result<RunOutcome> {
    let tags = TagExpression::parse(&config.tag_args())?;
    let features = feature::load_features(&config.feature_dirs)?;
    log::info!("loaded {} feature files", features.len());

    let undefined = find_undefined_steps(&features, &tags, registry);
    if !undefined.is_empty() {
        return Err(HarnessError::UndefinedSteps(undefined).into());
    }

    if config.dry_run {
        let scenarios = features
            .iter()
            .flat_map(|f| &f.scenarios)
            .filter(|s| tags.matches(&s.tags))
            .count();
        return Ok(RunOutcome::DryRun { scenarios });
    }

    let mut executor = TestExecutor::new(config.clone(), registry, factory, processor, listeners)
        .with_stop_flag(stop);
    let run = executor.run(&features, &tags).await;

    if let Some(dir) = &config.test_artifact_dir {
        let results = TestResults::new(run.to_report());
        crate::report::write_all(&results, dir)
            .with_context(|| format!("Failed to write reports to {}", dir.display()))?;
    }

    Ok(RunOutcome::Completed(run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeFactory, FakeState};
    use crate::driver::traits::Strategy;
    use std::path::{Path, PathBuf};

    const LOGIN: &str = r#"Feature: Login
  Scenario: Sign in
    Given I have shop.apk installed
    And I run the app on android 5.0
    When I tap on login
    Then home should appear
"#;

    const BROKEN: &str = r#"Feature: Broken
  @wip
  Scenario: Fly
    Given I own a spaceship
    Then it should fly
    And it should fly
"#;

    fn login_screen(s: &mut FakeState) {
        s.add_element(None, Strategy::Id, "login", "l");
        s.add_element(None, Strategy::Id, "home", "h");
    }

    fn workspace(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lumi-bdd-run-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("features")).unwrap();
        for (name, source) in files {
            std::fs::write(dir.join("features").join(name), source).unwrap();
        }
        dir
    }

    fn config(dir: &Path, tags: &[&str]) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.feature_dirs = vec![dir.join("features")];
        config.max_search_secs = 0;
        config.tags = Some(crate::utils::config::TagList::Many(
            tags.iter().map(|t| t.to_string()).collect(),
        ));
        config
    }

    async fn run(config: HarnessConfig, factory: &FakeFactory) -> Result<RunOutcome> {
        let registry = StepRegistry::builtin().unwrap();
        run_features(
            Arc::new(config),
            &registry,
            Arc::new(factory.clone()),
            None,
            Listeners::new(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
    }

    #[tokio::test]
    async fn test_undefined_steps_abort_before_running() {
        let dir = workspace(&[("login.feature", LOGIN), ("broken.feature", BROKEN)]);
        let factory = FakeFactory::default();
        let err = run(config(&dir, &[]), &factory).await.unwrap_err();
        let err = err.downcast::<HarnessError>().unwrap();
        match err {
            HarnessError::UndefinedSteps(steps) => {
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].text, "I own a spaceship");
                assert_eq!(steps[1].step_type, "then");
            }
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(factory.created_count(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_tags_exclude_undefined_scenarios() {
        let dir = workspace(&[("login.feature", LOGIN), ("broken.feature", BROKEN)]);
        let mut config = config(&dir, &["~@wip"]);
        config.dry_run = true;
        let outcome = run(config, &FakeFactory::default()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::DryRun { scenarios: 1 }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_run_writes_reports() {
        let dir = workspace(&[("login.feature", LOGIN)]);
        let mut config = config(&dir, &[]);
        config.test_artifact_dir = Some(dir.join("artifacts"));
        let factory = FakeFactory {
            setup: Some(login_screen),
            ..Default::default()
        };

        let outcome = run(config, &factory).await.unwrap();
        let RunOutcome::Completed(run) = outcome else {
            panic!("expected a completed run");
        };
        assert!(run.succeeded());

        let artifacts = dir.join("artifacts");
        let results = std::fs::read_to_string(artifacts.join("results.json")).unwrap();
        assert!(results.contains("\"features\""));
        assert!(artifacts.join("index.html").exists());
        assert!(artifacts.join("junit.xml").exists());
        assert!(artifacts
            .join("Login/Sign in/screenshot-002-I tap on login.png")
            .exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_bad_tag_expression_aborts() {
        let dir = workspace(&[("login.feature", LOGIN)]);
        let err = run(config(&dir, &["@a,,@b"]), &FakeFactory::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid tag expression"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_feature_dir_aborts() {
        let mut config = HarnessConfig::default();
        config.feature_dirs = vec![PathBuf::from("/nonexistent/features")];
        let err = run(config, &FakeFactory::default()).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
