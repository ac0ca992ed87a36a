use super::context::TestContext;
use super::feature::{FeatureSpec, ScenarioSpec};
use super::listener::Listeners;
use super::state::{FeatureState, RunState, ScenarioState, Status};
use super::tags::TagExpression;
use crate::driver::capabilities::CapabilityProcessor;
use crate::driver::traits::SessionFactory;
use crate::steps::StepRegistry;
use crate::utils::config::HarnessConfig;
use crate::utils::text::{screenshot_file_name, slugify};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Runs features scenario by scenario, one step at a time
pub struct TestExecutor<'a> {
    registry: &'a StepRegistry,
    context: TestContext,
    listeners: Listeners,
    /// Set from Ctrl-C: finish the current scenario, then stop
    stop: Arc<AtomicBool>,
}

impl<'a> TestExecutor<'a> {
    pub fn new(
        config: Arc<HarnessConfig>,
        registry: &'a StepRegistry,
        factory: Arc<dyn SessionFactory>,
        processor: Option<Arc<dyn CapabilityProcessor>>,
        listeners: Listeners,
    ) -> Self {
        Self {
            registry,
            context: TestContext::new(config, factory, processor),
            listeners,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run every feature; scenarios the tag expression rejects are skipped.
    pub async fn run(&mut self, features: &[FeatureSpec], tags: &TagExpression) -> RunState {
        let mut run = RunState::new(&Uuid::new_v4().to_string());
        run.start();
        self.listeners.before_all(&run);

        for feature in features {
            if self.stop_requested() {
                log::info!("stop requested; remaining features were not run");
                run.aborted = true;
                break;
            }
            let state = self.run_feature(feature, tags).await;
            run.features.push(state);
        }

        run.finish();
        self.listeners.after_all(&run);
        run
    }

    async fn run_feature(&mut self, feature: &FeatureSpec, tags: &TagExpression) -> FeatureState {
        let mut state = FeatureState::new(feature);
        state.start();
        self.listeners.before_feature(&state);

        let selected: Vec<bool> = feature
            .scenarios
            .iter()
            .map(|s| tags.matches(&s.tags))
            .collect();

        if selected.iter().any(|s| *s) {
            if let Err(e) = self.context.begin_feature(feature).await {
                log::error!("{:#}", e);
            }
        }

        for (index, scenario) in feature.scenarios.iter().enumerate() {
            let scenario_state = &mut state.scenarios[index];
            if !selected[index] {
                scenario_state.skip();
                self.listeners.before_scenario(scenario_state);
                self.listeners.after_scenario(scenario_state);
                continue;
            }
            if self.stop_requested() {
                continue;
            }
            self.run_scenario(feature, scenario, scenario_state).await;
        }

        if let Err(e) = self.context.end_feature().await {
            log::error!("feature '{}': {}", feature.name, e);
        }

        state.finish();
        self.listeners.after_feature(&state);
        state
    }

    fn report_dir(&self, feature: &FeatureSpec, scenario: &ScenarioSpec) -> Option<PathBuf> {
        let root = self.context.config.test_artifact_dir.as_ref()?;
        Some(root.join(slugify(&feature.name)).join(slugify(&scenario.name)))
    }

    async fn run_scenario(
        &mut self,
        feature: &FeatureSpec,
        scenario: &ScenarioSpec,
        state: &mut ScenarioState,
    ) {
        let report_dir = self.report_dir(feature, scenario);
        if let Some(dir) = &report_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::warn!("could not create {}: {}", dir.display(), e);
            }
        }
        self.context.begin_scenario(report_dir);
        state.start();
        self.listeners.before_scenario(state);

        let registry = self.registry;
        for (index, step) in scenario.steps.iter().enumerate() {
            let step_state = &mut state.steps[index];
            step_state.start();
            self.listeners.before_step(step_state);

            match registry.find(step.step_type, &step.text) {
                None => step_state.undefined(),
                Some((definition, args)) => {
                    self.context.table = step.table.clone();
                    self.context.docstring = step.docstring.clone();
                    match (definition.handler)(&mut self.context, args).await {
                        Ok(()) => step_state.pass(),
                        Err(e) => step_state.fail(format!("{:#}", e)),
                    }
                }
            }
            step_state.screenshot_path = self.capture_step(&step.text).await;

            let stop = step_state.status != Status::Passed;
            self.listeners.after_step(step_state);
            if stop {
                state.skip_remaining(index + 1);
                break;
            }
        }

        if let Err(e) = self.context.end_scenario().await {
            state.error = Some(e.to_string());
        }
        state.finish();
        self.listeners.after_scenario(state);
    }

    /// Write the step's screenshot into the scenario directory.
    ///
    /// Returns the path relative to the artifact directory, or `None` when
    /// artifacts are off, no session is open or the capture failed.
    async fn capture_step(&mut self, step_text: &str) -> Option<String> {
        let dir = self.context.report_dir.clone()?;
        let supplied = self.context.step_screenshot.take();
        if !self.context.has_session() {
            return None;
        }
        let driver = self.context.driver().ok()?;
        let bytes = match supplied {
            Some(bytes) => bytes,
            None => match driver.capture_screenshot().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("screenshot after '{}' failed: {}", step_text, e);
                    return None;
                }
            },
        };

        let file_name = screenshot_file_name(driver.next_screenshot_index(), Some(step_text));
        let path = dir.join(&file_name);
        if let Err(e) = std::fs::write(&path, bytes) {
            log::warn!("could not write {}: {}", path.display(), e);
            return None;
        }

        let root = self.context.config.test_artifact_dir.as_ref()?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }
}
