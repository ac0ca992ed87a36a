use crate::driver::capabilities::{CapabilityExtras, CapabilityProcessor};
use crate::driver::instance::Driver;
use crate::driver::traits::{AutomationSession, ElementHandle, SessionFactory};
use crate::error::HarnessError;
use crate::runner::detect::{detect_requirements, Declarations};
use crate::runner::feature::{DataTable, FeatureSpec};
use crate::runner::lifecycle::{SessionLifecycle, SessionScope};
use crate::utils::config::HarnessConfig;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-run state handed to every step
pub struct TestContext {
    pub config: Arc<HarnessConfig>,

    lifecycle: SessionLifecycle,

    /// What the current scenario has declared (app, device, browser extras)
    pub declared: Declarations,

    /// Declarations detected for a `@single_session` feature; every scenario
    /// starts from these
    feature_declared: Declarations,

    /// Values noted by steps, keyed `element__attr[index]`
    pub saved_data: HashMap<String, String>,

    /// Data table of the step being executed
    pub table: Option<DataTable>,

    /// Doc string of the step being executed
    pub docstring: Option<String>,

    /// A screenshot the step captured itself; reported instead of the
    /// automatic after-step capture
    pub step_screenshot: Option<Vec<u8>>,

    /// Directory for the current scenario's artifacts
    pub report_dir: Option<PathBuf>,
}

impl TestContext {
    pub fn new(
        config: Arc<HarnessConfig>,
        factory: Arc<dyn SessionFactory>,
        processor: Option<Arc<dyn CapabilityProcessor>>,
    ) -> Self {
        let lifecycle = SessionLifecycle::new(factory, processor, config.resolver_settings());
        Self {
            config,
            lifecycle,
            declared: Declarations::default(),
            feature_declared: Declarations::default(),
            saved_data: HashMap::new(),
            table: None,
            docstring: None,
            step_screenshot: None,
            report_dir: None,
        }
    }

    /// The live session, or an error if no device step has run yet
    pub fn driver(&mut self) -> Result<&mut Driver> {
        self.lifecycle
            .driver()
            .context("No session is active; declare the app and device to run on first")
    }

    /// Raw protocol access to the live session
    pub async fn session(&mut self) -> Result<&mut dyn AutomationSession> {
        Ok(self.driver()?.session().await)
    }

    pub fn has_session(&self) -> bool {
        self.lifecycle.has_session()
    }

    pub fn session_scope(&self) -> Option<SessionScope> {
        self.lifecycle.scope()
    }

    /// Resolve `locator` on the live session.
    pub async fn find(&mut self, locator: &str) -> Result<ElementHandle> {
        Ok(self.driver()?.find(locator).await?)
    }

    /// Resolve `locator` inside one named context.
    pub async fn find_in_context(&mut self, locator: &str, context: &str) -> Result<ElementHandle> {
        Ok(self.driver()?.find_in_context(locator, context).await?)
    }

    /// Force a new session on the next device step.
    pub fn mark_refresh(&mut self) {
        self.lifecycle.mark_refresh();
    }

    fn capability_extras(&self) -> CapabilityExtras {
        let mut extras = self.config.capability_extras();
        if let Some(agent) = &self.declared.user_agent {
            extras.user_agent = Some(agent.clone());
        }
        if let Some(size) = self.declared.window_size {
            extras.window_size = Some(size);
        }
        extras
    }

    /// Make sure a session matching the declarations is running.
    pub async fn request_session(&mut self) -> Result<&mut Driver> {
        let requirements = self.declared.requirements();
        anyhow::ensure!(
            !requirements.app_uri.trim().is_empty(),
            "a path to the app wasn't given"
        );
        let extras = self.capability_extras();
        self.lifecycle.ensure_session(&requirements, &extras).await
    }

    /// Feature setup: a `@single_session` feature gets one session up front,
    /// derived from its first scenario's steps.
    pub async fn begin_feature(&mut self, feature: &FeatureSpec) -> Result<()> {
        self.feature_declared = Declarations::default();
        if !feature.has_tag("single_session") {
            return Ok(());
        }
        let Some(first) = feature.scenarios.first() else {
            return Ok(());
        };
        let text: Vec<&str> = first.steps.iter().map(|s| s.text.as_str()).collect();
        let found = detect_requirements(&text.join("\n"), &self.config)?;
        let requirements = found.requirements();
        self.feature_declared = found;

        if !requirements.is_complete() {
            log::debug!(
                "could not detect app, os type and os version for feature '{}'; sessions will be per scenario",
                feature.name
            );
            return Ok(());
        }

        self.declared = self.feature_declared.clone();
        let extras = self.capability_extras();
        self.lifecycle
            .start_feature_session(&requirements, &extras)
            .await
            .with_context(|| format!("Failed to open the session for feature '{}'", feature.name))
    }

    /// Reset scenario state to the feature's declarations.
    pub fn begin_scenario(&mut self, report_dir: Option<PathBuf>) {
        self.declared = self.feature_declared.clone();
        self.saved_data.clear();
        self.table = None;
        self.docstring = None;
        self.step_screenshot = None;
        self.report_dir = report_dir;
    }

    pub async fn end_scenario(&mut self) -> Result<(), HarnessError> {
        self.step_screenshot = None;
        self.lifecycle.end_scenario().await
    }

    pub async fn end_feature(&mut self) -> Result<(), HarnessError> {
        self.feature_declared = Declarations::default();
        self.lifecycle.end_feature().await
    }

    pub fn save(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        log::debug!("saving {} to saved_data[{}]", value, key);
        self.saved_data.insert(key, value);
    }

    pub fn saved(&self, key: &str) -> Result<&str, HarnessError> {
        self.saved_data
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| HarnessError::MissingSavedData(key.to_string()))
    }
}
