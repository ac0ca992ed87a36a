//! Session lifecycle.
//!
//! At most one session is alive at a time. It is either scenario scoped
//! (closed when the scenario ends) or feature scoped (opened up front for
//! `@single_session` features and kept until the feature ends).

use crate::driver::capabilities::{
    build_capabilities, process_capabilities, CapabilityExtras, CapabilityProcessor,
};
use crate::driver::family::select_driver_family;
use crate::driver::instance::Driver;
use crate::driver::requirements::RuntimeRequirements;
use crate::driver::resolver::ResolverSettings;
use crate::driver::traits::SessionFactory;
use crate::error::HarnessError;
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    Scenario,
    Feature,
}

pub struct SessionLifecycle {
    factory: Arc<dyn SessionFactory>,
    processor: Option<Arc<dyn CapabilityProcessor>>,
    settings: ResolverSettings,
    active: Option<(Driver, SessionScope)>,
    refresh: bool,
}

impl SessionLifecycle {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        processor: Option<Arc<dyn CapabilityProcessor>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            factory,
            processor,
            settings,
            active: None,
            refresh: false,
        }
    }

    pub fn driver(&mut self) -> Option<&mut Driver> {
        self.active.as_mut().map(|(driver, _)| driver)
    }

    pub fn has_session(&self) -> bool {
        self.active.is_some()
    }

    pub fn scope(&self) -> Option<SessionScope> {
        self.active.as_ref().map(|(_, scope)| *scope)
    }

    /// Force the next `ensure_session` to start over.
    pub fn mark_refresh(&mut self) {
        self.refresh = true;
    }

    /// Flag a refresh when `requirements` differ from the live session's.
    pub fn request(&mut self, requirements: &RuntimeRequirements) {
        let matches = self
            .active
            .as_ref()
            .map_or(false, |(driver, _)| driver.requirements() == requirements);
        if !matches {
            self.refresh = true;
        }
    }

    /// Return a session satisfying `requirements`, creating one if needed.
    ///
    /// A pinned feature session with the same requirements is always reused.
    /// Anything else is replaced when the refresh flag is set; the new session
    /// is scenario scoped.
    pub async fn ensure_session(
        &mut self,
        requirements: &RuntimeRequirements,
        extras: &CapabilityExtras,
    ) -> Result<&mut Driver> {
        self.request(requirements);

        let reuse = match &self.active {
            Some((driver, SessionScope::Feature)) => driver.requirements() == requirements,
            Some(_) => !self.refresh,
            None => false,
        };

        if reuse {
            log::debug!("reusing the active session");
        } else {
            log::debug!("creating a new scenario-level session");
            self.discard_active().await;
            let driver = self.open(requirements, extras).await?;
            self.active = Some((driver, SessionScope::Scenario));
        }
        self.refresh = false;

        match self.active.as_mut() {
            Some((driver, _)) => Ok(driver),
            None => anyhow::bail!("no session is active"),
        }
    }

    /// Open a feature-scoped session and pin it until `end_feature`.
    pub async fn start_feature_session(
        &mut self,
        requirements: &RuntimeRequirements,
        extras: &CapabilityExtras,
    ) -> Result<()> {
        self.discard_active().await;
        let driver = self.open(requirements, extras).await?;
        log::info!("opened a feature-level {} session", driver.family());
        self.active = Some((driver, SessionScope::Feature));
        self.refresh = false;
        Ok(())
    }

    /// Close a scenario-scoped session; a feature-scoped one stays open.
    pub async fn end_scenario(&mut self) -> Result<(), HarnessError> {
        match self.active.as_ref().map(|(_, scope)| *scope) {
            Some(SessionScope::Scenario) => self.close_active().await,
            _ => Ok(()),
        }
    }

    /// Close whatever is left at the end of a feature and drop the pin.
    pub async fn end_feature(&mut self) -> Result<(), HarnessError> {
        self.refresh = false;
        self.close_active().await
    }

    async fn open(
        &self,
        requirements: &RuntimeRequirements,
        extras: &CapabilityExtras,
    ) -> Result<Driver> {
        let family = select_driver_family(
            Some(&requirements.os_version),
            Some(&requirements.os_type),
            Some(&requirements.app_uri),
            requirements.device_type.as_option(),
        );
        let capabilities = build_capabilities(family, requirements, extras)?;
        let capabilities = process_capabilities(capabilities, self.processor.as_deref())?;
        log::debug!("session capabilities: {:?}", capabilities);

        let session = self
            .factory
            .create(family, &capabilities)
            .await
            .with_context(|| format!("Failed to create a {} session", family))?;
        log::info!(
            "created {} session for {} {}",
            family,
            requirements.os_type,
            requirements.os_version
        );

        let mut driver = Driver::new(family, requirements.clone(), session, self.settings);
        if let Err(e) = driver.prepare().await {
            if let Err(quit_err) = driver.quit().await {
                log::warn!("error while quitting a half-prepared session: {}", quit_err);
            }
            return Err(e).context("Failed to prepare the new session");
        }
        Ok(driver)
    }

    /// Best-effort close before replacing a session.
    async fn discard_active(&mut self) {
        if let Some((mut driver, _)) = self.active.take() {
            if let Err(e) = driver.quit().await {
                log::warn!("error when quitting the previous session: {}", e);
            }
        }
    }

    async fn close_active(&mut self) -> Result<(), HarnessError> {
        let Some((mut driver, scope)) = self.active.take() else {
            return Ok(());
        };
        log::debug!("closing {:?}-level session", scope);
        match driver.quit().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_gone() => {
                log::debug!("session was already gone: {}", e);
                Ok(())
            }
            Err(e) => Err(HarnessError::SessionClose(e)),
        }
    }
}
