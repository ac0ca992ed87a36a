use crate::driver::family::{DriverFamily, SwipeRule, NATIVE_CONTEXT, WEBVIEW_CONTEXT};
use crate::driver::requirements::RuntimeRequirements;
use crate::driver::resolver::{self, ResolverSettings, WaitLedger};
use crate::driver::traits::{AutomationSession, ElementHandle, SwipeDirection};
use crate::error::{HarnessError, SessionResult};
use anyhow::{Context, Result};
use std::time::Duration;

/// Relative (x, y) start and end points of a full-length swipe
fn relative_swipe_points(direction: SwipeDirection) -> ((f64, f64), (f64, f64)) {
    match direction {
        SwipeDirection::Left => ((0.9, 0.5), (0.1, 0.5)),
        SwipeDirection::Right => ((0.1, 0.5), (0.9, 0.5)),
        SwipeDirection::Up => ((0.5, 0.9), (0.5, 0.1)),
        SwipeDirection::Down => ((0.5, 0.1), (0.5, 0.9)),
    }
}

/// Shorten a swipe to `percentage` of its length by moving the start point
/// towards the end point.
pub fn shortened_swipe(direction: SwipeDirection, percentage: f64) -> ((f64, f64), (f64, f64)) {
    let ((sx, sy), (ex, ey)) = relative_swipe_points(direction);
    let keep = 1.0 - percentage / 100.0;
    ((sx + (ex - sx) * keep, sy + (ey - sy) * keep), (ex, ey))
}

/// A live session bound to the family it was created for.
pub struct Driver {
    family: DriverFamily,
    requirements: RuntimeRequirements,
    session: Box<dyn AutomationSession>,
    settings: ResolverSettings,
    /// Implicit wait still owed from a lookup that did not finish
    wait_ledger: WaitLedger,
    screenshots_taken: u32,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("family", &self.family)
            .field("requirements", &self.requirements)
            .field("settings", &self.settings)
            .field("wait_ledger", &self.wait_ledger)
            .field("screenshots_taken", &self.screenshots_taken)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(
        family: DriverFamily,
        requirements: RuntimeRequirements,
        session: Box<dyn AutomationSession>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            family,
            requirements,
            session,
            settings,
            wait_ledger: WaitLedger::default(),
            screenshots_taken: 0,
        }
    }

    pub fn family(&self) -> DriverFamily {
        self.family
    }

    pub fn requirements(&self) -> &RuntimeRequirements {
        &self.requirements
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Raw protocol access for steps that need it, with the normal implicit
    /// wait in place
    pub async fn session(&mut self) -> &mut dyn AutomationSession {
        self.wait_ledger.settle(self.session.as_mut()).await;
        self.session.as_mut()
    }

    /// Post-creation setup: normal implicit wait, family-specific context.
    pub async fn prepare(&mut self) -> SessionResult<()> {
        self.session
            .set_implicit_wait(self.settings.implicit_wait)
            .await?;
        if self.family == DriverFamily::WebviewApp {
            self.session.switch_context(NATIVE_CONTEXT).await?;
            resolver::switch_to(self.session.as_mut(), WEBVIEW_CONTEXT)
                .await
                .map_err(|e| crate::error::SessionError::NoSuchContext(e.to_string()))?;
        }
        Ok(())
    }

    /// Resolve an element across all contexts/windows.
    pub async fn find(&mut self, locator: &str) -> Result<ElementHandle, HarnessError> {
        resolver::resolve(
            self.session.as_mut(),
            &mut self.wait_ledger,
            locator,
            self.family.search_surface(),
            self.family.strategy_order(),
            &self.settings,
        )
        .await
    }

    /// Resolve an element inside one named context.
    pub async fn find_in_context(
        &mut self,
        locator: &str,
        context: &str,
    ) -> Result<ElementHandle, HarnessError> {
        resolver::resolve_in_context(
            self.session.as_mut(),
            &mut self.wait_ledger,
            locator,
            context,
            self.family.strategy_order(),
            &self.settings,
        )
        .await
    }

    pub async fn switch_to(&mut self, context: &str) -> Result<String, HarnessError> {
        resolver::switch_to(self.session().await, context).await
    }

    pub async fn press_button(&mut self, button: &str) -> Result<()> {
        let keycode = self.family.button_keycode(button)?;
        self.session()
            .await
            .press_keycode(keycode)
            .await
            .with_context(|| format!("Failed to press {}", button))
    }

    pub async fn swipe(&mut self, direction: SwipeDirection, percentage: f64) -> Result<()> {
        self.wait_ledger.settle(self.session.as_mut()).await;
        match self.family.swipe_rule(direction) {
            SwipeRule::Relative => {
                let (width, height) = self.session.window_size().await?;
                let ((sx, sy), (ex, ey)) = shortened_swipe(direction, percentage);
                self.session
                    .drag(
                        (sx * width, sy * height),
                        (ex * width, ey * height),
                        Duration::from_millis(800),
                    )
                    .await?;
            }
            SwipeRule::Flick { xspeed, yspeed } => {
                self.session.flick(xspeed, yspeed).await?;
            }
            SwipeRule::FixedPath { from, to } => {
                self.session
                    .drag(from, to, Duration::from_millis(500))
                    .await?;
            }
        }
        Ok(())
    }

    /// Capture the screen; web view apps are captured from the native layer.
    pub async fn capture_screenshot(&mut self) -> SessionResult<Vec<u8>> {
        self.wait_ledger.settle(self.session.as_mut()).await;
        if self.family != DriverFamily::WebviewApp {
            return self.session.screenshot().await;
        }
        self.session.switch_context(NATIVE_CONTEXT).await?;
        let shot = self.session.screenshot().await;
        if let Err(e) = resolver::switch_to(self.session.as_mut(), WEBVIEW_CONTEXT).await {
            log::warn!("could not return to the web view after a screenshot: {}", e);
        }
        shot
    }

    /// Sequence number for the next screenshot file of this session, from 1
    pub fn next_screenshot_index(&mut self) -> u32 {
        self.screenshots_taken += 1;
        self.screenshots_taken
    }

    pub async fn quit(&mut self) -> SessionResult<()> {
        self.session.quit().await
    }
}
