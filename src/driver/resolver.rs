//! Multi-strategy element resolution.
//!
//! A locator is tried against every search surface (UI context or browser
//! window) and, inside each, every strategy of the family's strategy order.
//! Sweeps repeat until the deadline passes. The session's implicit wait is
//! dropped to zero for the duration and restored afterwards; a resolution
//! that is cancelled midway leaves the restore owed in a [`WaitLedger`].

use crate::driver::family::{SearchSurface, NATIVE_CONTEXT, WEBVIEW_CONTEXT};
use crate::driver::traits::{AutomationSession, ElementHandle, Strategy};
use crate::error::{AttemptFailure, FindAttempt, HarnessError, SessionError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Pseudo surface name used when the session cannot list its surfaces
const CURRENT_SURFACE: &str = "current";

/// Timing knobs for element resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    /// Upper bound for one resolution
    pub max_wait: Duration,
    /// Implicit wait the session normally runs with
    pub implicit_wait: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            implicit_wait: Duration::from_secs(10),
        }
    }
}

/// Pick the most recently listed context whose name contains `name`.
pub fn pick_context<'a>(available: &'a [String], name: &str) -> Option<&'a String> {
    let needle = name.to_lowercase();
    available
        .iter()
        .rev()
        .find(|c| c.to_lowercase().contains(&needle))
}

/// Collapse web view contexts into one representative next to the native one.
pub fn collapse_contexts(contexts: Vec<String>) -> Vec<String> {
    let has_native = contexts.iter().any(|c| c == NATIVE_CONTEXT);
    let has_webview = contexts.iter().any(|c| c.contains(WEBVIEW_CONTEXT));
    if has_native && has_webview {
        vec![NATIVE_CONTEXT.to_string(), WEBVIEW_CONTEXT.to_string()]
    } else {
        contexts
    }
}

/// Switch to the context best matching `name`.
pub async fn switch_to(
    session: &mut dyn AutomationSession,
    name: &str,
) -> Result<String, HarnessError> {
    let available = session
        .contexts()
        .await
        .map_err(|e| HarnessError::Unsupported(format!("cannot list contexts: {}", e)))?;
    let target = pick_context(&available, name)
        .cloned()
        .ok_or_else(|| {
            HarnessError::Unsupported(format!(
                "no context matching '{}' (available: {})",
                name,
                available.join(", ")
            ))
        })?;
    session
        .switch_context(&target)
        .await
        .map_err(|e| HarnessError::Unsupported(format!("failed to switch to {}: {}", target, e)))?;
    Ok(target)
}

enum Surfaces {
    /// Contexts to sweep, and the raw listing each one is picked from
    Contexts {
        sweep: Vec<String>,
        available: Vec<String>,
    },
    Windows(Vec<String>),
    /// Sweep whatever is currently active
    Current,
}

async fn list_surfaces(session: &mut dyn AutomationSession, surface: SearchSurface) -> Surfaces {
    let listed = match surface {
        SearchSurface::Contexts => session.contexts().await.map(|available| Surfaces::Contexts {
            sweep: collapse_contexts(available.clone()),
            available,
        }),
        SearchSurface::Windows => session.window_handles().await.map(Surfaces::Windows),
    };
    match listed {
        Ok(Surfaces::Contexts { available, .. }) if available.is_empty() => Surfaces::Current,
        Ok(Surfaces::Windows(handles)) if handles.is_empty() => Surfaces::Current,
        Ok(surfaces) => surfaces,
        Err(e) => {
            log::debug!("could not list search surfaces, using the current one: {}", e);
            Surfaces::Current
        }
    }
}

async fn enter_context(
    session: &mut dyn AutomationSession,
    available: &[String],
    name: &str,
) -> Result<(), AttemptFailure> {
    let target = pick_context(available, name)
        .ok_or_else(|| AttemptFailure::SwitchFailed(format!("no context {}", name)))?;
    session
        .switch_context(target)
        .await
        .map_err(|e| AttemptFailure::SwitchFailed(e.to_string()))
}

async fn try_strategy(
    session: &mut dyn AutomationSession,
    strategy: Strategy,
    locator: &str,
) -> Result<ElementHandle, AttemptFailure> {
    match session.find_element(strategy, locator).await {
        Ok(Some(element)) => Ok(element),
        Ok(None) | Err(SessionError::NoSuchElement(_)) => Err(AttemptFailure::NotFound),
        Err(e) => Err(AttemptFailure::Protocol(e.to_string())),
    }
}

async fn sweep_strategies(
    session: &mut dyn AutomationSession,
    surface_name: &str,
    strategies: &[Strategy],
    locator: &str,
    attempts: &mut Vec<FindAttempt>,
) -> Option<ElementHandle> {
    for &strategy in strategies {
        match try_strategy(session, strategy, locator).await {
            Ok(element) => {
                log::debug!(
                    "found '{}' by {} in {}",
                    locator,
                    strategy,
                    surface_name
                );
                return Some(element);
            }
            Err(failure) => attempts.push(FindAttempt {
                surface: surface_name.to_string(),
                strategy: Some(strategy),
                failure,
            }),
        }
    }
    None
}

/// Enter `name` and try every strategy there.
async fn sweep_surface(
    session: &mut dyn AutomationSession,
    entered: Result<(), AttemptFailure>,
    name: &str,
    strategies: &[Strategy],
    locator: &str,
    attempts: &mut Vec<FindAttempt>,
) -> Option<ElementHandle> {
    if let Err(failure) = entered {
        attempts.push(FindAttempt {
            surface: name.to_string(),
            strategy: None,
            failure,
        });
        return None;
    }
    sweep_strategies(session, name, strategies, locator, attempts).await
}

async fn sweep(
    session: &mut dyn AutomationSession,
    surface: SearchSurface,
    strategies: &[Strategy],
    locator: &str,
) -> Result<ElementHandle, Vec<FindAttempt>> {
    let mut attempts = Vec::new();
    match list_surfaces(session, surface).await {
        Surfaces::Contexts { sweep, available } => {
            for name in &sweep {
                let entered = enter_context(session, &available, name).await;
                if let Some(element) =
                    sweep_surface(session, entered, name, strategies, locator, &mut attempts).await
                {
                    return Ok(element);
                }
            }
        }
        Surfaces::Windows(handles) => {
            for handle in &handles {
                let entered = session
                    .switch_window(handle)
                    .await
                    .map_err(|e| AttemptFailure::SwitchFailed(e.to_string()));
                if let Some(element) =
                    sweep_surface(session, entered, handle, strategies, locator, &mut attempts)
                        .await
                {
                    return Ok(element);
                }
            }
        }
        Surfaces::Current => {
            if let Some(element) =
                sweep_strategies(session, CURRENT_SURFACE, strategies, locator, &mut attempts)
                    .await
            {
                return Ok(element);
            }
        }
    }
    Err(attempts)
}

async fn sweep_in_context(
    session: &mut dyn AutomationSession,
    context: &str,
    strategies: &[Strategy],
    locator: &str,
) -> Result<ElementHandle, Vec<FindAttempt>> {
    let mut attempts = Vec::new();
    let entered = match session.contexts().await {
        Ok(available) => enter_context(session, &available, context).await,
        Err(e) => Err(AttemptFailure::SwitchFailed(e.to_string())),
    };
    match sweep_surface(session, entered, context, strategies, locator, &mut attempts).await {
        Some(element) => Ok(element),
        None => Err(attempts),
    }
}

async fn set_wait(session: &mut dyn AutomationSession, wait: Duration) {
    if let Err(e) = session.set_implicit_wait(wait).await {
        log::warn!("failed to set implicit wait to {:?}: {}", wait, e);
    }
}

/// The implicit wait a session is still owed.
///
/// Resolution drops the session's implicit wait to zero and records the
/// normal value here first. If the resolution never finishes (its future was
/// dropped) the entry stays behind until [`WaitLedger::settle`] pays it back.
#[derive(Debug, Default)]
pub struct WaitLedger {
    owed: Option<Duration>,
}

impl WaitLedger {
    pub fn is_owed(&self) -> bool {
        self.owed.is_some()
    }

    /// Restore an outstanding implicit wait, if any.
    pub async fn settle(&mut self, session: &mut dyn AutomationSession) {
        if let Some(wait) = self.owed.take() {
            set_wait(session, wait).await;
        }
    }
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    All(SearchSurface),
    Context(&'a str),
}

async fn poll_until_found(
    session: &mut dyn AutomationSession,
    scope: Scope<'_>,
    strategies: &[Strategy],
    locator: &str,
    max_wait: Duration,
) -> Result<ElementHandle, HarnessError> {
    let deadline = Instant::now() + max_wait;
    loop {
        let result = match scope {
            Scope::All(surface) => sweep(session, surface, strategies, locator).await,
            Scope::Context(context) => sweep_in_context(session, context, strategies, locator).await,
        };
        match result {
            Ok(element) => return Ok(element),
            Err(attempts) => {
                if Instant::now() >= deadline {
                    return Err(HarnessError::ElementNotFound {
                        locator: locator.to_string(),
                        attempts,
                    });
                }
            }
        }
        tokio::task::yield_now().await;
    }
}

/// Poll at a zero implicit wait, then restore the normal one.
///
/// The restore runs after success, timeout and panic. A cancelled poll leaves
/// the wait owed in `ledger`.
async fn resolve_scoped(
    session: &mut dyn AutomationSession,
    ledger: &mut WaitLedger,
    scope: Scope<'_>,
    strategies: &[Strategy],
    locator: &str,
    settings: &ResolverSettings,
) -> Result<ElementHandle, HarnessError> {
    ledger.owed = Some(settings.implicit_wait);
    set_wait(session, Duration::ZERO).await;
    let outcome = AssertUnwindSafe(poll_until_found(
        session,
        scope,
        strategies,
        locator,
        settings.max_wait,
    ))
    .catch_unwind()
    .await;
    ledger.settle(session).await;
    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Locate `locator` across every search surface of the session.
pub async fn resolve(
    session: &mut dyn AutomationSession,
    ledger: &mut WaitLedger,
    locator: &str,
    surface: SearchSurface,
    strategies: &[Strategy],
    settings: &ResolverSettings,
) -> Result<ElementHandle, HarnessError> {
    resolve_scoped(session, ledger, Scope::All(surface), strategies, locator, settings).await
}

/// Locate `locator` inside a single UI context only.
pub async fn resolve_in_context(
    session: &mut dyn AutomationSession,
    ledger: &mut WaitLedger,
    locator: &str,
    context: &str,
    strategies: &[Strategy],
    settings: &ResolverSettings,
) -> Result<ElementHandle, HarnessError> {
    resolve_scoped(session, ledger, Scope::Context(context), strategies, locator, settings).await
}
