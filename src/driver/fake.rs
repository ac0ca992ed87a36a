//! Scripted in-memory session used by unit tests.

use crate::driver::capabilities::CapabilitySet;
use crate::driver::family::DriverFamily;
use crate::driver::traits::{
    AutomationSession, ElementHandle, LogEntry, Rect, SessionFactory, Strategy,
};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeElement {
    /// Context or window the element lives in; `None` means everywhere
    pub surface: Option<String>,
    pub strategy: Strategy,
    pub locator: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuitBehaviour {
    #[default]
    Ok,
    Gone,
    Fail,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub contexts: Vec<String>,
    /// Number of `contexts()` calls
    pub context_listings: usize,
    pub current_context: String,
    pub context_switches: Vec<String>,
    pub windows: Vec<String>,
    pub current_window: String,
    pub elements: Vec<FakeElement>,
    pub find_calls: Vec<(String, Strategy, String)>,
    pub implicit_waits: Vec<Duration>,
    pub rects: HashMap<String, Rect>,
    pub texts: HashMap<String, String>,
    pub attributes: HashMap<(String, String), String>,
    pub hidden: Vec<String>,
    pub selected: Vec<String>,
    pub children: HashMap<String, Vec<String>>,
    pub active: Option<String>,
    pub clicks: Vec<String>,
    pub cleared: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub logs: HashMap<String, Vec<LogEntry>>,
    pub url: String,
    pub source: String,
    pub cookies: Vec<Value>,
    pub scripts: Vec<(String, Vec<Value>)>,
    pub script_result: Value,
    pub window_size: (f64, f64),
    pub screenshot: Option<Vec<u8>>,
    pub screenshot_contexts: Vec<String>,
    pub taps: Vec<(f64, f64)>,
    pub drags: Vec<((f64, f64), (f64, f64))>,
    pub flicks: Vec<(i32, i32)>,
    pub keycodes: Vec<i32>,
    pub orientation: Option<String>,
    pub activity: String,
    pub quit_behaviour: QuitBehaviour,
    pub quit_calls: usize,
}

impl FakeState {
    pub fn native_app() -> Self {
        Self {
            contexts: vec!["NATIVE_APP".into()],
            current_context: "NATIVE_APP".into(),
            window_size: (400.0, 800.0),
            screenshot: Some(b"\x89PNG".to_vec()),
            ..Default::default()
        }
    }

    pub fn add_element(&mut self, surface: Option<&str>, strategy: Strategy, locator: &str, id: &str) {
        self.elements.push(FakeElement {
            surface: surface.map(String::from),
            strategy,
            locator: locator.into(),
            id: id.into(),
        });
    }

    pub fn log(&mut self, name: &str, messages: &[&str]) {
        let entries = messages
            .iter()
            .map(|m| LogEntry {
                message: m.to_string(),
                ..Default::default()
            })
            .collect();
        self.logs.insert(name.into(), entries);
    }
}

#[derive(Clone, Default)]
pub struct FakeSession {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

fn missing(id: &str) -> SessionError {
    SessionError::NoSuchElement(id.to_string())
}

#[async_trait]
impl AutomationSession for FakeSession {
    async fn contexts(&mut self) -> SessionResult<Vec<String>> {
        Ok(self.with(|s| {
            s.context_listings += 1;
            s.contexts.clone()
        }))
    }

    async fn current_context(&mut self) -> SessionResult<String> {
        Ok(self.with(|s| s.current_context.clone()))
    }

    async fn switch_context(&mut self, name: &str) -> SessionResult<()> {
        self.with(|s| {
            if !s.contexts.iter().any(|c| c == name) {
                return Err(SessionError::NoSuchContext(name.into()));
            }
            s.current_context = name.into();
            s.context_switches.push(name.into());
            Ok(())
        })
    }

    async fn window_handles(&mut self) -> SessionResult<Vec<String>> {
        Ok(self.with(|s| s.windows.clone()))
    }

    async fn switch_window(&mut self, handle: &str) -> SessionResult<()> {
        self.with(|s| {
            s.current_window = handle.into();
            Ok(())
        })
    }

    async fn set_implicit_wait(&mut self, wait: Duration) -> SessionResult<()> {
        self.with(|s| s.implicit_waits.push(wait));
        Ok(())
    }

    async fn find_element(
        &mut self,
        strategy: Strategy,
        value: &str,
    ) -> SessionResult<Option<ElementHandle>> {
        Ok(self.with(|s| {
            s.find_calls
                .push((s.current_context.clone(), strategy, value.to_string()));
            s.elements
                .iter()
                .find(|e| {
                    e.strategy == strategy
                        && e.locator == value
                        && e.surface.as_deref().map_or(true, |surface| {
                            surface == s.current_context || surface == s.current_window
                        })
                })
                .map(|e| ElementHandle(e.id.clone()))
        }))
    }

    async fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        _strategy: Strategy,
        value: &str,
    ) -> SessionResult<Vec<ElementHandle>> {
        Ok(self.with(|s| {
            s.children
                .get(&format!("{} {}", parent.0, value))
                .map(|ids| ids.iter().map(|id| ElementHandle(id.clone())).collect())
                .unwrap_or_default()
        }))
    }

    async fn active_element(&mut self) -> SessionResult<ElementHandle> {
        self.with(|s| s.active.clone().map(ElementHandle).ok_or_else(|| missing("active")))
    }

    async fn element_rect(&mut self, element: &ElementHandle) -> SessionResult<Rect> {
        self.with(|s| s.rects.get(&element.0).copied().ok_or_else(|| missing(&element.0)))
    }

    async fn element_text(&mut self, element: &ElementHandle) -> SessionResult<String> {
        Ok(self.with(|s| s.texts.get(&element.0).cloned().unwrap_or_default()))
    }

    async fn element_tag_name(&mut self, _element: &ElementHandle) -> SessionResult<String> {
        Ok("div".into())
    }

    async fn element_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> SessionResult<Option<String>> {
        Ok(self.with(|s| s.attributes.get(&(element.0.clone(), name.to_string())).cloned()))
    }

    async fn is_displayed(&mut self, element: &ElementHandle) -> SessionResult<bool> {
        Ok(self.with(|s| !s.hidden.contains(&element.0)))
    }

    async fn is_selected(&mut self, element: &ElementHandle) -> SessionResult<bool> {
        Ok(self.with(|s| s.selected.contains(&element.0)))
    }

    async fn click(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.with(|s| s.clicks.push(element.0.clone()));
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.with(|s| s.cleared.push(element.0.clone()));
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()> {
        self.with(|s| s.typed.push((element.0.clone(), text.to_string())));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> SessionResult<()> {
        self.with(|s| s.url = url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> SessionResult<String> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn page_source(&mut self) -> SessionResult<String> {
        Ok(self.with(|s| s.source.clone()))
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> SessionResult<Value> {
        Ok(self.with(|s| {
            s.scripts.push((script.to_string(), args));
            s.script_result.clone()
        }))
    }

    async fn add_cookie(&mut self, cookie: Value) -> SessionResult<()> {
        self.with(|s| s.cookies.push(cookie));
        Ok(())
    }

    async fn delete_all_cookies(&mut self) -> SessionResult<()> {
        self.with(|s| s.cookies.clear());
        Ok(())
    }

    async fn cookie(&mut self, name: &str) -> SessionResult<Option<Value>> {
        Ok(self.with(|s| {
            s.cookies
                .iter()
                .find(|c| c["name"] == name)
                .cloned()
        }))
    }

    async fn logs(&mut self, log_type: &str) -> SessionResult<Vec<LogEntry>> {
        Ok(self.with(|s| s.logs.remove(log_type).unwrap_or_default()))
    }

    async fn window_size(&mut self) -> SessionResult<(f64, f64)> {
        Ok(self.with(|s| s.window_size))
    }

    async fn screenshot(&mut self) -> SessionResult<Vec<u8>> {
        self.with(|s| {
            s.screenshot_contexts.push(s.current_context.clone());
            s.screenshot
                .clone()
                .ok_or_else(|| SessionError::Transport("screen capture failed".into()))
        })
    }

    async fn tap(&mut self, x: f64, y: f64) -> SessionResult<()> {
        self.with(|s| s.taps.push((x, y)));
        Ok(())
    }

    async fn drag(
        &mut self,
        from: (f64, f64),
        to: (f64, f64),
        _duration: Duration,
    ) -> SessionResult<()> {
        self.with(|s| s.drags.push((from, to)));
        Ok(())
    }

    async fn flick(&mut self, xspeed: i32, yspeed: i32) -> SessionResult<()> {
        self.with(|s| s.flicks.push((xspeed, yspeed)));
        Ok(())
    }

    async fn press_keycode(&mut self, keycode: i32) -> SessionResult<()> {
        self.with(|s| s.keycodes.push(keycode));
        Ok(())
    }

    async fn set_orientation(&mut self, orientation: &str) -> SessionResult<()> {
        self.with(|s| s.orientation = Some(orientation.to_string()));
        Ok(())
    }

    async fn current_activity(&mut self) -> SessionResult<String> {
        Ok(self.with(|s| s.activity.clone()))
    }

    async fn quit(&mut self) -> SessionResult<()> {
        self.with(|s| {
            s.quit_calls += 1;
            match s.quit_behaviour {
                QuitBehaviour::Ok => Ok(()),
                QuitBehaviour::Gone => Err(SessionError::SessionGone("invalid session id".into())),
                QuitBehaviour::Fail => Err(SessionError::Transport("connection reset".into())),
            }
        })
    }
}

/// Hands out fake sessions and remembers what it was asked for.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub created: Arc<Mutex<Vec<(DriverFamily, CapabilitySet, FakeSession)>>>,
    pub fail_with: Option<String>,
    pub quit_behaviour: QuitBehaviour,
    /// Applied to every new session's state
    pub setup: Option<fn(&mut FakeState)>,
}

impl FakeFactory {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> FakeSession {
        self.created.lock().unwrap()[index].2.clone()
    }

    pub fn capabilities(&self, index: usize) -> CapabilitySet {
        self.created.lock().unwrap()[index].1.clone()
    }

    pub fn family(&self, index: usize) -> DriverFamily {
        self.created.lock().unwrap()[index].0
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(
        &self,
        family: DriverFamily,
        capabilities: &CapabilitySet,
    ) -> SessionResult<Box<dyn AutomationSession>> {
        if let Some(msg) = &self.fail_with {
            return Err(SessionError::Transport(msg.clone()));
        }
        let mut state = FakeState::native_app();
        state.quit_behaviour = self.quit_behaviour;
        if let Some(setup) = self.setup {
            setup(&mut state);
        }
        let session = FakeSession::new(state);
        self.created
            .lock()
            .unwrap()
            .push((family, capabilities.clone(), session.clone()));
        Ok(Box::new(session))
    }
}
