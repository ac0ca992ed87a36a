//! WebDriver HTTP client
//!
//! Speaks the W3C WebDriver protocol (with JSON-wire fallbacks in the response
//! parsing) plus the Appium extensions the step library relies on: contexts,
//! key codes, orientation, current activity and flick gestures.

use crate::driver::capabilities::CapabilitySet;
use crate::driver::family::DriverFamily;
use crate::driver::traits::{
    AutomationSession, ElementHandle, LogEntry, Rect, SessionFactory, Strategy,
};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default remote end used when nothing is configured
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444/wd/hub";

/// W3C web element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Capability names W3C WebDriver accepts without a vendor prefix
const W3C_CAPABILITIES: [&str; 9] = [
    "browserName",
    "browserVersion",
    "platformName",
    "acceptInsecureCerts",
    "pageLoadStrategy",
    "proxy",
    "setWindowRect",
    "timeouts",
    "unhandledPromptBehavior",
];

/// Wire response envelope (W3C `value`, JSON-wire `status`/`sessionId`)
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    status: Option<i64>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

fn map_w3c_error(error: &str, message: String) -> SessionError {
    match error {
        "invalid session id" => SessionError::SessionGone(message),
        "no such element" | "stale element reference" => SessionError::NoSuchElement(message),
        "no such context" | "no such window" => SessionError::NoSuchContext(message),
        "unknown command" | "unknown method" | "unsupported operation" => {
            SessionError::Unsupported(message)
        }
        other => SessionError::Protocol {
            error: other.to_string(),
            message,
        },
    }
}

fn map_wire_status(status: i64, value: &Value) -> SessionError {
    let message = value["message"].as_str().unwrap_or_default().to_string();
    match status {
        6 => SessionError::SessionGone(message),
        7 | 10 => SessionError::NoSuchElement(message),
        9 => SessionError::Unsupported(message),
        23 | 35 => SessionError::NoSuchContext(message),
        other => SessionError::Protocol {
            error: format!("status {}", other),
            message,
        },
    }
}

/// Turn a decoded response into its `value`, or the error it carries.
fn unwrap_response(http_ok: bool, response: WireResponse) -> SessionResult<Value> {
    if let Some(status) = response.status {
        if status != 0 {
            return Err(map_wire_status(status, &response.value));
        }
        return Ok(response.value);
    }
    if let Some(error) = response.value.get("error").and_then(Value::as_str) {
        let message = response.value["message"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        return Err(map_w3c_error(error, message));
    }
    if !http_ok {
        return Err(SessionError::Protocol {
            error: "unknown error".into(),
            message: response.value.to_string(),
        });
    }
    Ok(response.value)
}

fn element_id(value: &Value) -> SessionResult<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
        .ok_or_else(|| SessionError::Protocol {
            error: "invalid element".into(),
            message: format!("no element reference in {}", value),
        })
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Rewrite legacy strategies to the locators a W3C-only remote accepts.
fn w3c_locator(strategy: Strategy, value: &str) -> (&'static str, String) {
    match strategy {
        Strategy::Id => ("css selector", format!("[id=\"{}\"]", css_escape(value))),
        Strategy::Name => ("css selector", format!("[name=\"{}\"]", css_escape(value))),
        Strategy::ClassName => ("css selector", format!(".{}", value)),
        Strategy::TagName => ("css selector", value.to_string()),
        other => (other.as_str(), value.to_string()),
    }
}

/// Split a capability set into the W3C `alwaysMatch` subset.
fn w3c_subset(capabilities: &CapabilitySet) -> Map<String, Value> {
    capabilities
        .iter()
        .filter(|(key, _)| W3C_CAPABILITIES.contains(&key.as_str()) || key.contains(':'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn pointer_actions(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": steps,
        }]
    })
}

fn http_client() -> SessionResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| SessionError::Transport(format!("Failed to create HTTP client: {}", e)))
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> SessionResult<WireResponse> {
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    } else if method == Method::POST {
        request = request.json(&json!({}));
    }
    let response = request
        .send()
        .await
        .map_err(|e| SessionError::Transport(format!("{} {}: {}", method, url, e)))?;
    let http_ok = response.status().is_success();
    let text = response
        .text()
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;
    let decoded: WireResponse = if text.trim().is_empty() {
        WireResponse {
            value: Value::Null,
            status: None,
            session_id: None,
        }
    } else {
        serde_json::from_str(&text).map_err(|e| {
            SessionError::Transport(format!("unexpected response from {}: {} ({})", url, text, e))
        })?
    };
    if http_ok || decoded.value.get("error").is_some() || decoded.status.is_some() {
        Ok(decoded)
    } else {
        Err(SessionError::Protocol {
            error: "http error".into(),
            message: text,
        })
    }
}

/// Creates sessions against a remote WebDriver/Appium server
pub struct WebDriverFactory {
    base_url: String,
    client: reqwest::Client,
}

impl WebDriverFactory {
    pub fn new(base_url: &str) -> SessionResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn create(
        &self,
        family: DriverFamily,
        capabilities: &CapabilitySet,
    ) -> SessionResult<Box<dyn AutomationSession>> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": w3c_subset(capabilities),
                "firstMatch": [{}],
            },
            "desiredCapabilities": capabilities,
        });
        let url = format!("{}/session", self.base_url);
        let response = send(&self.client, Method::POST, &url, Some(body)).await?;
        let top_level_id = response.session_id.clone();
        let value = unwrap_response(true, response)?;
        let session_id = top_level_id
            .or_else(|| value.get("sessionId").and_then(Value::as_str).map(String::from))
            .ok_or_else(|| SessionError::Protocol {
                error: "session not created".into(),
                message: value.to_string(),
            })?;
        log::info!("created webdriver session {}", session_id);

        Ok(Box::new(WebDriverSession::new(
            self.client.clone(),
            self.base_url.clone(),
            session_id,
            family,
        )))
    }
}

/// One remote WebDriver session
pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    w3c_locators: bool,
}

impl WebDriverSession {
    fn new(
        client: reqwest::Client,
        base_url: String,
        session_id: String,
        family: DriverFamily,
    ) -> Self {
        Self {
            client,
            base_url,
            session_id,
            w3c_locators: family.w3c_locators_only(),
        }
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> SessionResult<Value> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        log::trace!("{} {}", method, url);
        let response = send(&self.client, method, &url, body).await?;
        unwrap_response(true, response)
    }

    async fn get(&self, path: &str) -> SessionResult<Value> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> SessionResult<Value> {
        self.command(Method::POST, path, Some(body)).await
    }

    fn locator(&self, strategy: Strategy, value: &str) -> Value {
        let (using, value) = if self.w3c_locators {
            w3c_locator(strategy, value)
        } else {
            (strategy.as_str(), value.to_string())
        };
        json!({ "using": using, "value": value })
    }

    async fn string(&self, path: &str) -> SessionResult<String> {
        Ok(self.get(path).await?.as_str().unwrap_or_default().to_string())
    }

    async fn boolean(&self, path: &str) -> SessionResult<bool> {
        Ok(self.get(path).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl AutomationSession for WebDriverSession {
    async fn contexts(&mut self) -> SessionResult<Vec<String>> {
        let value = self.get("/contexts").await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn current_context(&mut self) -> SessionResult<String> {
        self.string("/context").await
    }

    async fn switch_context(&mut self, name: &str) -> SessionResult<()> {
        self.post("/context", json!({ "name": name })).await?;
        Ok(())
    }

    async fn window_handles(&mut self) -> SessionResult<Vec<String>> {
        let value = self.get("/window/handles").await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn switch_window(&mut self, handle: &str) -> SessionResult<()> {
        self.post("/window", json!({ "handle": handle, "name": handle }))
            .await?;
        Ok(())
    }

    async fn set_implicit_wait(&mut self, wait: Duration) -> SessionResult<()> {
        self.post("/timeouts", json!({ "implicit": wait.as_millis() as u64 }))
            .await?;
        Ok(())
    }

    async fn find_element(
        &mut self,
        strategy: Strategy,
        value: &str,
    ) -> SessionResult<Option<ElementHandle>> {
        match self.post("/element", self.locator(strategy, value)).await {
            Ok(found) => element_id(&found).map(Some),
            Err(SessionError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        strategy: Strategy,
        value: &str,
    ) -> SessionResult<Vec<ElementHandle>> {
        let path = format!("/element/{}/elements", parent.0);
        let found = self.post(&path, self.locator(strategy, value)).await?;
        found
            .as_array()
            .map(|items| items.iter().map(element_id).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn active_element(&mut self) -> SessionResult<ElementHandle> {
        let value = self.get("/element/active").await?;
        element_id(&value)
    }

    async fn element_rect(&mut self, element: &ElementHandle) -> SessionResult<Rect> {
        let value = self.get(&format!("/element/{}/rect", element.0)).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Protocol {
            error: "invalid rect".into(),
            message: e.to_string(),
        })
    }

    async fn element_text(&mut self, element: &ElementHandle) -> SessionResult<String> {
        self.string(&format!("/element/{}/text", element.0)).await
    }

    async fn element_tag_name(&mut self, element: &ElementHandle) -> SessionResult<String> {
        self.string(&format!("/element/{}/name", element.0)).await
    }

    async fn element_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> SessionResult<Option<String>> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element.0, name))
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn is_displayed(&mut self, element: &ElementHandle) -> SessionResult<bool> {
        self.boolean(&format!("/element/{}/displayed", element.0)).await
    }

    async fn is_selected(&mut self, element: &ElementHandle) -> SessionResult<bool> {
        self.boolean(&format!("/element/{}/selected", element.0)).await
    }

    async fn click(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()> {
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.post(
            &format!("/element/{}/value", element.0),
            json!({ "text": text, "value": chars }),
        )
        .await?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> SessionResult<()> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> SessionResult<String> {
        self.string("/url").await
    }

    async fn page_source(&mut self) -> SessionResult<String> {
        self.string("/source").await
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> SessionResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn add_cookie(&mut self, cookie: Value) -> SessionResult<()> {
        self.post("/cookie", json!({ "cookie": cookie })).await?;
        Ok(())
    }

    async fn delete_all_cookies(&mut self) -> SessionResult<()> {
        self.command(Method::DELETE, "/cookie", None).await?;
        Ok(())
    }

    async fn cookie(&mut self, name: &str) -> SessionResult<Option<Value>> {
        match self.get(&format!("/cookie/{}", name)).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(SessionError::Protocol { error, .. }) if error == "no such cookie" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn logs(&mut self, log_type: &str) -> SessionResult<Vec<LogEntry>> {
        let value = self.post("/log", json!({ "type": log_type })).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Protocol {
            error: "invalid log entries".into(),
            message: e.to_string(),
        })
    }

    async fn window_size(&mut self) -> SessionResult<(f64, f64)> {
        let value = match self.get("/window/rect").await {
            Ok(value) => value,
            Err(SessionError::Unsupported(_)) => self.get("/window/current/size").await?,
            Err(e) => return Err(e),
        };
        let width = value["width"].as_f64().unwrap_or_default();
        let height = value["height"].as_f64().unwrap_or_default();
        Ok((width, height))
    }

    async fn screenshot(&mut self) -> SessionResult<Vec<u8>> {
        let value = self.get("/screenshot").await?;
        let encoded = value.as_str().unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| SessionError::Protocol {
                error: "invalid screenshot".into(),
                message: e.to_string(),
            })
    }

    async fn tap(&mut self, x: f64, y: f64) -> SessionResult<()> {
        let actions = pointer_actions(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": x.round() as i64, "y": y.round() as i64 }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pause", "duration": 100 }),
            json!({ "type": "pointerUp", "button": 0 }),
        ]);
        self.post("/actions", actions).await?;
        Ok(())
    }

    async fn drag(
        &mut self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> SessionResult<()> {
        let actions = pointer_actions(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": from.0.round() as i64, "y": from.1.round() as i64 }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pointerMove", "duration": duration.as_millis() as u64, "x": to.0.round() as i64, "y": to.1.round() as i64 }),
            json!({ "type": "pointerUp", "button": 0 }),
        ]);
        self.post("/actions", actions).await?;
        Ok(())
    }

    async fn flick(&mut self, xspeed: i32, yspeed: i32) -> SessionResult<()> {
        self.post("/touch/flick", json!({ "xspeed": xspeed, "yspeed": yspeed }))
            .await?;
        Ok(())
    }

    async fn press_keycode(&mut self, keycode: i32) -> SessionResult<()> {
        self.post("/appium/device/press_keycode", json!({ "keycode": keycode }))
            .await?;
        Ok(())
    }

    async fn set_orientation(&mut self, orientation: &str) -> SessionResult<()> {
        self.post("/orientation", json!({ "orientation": orientation }))
            .await?;
        Ok(())
    }

    async fn current_activity(&mut self) -> SessionResult<String> {
        self.string("/appium/device/current_activity").await
    }

    async fn quit(&mut self) -> SessionResult<()> {
        self.command(Method::DELETE, "", None).await?;
        log::info!("closed webdriver session {}", self.session_id);
        Ok(())
    }
}
