use crate::error::SessionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Locator strategy understood by the automation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Id,
    XPath,
    LinkText,
    PartialLinkText,
    Name,
    AccessibilityId,
    TagName,
    ClassName,
    CssSelector,
}

impl Strategy {
    /// Wire name of the strategy (the `using` field of a find request)
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::XPath => "xpath",
            Strategy::LinkText => "link text",
            Strategy::PartialLinkText => "partial link text",
            Strategy::Name => "name",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::TagName => "tag name",
            Strategy::ClassName => "class name",
            Strategy::CssSelector => "css selector",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(Strategy::Id),
            "xpath" => Ok(Strategy::XPath),
            "link text" => Ok(Strategy::LinkText),
            "partial link text" => Ok(Strategy::PartialLinkText),
            "name" => Ok(Strategy::Name),
            "accessibility id" => Ok(Strategy::AccessibilityId),
            "tag name" => Ok(Strategy::TagName),
            "class name" => Ok(Strategy::ClassName),
            "css selector" | "css" => Ok(Strategy::CssSelector),
            other => Err(format!("unknown locator strategy: {}", other)),
        }
    }
}

/// Swipe direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// The direction a "scroll" of the content maps to.
    /// Scrolling up drags the finger downwards and vice versa.
    pub fn scrolled(self) -> SwipeDirection {
        match self {
            SwipeDirection::Up => SwipeDirection::Down,
            SwipeDirection::Down => SwipeDirection::Up,
            other => other,
        }
    }
}

impl FromStr for SwipeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(SwipeDirection::Up),
            "down" => Ok(SwipeDirection::Down),
            "left" => Ok(SwipeDirection::Left),
            "right" => Ok(SwipeDirection::Right),
            other => Err(format!("{} is not a valid swipe direction", other)),
        }
    }
}

/// Opaque reference to an element living in the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Element geometry in device pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A single backend log line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// One live automation connection.
///
/// All calls for a scenario are serialized through a single session, so the
/// methods take `&mut self`. Element operations address elements through the
/// handles returned by the find methods.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// Available UI contexts (e.g. `NATIVE_APP`, `WEBVIEW_1`)
    async fn contexts(&mut self) -> SessionResult<Vec<String>>;

    async fn current_context(&mut self) -> SessionResult<String>;

    async fn switch_context(&mut self, name: &str) -> SessionResult<()>;

    async fn window_handles(&mut self) -> SessionResult<Vec<String>>;

    async fn switch_window(&mut self, handle: &str) -> SessionResult<()>;

    async fn set_implicit_wait(&mut self, wait: Duration) -> SessionResult<()>;

    /// Find the first element matching `value`; `Ok(None)` when nothing matched
    async fn find_element(
        &mut self,
        strategy: Strategy,
        value: &str,
    ) -> SessionResult<Option<ElementHandle>>;

    /// Find all elements below `parent` matching `value`
    async fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        strategy: Strategy,
        value: &str,
    ) -> SessionResult<Vec<ElementHandle>>;

    async fn active_element(&mut self) -> SessionResult<ElementHandle>;

    async fn element_rect(&mut self, element: &ElementHandle) -> SessionResult<Rect>;

    async fn element_text(&mut self, element: &ElementHandle) -> SessionResult<String>;

    async fn element_tag_name(&mut self, element: &ElementHandle) -> SessionResult<String>;

    async fn element_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> SessionResult<Option<String>>;

    async fn is_displayed(&mut self, element: &ElementHandle) -> SessionResult<bool>;

    async fn is_selected(&mut self, element: &ElementHandle) -> SessionResult<bool>;

    async fn click(&mut self, element: &ElementHandle) -> SessionResult<()>;

    async fn clear(&mut self, element: &ElementHandle) -> SessionResult<()>;

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()>;

    async fn navigate(&mut self, url: &str) -> SessionResult<()>;

    async fn current_url(&mut self) -> SessionResult<String>;

    async fn page_source(&mut self) -> SessionResult<String>;

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> SessionResult<Value>;

    async fn add_cookie(&mut self, cookie: Value) -> SessionResult<()>;

    async fn delete_all_cookies(&mut self) -> SessionResult<()>;

    async fn cookie(&mut self, name: &str) -> SessionResult<Option<Value>>;

    /// Drain the named backend log buffer (`logcat`, `browser`, `syslog`, ...)
    async fn logs(&mut self, log_type: &str) -> SessionResult<Vec<LogEntry>>;

    /// Current window size as (width, height)
    async fn window_size(&mut self) -> SessionResult<(f64, f64)>;

    /// PNG bytes of the current screen
    async fn screenshot(&mut self) -> SessionResult<Vec<u8>>;

    async fn tap(&mut self, x: f64, y: f64) -> SessionResult<()>;

    /// Press at `from`, move to `to`, release
    async fn drag(&mut self, from: (f64, f64), to: (f64, f64), duration: Duration)
        -> SessionResult<()>;

    async fn flick(&mut self, xspeed: i32, yspeed: i32) -> SessionResult<()> {
        let _ = (xspeed, yspeed);
        Err(crate::error::SessionError::Unsupported("flick".into()))
    }

    async fn press_keycode(&mut self, keycode: i32) -> SessionResult<()> {
        let _ = keycode;
        Err(crate::error::SessionError::Unsupported("press keycode".into()))
    }

    async fn set_orientation(&mut self, orientation: &str) -> SessionResult<()> {
        let _ = orientation;
        Err(crate::error::SessionError::Unsupported("orientation".into()))
    }

    async fn current_activity(&mut self) -> SessionResult<String> {
        Err(crate::error::SessionError::Unsupported("current activity".into()))
    }

    async fn quit(&mut self) -> SessionResult<()>;
}

/// Creates sessions from a negotiated capability set.
///
/// `family` is the family the set was built for; capability processors may
/// rewrite the set, so wire behaviour is taken from the family.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        family: crate::driver::family::DriverFamily,
        capabilities: &crate::driver::capabilities::CapabilitySet,
    ) -> SessionResult<Box<dyn AutomationSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trips_wire_names() {
        for strategy in [
            Strategy::Id,
            Strategy::XPath,
            Strategy::LinkText,
            Strategy::PartialLinkText,
            Strategy::AccessibilityId,
            Strategy::CssSelector,
        ] {
            assert_eq!(strategy.as_str().parse::<Strategy>(), Ok(strategy));
        }
        assert!("by magic".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_scroll_inverts_vertical_swipes() {
        assert_eq!(SwipeDirection::Up.scrolled(), SwipeDirection::Down);
        assert_eq!(SwipeDirection::Down.scrolled(), SwipeDirection::Up);
        assert_eq!(SwipeDirection::Left.scrolled(), SwipeDirection::Left);
    }
}
