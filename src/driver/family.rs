//! Driver families and the rules that pick one for a run.
//!
//! Every family is a closed enum variant; behaviour that differs between
//! targets (strategy order, search surface, gestures, hardware buttons) is a
//! `match` on the variant rather than a subclass override.

use crate::driver::traits::{Strategy, SwipeDirection};
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Android releases that can only be automated through Selendroid
pub const LEGACY_ANDROID_VERSIONS: [&str; 9] =
    ["2.3", "3.0", "3.1", "3.2", "4.0", "4.1", "4.2", "4.3", "4.4"];

/// Context name of the native UI surface
pub const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Prefix shared by embedded web view contexts
pub const WEBVIEW_CONTEXT: &str = "WEBVIEW";

const DEFAULT_STRATEGIES: &[Strategy] = &[
    Strategy::Id,
    Strategy::XPath,
    Strategy::LinkText,
    Strategy::PartialLinkText,
    Strategy::Name,
    Strategy::AccessibilityId,
    Strategy::TagName,
    Strategy::ClassName,
    Strategy::CssSelector,
];

const MOBILE_WEB_STRATEGIES: &[Strategy] = &[
    Strategy::Id,
    Strategy::CssSelector,
    Strategy::LinkText,
    Strategy::PartialLinkText,
    Strategy::Name,
    Strategy::TagName,
    Strategy::ClassName,
];

const DESKTOP_STRATEGIES: &[Strategy] = &[
    Strategy::Id,
    Strategy::CssSelector,
    Strategy::XPath,
    Strategy::LinkText,
    Strategy::PartialLinkText,
    Strategy::Name,
    Strategy::TagName,
    Strategy::ClassName,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverFamily {
    Android,
    Selendroid,
    Ios,
    ChromeMobile,
    WebviewApp,
    DesktopChrome,
    DesktopFirefox,
    DesktopIe,
    Generic,
}

/// Where the resolver looks for elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSurface {
    /// Appium UI contexts (native plus web views)
    Contexts,
    /// Browser window handles
    Windows,
}

/// How a swipe gesture is performed on a family
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwipeRule {
    /// Drag between points relative to the window, shortened by a percentage
    Relative,
    /// Flick at a fixed speed
    Flick { xspeed: i32, yspeed: i32 },
    /// Drag along a fixed pixel path
    FixedPath { from: (f64, f64), to: (f64, f64) },
}

impl DriverFamily {
    /// Look a family up by its registry key.
    pub fn from_key(key: &str) -> Option<DriverFamily> {
        match key {
            "android" => Some(DriverFamily::Android),
            "selendroid" => Some(DriverFamily::Selendroid),
            "ios" | "ipad" | "iphone" => Some(DriverFamily::Ios),
            "chrome" => Some(DriverFamily::ChromeMobile),
            "webviewapp" => Some(DriverFamily::WebviewApp),
            "desktop-chrome" => Some(DriverFamily::DesktopChrome),
            "desktop-firefox" => Some(DriverFamily::DesktopFirefox),
            "desktop-ie" => Some(DriverFamily::DesktopIe),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriverFamily::Android => "android",
            DriverFamily::Selendroid => "selendroid",
            DriverFamily::Ios => "ios",
            DriverFamily::ChromeMobile => "chrome-mobile",
            DriverFamily::WebviewApp => "webview-app",
            DriverFamily::DesktopChrome => "desktop-chrome",
            DriverFamily::DesktopFirefox => "desktop-firefox",
            DriverFamily::DesktopIe => "desktop-ie",
            DriverFamily::Generic => "generic",
        }
    }

    pub fn is_desktop(&self) -> bool {
        matches!(
            self,
            DriverFamily::DesktopChrome | DriverFamily::DesktopFirefox | DriverFamily::DesktopIe
        )
    }

    /// Whether the base mobile capability set (device name, versions,
    /// automation engine) applies.
    pub fn uses_default_capabilities(&self) -> bool {
        !self.is_desktop()
    }

    /// Ordered locator strategies tried by the resolver
    pub fn strategy_order(&self) -> &'static [Strategy] {
        match self {
            DriverFamily::Android
            | DriverFamily::Selendroid
            | DriverFamily::Ios
            | DriverFamily::Generic => DEFAULT_STRATEGIES,
            DriverFamily::ChromeMobile | DriverFamily::WebviewApp => MOBILE_WEB_STRATEGIES,
            DriverFamily::DesktopChrome | DriverFamily::DesktopFirefox | DriverFamily::DesktopIe => {
                DESKTOP_STRATEGIES
            }
        }
    }

    pub fn search_surface(&self) -> SearchSurface {
        match self {
            DriverFamily::Android
            | DriverFamily::Selendroid
            | DriverFamily::Ios
            | DriverFamily::Generic => SearchSurface::Contexts,
            _ => SearchSurface::Windows,
        }
    }

    /// Desktop browsers only understand W3C locators, so id/name/class/tag
    /// lookups are rewritten to CSS on the wire.
    pub fn w3c_locators_only(&self) -> bool {
        self.is_desktop()
    }

    pub fn swipe_rule(&self, direction: SwipeDirection) -> SwipeRule {
        match self {
            DriverFamily::Ios => SwipeRule::Relative,
            DriverFamily::Selendroid => {
                let (xspeed, yspeed) = match direction {
                    SwipeDirection::Left => (100, 0),
                    SwipeDirection::Right => (-100, 0),
                    SwipeDirection::Up => (0, -100),
                    SwipeDirection::Down => (0, 100),
                };
                SwipeRule::Flick { xspeed, yspeed }
            }
            _ => {
                let (from, to) = match direction {
                    SwipeDirection::Left => ((300.0, 300.0), (0.0, 300.0)),
                    SwipeDirection::Right => ((0.0, 300.0), (300.0, 300.0)),
                    SwipeDirection::Up => ((100.0, 300.0), (100.0, 0.0)),
                    SwipeDirection::Down => ((100.0, 0.0), (100.0, 300.0)),
                };
                SwipeRule::FixedPath { from, to }
            }
        }
    }

    /// Map a hardware button name to the keycode this family sends.
    pub fn button_keycode(&self, button: &str) -> Result<i32, HarnessError> {
        match self {
            DriverFamily::Android | DriverFamily::Selendroid => {
                match button.trim().to_lowercase().as_str() {
                    "home" => Ok(3),
                    "back" => Ok(4),
                    "menu" => Ok(82),
                    "enter" => Ok(66),
                    other => Err(HarnessError::Unsupported(format!(
                        "{} is unknown! Contact us to implement if critical.",
                        other
                    ))),
                }
            }
            DriverFamily::Ios => Err(HarnessError::Unsupported(
                "hardware button presses are not supported on ios".into(),
            )),
            other => Err(HarnessError::Unsupported(format!(
                "hardware button presses are not supported on {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_lowercase()
}

/// Pick the driver family for a requirements tuple.
///
/// Rules are evaluated in order, first match wins. An unknown key falls back
/// to [`DriverFamily::Generic`] with a warning, never an error.
pub fn select_driver_family(
    os_version: Option<&str>,
    os_type: Option<&str>,
    app_path: Option<&str>,
    device_type: Option<&str>,
) -> DriverFamily {
    let os_version = normalize(os_version);
    let os_type = normalize(os_type);
    let app_path = normalize(app_path);
    let device_type = normalize(device_type);

    let mut key = os_type.clone();

    if os_type == "android"
        && LEGACY_ANDROID_VERSIONS.contains(&os_version.as_str())
        && app_path != "chrome"
    {
        key = "selendroid".into();
    } else if os_type == "kindle" {
        key = "android".into();
    } else if matches!(os_type.as_str(), "linux" | "osx" | "windows") {
        match app_path.as_str() {
            "chrome" => key = "desktop-chrome".into(),
            "firefox" => key = "desktop-firefox".into(),
            "ie" | "internet explorer" => key = "desktop-ie".into(),
            _ => {}
        }
    } else if app_path == "chrome" {
        key = "chrome".into();
    } else if app_path.contains("webviewapp") {
        key = "webviewapp".into();
    }

    match DriverFamily::from_key(&key) {
        Some(family) => {
            log::debug!(
                "selected {} driver for os={} {} app={} device={}",
                family,
                os_type,
                os_version,
                app_path,
                device_type
            );
            family
        }
        None => {
            log::warn!(
                "no specific driver for '{}' (os={} {}, app={}), using the generic driver",
                key,
                os_type,
                os_version,
                app_path
            );
            DriverFamily::Generic
        }
    }
}
