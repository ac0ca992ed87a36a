//! Runtime requirement detection from step text.

use crate::driver::requirements::{DeviceType, RuntimeRequirements};
use crate::error::HarnessError;
use crate::steps::pattern::{Anchoring, StepPattern};
use crate::utils::config::HarnessConfig;
use std::sync::OnceLock;

pub const APP_STEPS: [&str; 3] = [
    "I have {app} installed",
    "I download the app from {app}",
    "I download the {app} app",
];

pub const APP_PACKAGE_STEP: &str = "the app's package is {package}";

pub const APP_ACTIVITY_STEP: &str = "the app's activity is {activity}";

/// Least to most specific; detection walks them in reverse.
pub const DEVICE_STEPS: [&str; 5] = [
    "I run the app on {os_type} {os_ver}",
    "I run the app on a {os_type} {os_ver}",
    "I run the app on an {os_type} {os_ver}",
    "I run the app on a {os_type} {os_ver} {device_type}",
    "I run the app on an {os_type} {os_ver} {device_type}",
];

struct Detectors {
    app: Vec<StepPattern>,
    package: StepPattern,
    activity: StepPattern,
    device: Vec<StepPattern>,
}

fn compile(pattern: &str) -> Result<StepPattern, regex::Error> {
    StepPattern::new(pattern, Anchoring::LineEnd)
}

fn build_detectors() -> Result<Detectors, regex::Error> {
    Ok(Detectors {
        app: APP_STEPS.iter().map(|p| compile(p)).collect::<Result<_, _>>()?,
        package: compile(APP_PACKAGE_STEP)?,
        activity: compile(APP_ACTIVITY_STEP)?,
        device: DEVICE_STEPS
            .iter()
            .rev()
            .map(|p| compile(p))
            .collect::<Result<_, _>>()?,
    })
}

fn detectors() -> Result<&'static Detectors, HarnessError> {
    static DETECTORS: OnceLock<Result<Detectors, regex::Error>> = OnceLock::new();
    DETECTORS
        .get_or_init(build_detectors)
        .as_ref()
        .map_err(|e| HarnessError::Config(format!("invalid requirement phrase: {}", e)))
}

/// Values a scenario has declared so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declarations {
    pub app_uri: Option<String>,
    pub app_package: Option<String>,
    pub app_activity: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub device_type: DeviceType,
    pub user_agent: Option<String>,
    pub window_size: Option<(u32, u32)>,
}

impl Declarations {
    pub fn requirements(&self) -> RuntimeRequirements {
        RuntimeRequirements {
            os_type: self.os_type.clone().unwrap_or_default(),
            os_version: self.os_version.clone().unwrap_or_default(),
            device_type: self.device_type,
            app_uri: self.app_uri.clone().unwrap_or_default(),
            app_package: self.app_package.clone(),
            app_activity: self.app_activity.clone(),
        }
    }
}

/// Scan step text (one step per line) for app, package, activity and device
/// declarations.
pub fn detect_requirements(
    step_text: &str,
    config: &HarnessConfig,
) -> Result<Declarations, HarnessError> {
    let detectors = detectors()?;
    let mut found = Declarations::default();

    if let Some(app) = detectors
        .app
        .iter()
        .find_map(|p| p.captures(step_text))
        .and_then(|caps| caps.get("app").cloned())
    {
        found.app_uri = Some(config.app_uri(app.trim()));
    }

    found.app_package = detectors
        .package
        .captures(step_text)
        .and_then(|caps| caps.get("package").map(|v| v.trim().to_string()));
    found.app_activity = detectors
        .activity
        .captures(step_text)
        .and_then(|caps| caps.get("activity").map(|v| v.trim().to_string()));

    if let Some(caps) = detectors.device.iter().find_map(|p| p.captures(step_text)) {
        found.os_type = caps.get("os_type").map(|v| v.trim().to_string());
        found.os_version = caps.get("os_ver").map(|v| v.trim().to_string());
        if let Some(device) = caps.get("device_type") {
            match device.parse::<DeviceType>() {
                Ok(device_type) => found.device_type = device_type,
                Err(e) => log::warn!("ignoring device type in step text: {}", e),
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_app_and_device() {
        let text = "I have shop.apk installed\nI run the app on an android 5.0 tablet\nI tap on buy";
        let found = detect_requirements(text, &HarnessConfig::default()).unwrap();
        assert_eq!(found.app_uri.as_deref(), Some("shop.apk"));
        assert_eq!(found.os_type.as_deref(), Some("android"));
        assert_eq!(found.os_version.as_deref(), Some("5.0"));
        assert_eq!(found.device_type, DeviceType::Tablet);
        assert!(found.requirements().is_complete());
    }

    #[test]
    fn test_short_device_phrase() {
        let found =
            detect_requirements("I run the app on ios 9.3", &HarnessConfig::default()).unwrap();
        assert_eq!(found.os_type.as_deref(), Some("ios"));
        assert_eq!(found.os_version.as_deref(), Some("9.3"));
        assert_eq!(found.device_type, DeviceType::None);
        assert!(found.app_uri.is_none());
    }

    #[test]
    fn test_app_names_are_looked_up() {
        let mut config = HarnessConfig::default();
        config
            .app_urls
            .insert("shop".into(), "http://builds/shop-1.2.apk".into());
        let found = detect_requirements("I download the shop app", &config).unwrap();
        assert_eq!(found.app_uri.as_deref(), Some("http://builds/shop-1.2.apk"));
    }

    #[test]
    fn test_builtin_phrases_compile() {
        let detectors = detectors().unwrap();
        assert_eq!(detectors.app.len(), APP_STEPS.len());
        assert_eq!(detectors.device.len(), DEVICE_STEPS.len());
    }

    #[test]
    fn test_package_and_activity() {
        let text = "the app's package is com.shop\nthe app's activity is .MainActivity";
        let found = detect_requirements(text, &HarnessConfig::default()).unwrap();
        assert_eq!(found.app_package.as_deref(), Some("com.shop"));
        assert_eq!(found.app_activity.as_deref(), Some(".MainActivity"));
    }
}
