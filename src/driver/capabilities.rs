//! Capability negotiation for new sessions.

use crate::driver::family::DriverFamily;
use crate::driver::requirements::RuntimeRequirements;
use crate::error::HarnessError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Key/value configuration sent when a session is created
pub type CapabilitySet = BTreeMap<String, Value>;

/// Optional inputs beyond the runtime requirements
#[derive(Debug, Clone, Default)]
pub struct CapabilityExtras {
    pub user_agent: Option<String>,
    /// (width, height) in pixels
    pub window_size: Option<(u32, u32)>,
    /// Merged over the built set before the processor runs
    pub overrides: Map<String, Value>,
}

/// Last-chance rewrite of the capability set, supplied by the user.
///
/// The returned set replaces the input completely.
pub trait CapabilityProcessor: Send + Sync {
    fn process(&self, capabilities: CapabilitySet) -> anyhow::Result<CapabilitySet>;
}

impl<F> CapabilityProcessor for F
where
    F: Fn(CapabilitySet) -> anyhow::Result<CapabilitySet> + Send + Sync,
{
    fn process(&self, capabilities: CapabilitySet) -> anyhow::Result<CapabilitySet> {
        self(capabilities)
    }
}

fn set(caps: &mut CapabilitySet, key: &str, value: impl Into<Value>) {
    caps.insert(key.to_string(), value.into());
}

fn set_if_present(caps: &mut CapabilitySet, key: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        set(caps, key, v);
    }
}

fn android_capabilities(caps: &mut CapabilitySet, req: &RuntimeRequirements) {
    set(caps, "platformName", "Android");
    set(caps, "platform", "ANDROID");
    set_if_present(caps, "app", Some(req.app_uri.as_str()));
    set_if_present(caps, "appPackage", req.app_package.as_deref());
    set_if_present(caps, "appActivity", req.app_activity.as_deref());
}

fn chrome_options(extras: &CapabilityExtras) -> Value {
    let mut args = Vec::new();
    if let Some(agent) = extras.user_agent.as_deref().filter(|a| !a.is_empty()) {
        args.push(format!("--user-agent={}", agent));
    }
    if let Some((width, height)) = extras.window_size {
        args.push(format!("--window-size={},{}", width, height));
    }
    json!({ "args": args, "extensions": [] })
}

/// Build the capability set a family needs for the given requirements.
///
/// The OS version is mandatory for every family. Optional android fields are
/// only written when declared.
pub fn build_capabilities(
    family: DriverFamily,
    requirements: &RuntimeRequirements,
    extras: &CapabilityExtras,
) -> Result<CapabilitySet, HarnessError> {
    let os_version = requirements.os_version.trim().to_lowercase();
    if os_version.is_empty() {
        return Err(HarnessError::MissingRequiredField("os_version"));
    }
    let os_type = requirements.os_type.trim().to_lowercase();

    let mut caps = CapabilitySet::new();
    match family {
        DriverFamily::Android => android_capabilities(&mut caps, requirements),
        DriverFamily::Selendroid => {
            android_capabilities(&mut caps, requirements);
            set(&mut caps, "automationName", "Selendroid");
        }
        DriverFamily::Ios => {
            set(&mut caps, "platformName", "iOS");
            set_if_present(&mut caps, "app", Some(requirements.app_uri.as_str()));
        }
        DriverFamily::ChromeMobile => {
            set(&mut caps, "platformName", os_type.as_str());
            set(&mut caps, "platformVersion", os_version.as_str());
            set(&mut caps, "browserName", requirements.app_uri.trim());
        }
        DriverFamily::WebviewApp => {
            set(&mut caps, "platformName", os_type.as_str());
            set(&mut caps, "platformVersion", os_version.as_str());
            set(&mut caps, "app", requirements.app_uri.trim());
        }
        DriverFamily::DesktopChrome => {
            set(&mut caps, "browserName", "chrome");
            set(&mut caps, "platform", "ANY");
            caps.insert("goog:chromeOptions".into(), chrome_options(extras));
        }
        DriverFamily::DesktopFirefox => {
            set(&mut caps, "browserName", "firefox");
            set(&mut caps, "platform", "ANY");
            set(&mut caps, "acceptInsecureCerts", true);
        }
        DriverFamily::DesktopIe => {
            set(&mut caps, "browserName", "internet explorer");
            set(&mut caps, "platform", "WINDOWS");
        }
        DriverFamily::Generic => {}
    }

    if family.uses_default_capabilities() {
        set(&mut caps, "deviceName", format!("{} {}", os_type, os_version));
        if let Some(device_type) = requirements.device_type.as_option() {
            set(&mut caps, "deviceType", device_type);
        }
        set(&mut caps, "platformVersion", os_version.as_str());
        set(&mut caps, "version", os_version.as_str());
        caps.entry("automationName".to_string())
            .or_insert_with(|| Value::from("Appium"));
    }

    for (key, value) in &extras.overrides {
        caps.insert(key.clone(), value.clone());
    }

    Ok(caps)
}

/// Hand the built set to the user's processor, if any.
///
/// Runs exactly once; errors come back untouched.
pub fn process_capabilities(
    capabilities: CapabilitySet,
    processor: Option<&dyn CapabilityProcessor>,
) -> Result<CapabilitySet, HarnessError> {
    match processor {
        Some(processor) => processor
            .process(capabilities)
            .map_err(HarnessError::CapabilityProcessing),
        None => Ok(capabilities),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::requirements::DeviceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn android_req() -> RuntimeRequirements {
        RuntimeRequirements {
            os_type: "Android".into(),
            os_version: " 5.1 ".into(),
            device_type: DeviceType::None,
            app_uri: "myapp.apk".into(),
            app_package: None,
            app_activity: None,
        }
    }

    #[test]
    fn test_android_omits_absent_package_and_activity() {
        let caps =
            build_capabilities(DriverFamily::Android, &android_req(), &CapabilityExtras::default())
                .unwrap();
        assert!(!caps.contains_key("appPackage"));
        assert!(!caps.contains_key("appActivity"));
        assert!(!caps.contains_key("deviceType"));
        assert_eq!(caps["platformName"], "Android");
        assert_eq!(caps["platform"], "ANDROID");
        assert_eq!(caps["app"], "myapp.apk");
        assert_eq!(caps["deviceName"], "android 5.1");
        assert_eq!(caps["platformVersion"], "5.1");
        assert_eq!(caps["version"], "5.1");
        assert_eq!(caps["automationName"], "Appium");
    }

    #[test]
    fn test_android_includes_declared_package_and_activity() {
        let mut req = android_req();
        req.app_package = Some("com.example".into());
        req.app_activity = Some(".Main".into());
        req.device_type = DeviceType::Tablet;
        let caps =
            build_capabilities(DriverFamily::Android, &req, &CapabilityExtras::default()).unwrap();
        assert_eq!(caps["appPackage"], "com.example");
        assert_eq!(caps["appActivity"], ".Main");
        assert_eq!(caps["deviceType"], "tablet");
    }

    #[test]
    fn test_selendroid_keeps_its_automation_name() {
        let caps = build_capabilities(
            DriverFamily::Selendroid,
            &android_req(),
            &CapabilityExtras::default(),
        )
        .unwrap();
        assert_eq!(caps["automationName"], "Selendroid");
    }

    #[test]
    fn test_ios_sets_platform_and_app_only() {
        let req = RuntimeRequirements {
            os_type: "ios".into(),
            os_version: "9.3".into(),
            app_uri: "/path/app.ipa".into(),
            app_package: Some("ignored".into()),
            ..Default::default()
        };
        let caps =
            build_capabilities(DriverFamily::Ios, &req, &CapabilityExtras::default()).unwrap();
        assert_eq!(caps["platformName"], "iOS");
        assert_eq!(caps["app"], "/path/app.ipa");
        assert!(!caps.contains_key("appPackage"));
    }

    #[test]
    fn test_missing_os_version_is_rejected() {
        let mut req = android_req();
        req.os_version = "  ".into();
        let err = build_capabilities(DriverFamily::Android, &req, &CapabilityExtras::default())
            .unwrap_err();
        assert!(matches!(err, HarnessError::MissingRequiredField("os_version")));
    }

    #[test]
    fn test_desktop_chrome_options() {
        let req = RuntimeRequirements {
            os_type: "linux".into(),
            os_version: "1".into(),
            app_uri: "chrome".into(),
            ..Default::default()
        };
        let extras = CapabilityExtras {
            user_agent: Some("Agent/1.0".into()),
            window_size: Some((800, 600)),
            ..Default::default()
        };
        let caps = build_capabilities(DriverFamily::DesktopChrome, &req, &extras).unwrap();
        assert_eq!(caps["browserName"], "chrome");
        assert_eq!(
            caps["goog:chromeOptions"]["args"],
            json!(["--user-agent=Agent/1.0", "--window-size=800,600"])
        );
        assert!(!caps.contains_key("deviceName"));
        assert!(!caps.contains_key("automationName"));
    }

    #[test]
    fn test_overrides_win_over_built_values() {
        let mut extras = CapabilityExtras::default();
        extras
            .overrides
            .insert("automationName".into(), json!("UiAutomator2"));
        let caps = build_capabilities(DriverFamily::Android, &android_req(), &extras).unwrap();
        assert_eq!(caps["automationName"], "UiAutomator2");
    }

    #[test]
    fn test_processor_runs_once_and_replaces_set() {
        let calls = AtomicUsize::new(0);
        let processor = |caps: CapabilitySet| -> anyhow::Result<CapabilitySet> {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut out = CapabilitySet::new();
            out.insert("only".into(), json!(caps.len()));
            Ok(out)
        };
        let caps =
            build_capabilities(DriverFamily::Android, &android_req(), &CapabilityExtras::default())
                .unwrap();
        let processed = process_capabilities(caps, Some(&processor)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(processed.len(), 1);
        assert!(processed.contains_key("only"));
    }

    #[test]
    fn test_processor_error_is_surfaced_unchanged() {
        let processor =
            |_: CapabilitySet| -> anyhow::Result<CapabilitySet> { anyhow::bail!("no grid slot") };
        let err = process_capabilities(CapabilitySet::new(), Some(&processor)).unwrap_err();
        assert!(matches!(err, HarnessError::CapabilityProcessing(_)));
        assert_eq!(err.to_string(), "no grid slot");
    }
}
