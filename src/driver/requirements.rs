use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Form factor a scenario asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Phone,
    Tablet,
    #[default]
    None,
}

impl DeviceType {
    pub fn as_option(&self) -> Option<&'static str> {
        match self {
            DeviceType::Phone => Some("phone"),
            DeviceType::Tablet => Some("tablet"),
            DeviceType::None => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_option().unwrap_or("none"))
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phone" => Ok(DeviceType::Phone),
            "tablet" => Ok(DeviceType::Tablet),
            "" | "none" => Ok(DeviceType::None),
            other => Err(format!("device type must be phone or tablet, not '{}'", other)),
        }
    }
}

/// What a scenario needs from the automation backend.
///
/// Empty strings stand for "not declared"; the capability builder decides
/// which of them are mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRequirements {
    pub os_type: String,
    pub os_version: String,
    pub device_type: DeviceType,
    pub app_uri: String,
    pub app_package: Option<String>,
    pub app_activity: Option<String>,
}

impl RuntimeRequirements {
    /// Whether enough is known to open a session up front
    pub fn is_complete(&self) -> bool {
        !self.app_uri.trim().is_empty()
            && !self.os_type.trim().is_empty()
            && !self.os_version.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_parsing() {
        assert_eq!("Phone".parse::<DeviceType>(), Ok(DeviceType::Phone));
        assert_eq!("tablet".parse::<DeviceType>(), Ok(DeviceType::Tablet));
        assert_eq!("".parse::<DeviceType>(), Ok(DeviceType::None));
        assert!("watch".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_completeness_needs_app_and_os() {
        let mut req = RuntimeRequirements {
            os_type: "android".into(),
            os_version: "5.0".into(),
            ..Default::default()
        };
        assert!(!req.is_complete());
        req.app_uri = "app.apk".into();
        assert!(req.is_complete());
    }
}
