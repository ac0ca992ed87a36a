use crate::driver::capabilities::CapabilityExtras;
use crate::driver::resolver::ResolverSettings;
use crate::driver::webdriver::DEFAULT_WEBDRIVER_URL;
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tags may be given as one string or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagList {
    One(String),
    Many(Vec<String>),
}

impl TagList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TagList::One(tag) => vec![tag],
            TagList::Many(tags) => tags,
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directories (or single files) holding `.feature` files
    pub feature_dirs: Vec<PathBuf>,

    /// Where screenshots and reports go; nothing is written when unset
    pub test_artifact_dir: Option<PathBuf>,

    /// Only check that every step has an implementation
    pub dry_run: bool,

    pub webdriver_url: String,

    pub tags: Option<TagList>,

    /// Keep skipped scenarios in the console output
    pub show_skipped: bool,

    /// App name to URI lookup used by the app declaring steps
    pub app_urls: HashMap<String, String>,

    /// Merged into every capability set
    pub capabilities: Map<String, Value>,

    pub implicit_wait_secs: u64,

    pub max_search_secs: u64,

    pub user_agent: Option<String>,

    /// (width, height)
    pub window_size: Option<(u32, u32)>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            feature_dirs: vec![PathBuf::from("features")],
            test_artifact_dir: None,
            dry_run: false,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            tags: None,
            show_skipped: true,
            app_urls: HashMap::new(),
            capabilities: Map::new(),
            implicit_wait_secs: 10,
            max_search_secs: 10,
            user_agent: None,
            window_size: None,
        }
    }
}

impl HarnessConfig {
    /// Load a JSON or YAML (by extension) configuration file.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!(
                "Could not open {} config file: {}",
                path.display(),
                e
            ))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| {
                HarnessError::Config(format!(
                    "Could not parse {} config file as YAML: {}",
                    path.display(),
                    e
                ))
            })
        } else {
            serde_json::from_str(&text).map_err(|e| {
                HarnessError::Config(format!(
                    "Could not parse {} config file as JSON: {}",
                    path.display(),
                    e
                ))
            })
        }
    }

    pub fn tag_args(&self) -> Vec<String> {
        self.tags.clone().map(TagList::into_vec).unwrap_or_default()
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_wait: Duration::from_secs(self.max_search_secs),
            implicit_wait: Duration::from_secs(self.implicit_wait_secs),
        }
    }

    /// Capability extras before any scenario declared its own
    pub fn capability_extras(&self) -> CapabilityExtras {
        CapabilityExtras {
            user_agent: self.user_agent.clone(),
            window_size: self.window_size,
            overrides: self.capabilities.clone(),
        }
    }

    /// Look an app name up in `app_urls`, falling back to the name itself.
    pub fn app_uri(&self, app: &str) -> String {
        self.app_urls
            .get(app)
            .cloned()
            .unwrap_or_else(|| app.to_string())
    }
}
