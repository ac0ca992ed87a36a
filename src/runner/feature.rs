//! Feature file loading.
//!
//! Gherkin is parsed by the `gherkin` crate and flattened into the small model
//! the runner works with: scenario outlines are expanded per example row and
//! rule scenarios are lifted next to the top-level ones.

use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Given,
    When,
    Then,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Given => "given",
            StepType::When => "when",
            StepType::Then => "then",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<gherkin::StepType> for StepType {
    fn from(ty: gherkin::StepType) -> Self {
        match ty {
            gherkin::StepType::Given => StepType::Given,
            gherkin::StepType::When => StepType::When,
            gherkin::StepType::Then => StepType::Then,
        }
    }
}

/// Data table attached to a step; the first row holds the headings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub headings: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let headings = rows.remove(0);
        Self { headings, rows }
    }

    /// Rows keyed by heading
    pub fn records(&self) -> Vec<HashMap<&str, &str>> {
        self.rows
            .iter()
            .map(|row| {
                self.headings
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter().map(String::as_str))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub keyword: String,
    pub step_type: StepType,
    pub text: String,
    pub table: Option<DataTable>,
    pub docstring: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    pub name: String,
    /// Own tags plus those inherited from the feature/rule/examples
    pub tags: Vec<String>,
    /// Background steps followed by the scenario's own steps
    pub steps: Vec<StepSpec>,
    /// How many of `steps` come from the background
    pub background_len: usize,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub path: PathBuf,
    pub tags: Vec<String>,
    pub scenarios: Vec<ScenarioSpec>,
}

impl FeatureSpec {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn clean_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('@').to_string()
}

fn substitute(text: &str, values: &[(String, String)]) -> String {
    values.iter().fold(text.to_string(), |acc, (name, value)| {
        acc.replace(&format!("<{}>", name), value)
    })
}

fn convert_step(step: &gherkin::Step, values: &[(String, String)]) -> StepSpec {
    StepSpec {
        keyword: step.keyword.trim().to_string(),
        step_type: step.ty.into(),
        text: substitute(&step.value, values),
        table: step.table.as_ref().map(|t| {
            DataTable::from_rows(
                t.rows
                    .iter()
                    .map(|row| row.iter().map(|cell| substitute(cell, values)).collect())
                    .collect(),
            )
        }),
        docstring: step.docstring.as_ref().map(|d| substitute(d, values)),
        line: step.position.line,
    }
}

fn expand_scenario(
    scenario: &gherkin::Scenario,
    background: &[gherkin::Step],
    inherited_tags: &[String],
) -> Vec<ScenarioSpec> {
    let mut base_tags: Vec<String> = inherited_tags.to_vec();
    base_tags.extend(scenario.tags.iter().map(|t| clean_tag(t)));

    let build = |name: String, tags: Vec<String>, values: &[(String, String)]| {
        let mut steps: Vec<StepSpec> = background.iter().map(|s| convert_step(s, values)).collect();
        let background_len = steps.len();
        steps.extend(scenario.steps.iter().map(|s| convert_step(s, values)));
        ScenarioSpec {
            name,
            tags,
            steps,
            background_len,
            line: scenario.position.line,
        }
    };

    if scenario.examples.is_empty() {
        return vec![build(scenario.name.clone(), base_tags, &[])];
    }

    let mut expanded = Vec::new();
    for (table_index, examples) in scenario.examples.iter().enumerate() {
        let Some(table) = examples.table.as_ref() else {
            continue;
        };
        let Some((headings, rows)) = table.rows.split_first() else {
            continue;
        };
        let mut tags = base_tags.clone();
        tags.extend(examples.tags.iter().map(|t| clean_tag(t)));
        for (row_index, row) in rows.iter().enumerate() {
            let values: Vec<(String, String)> = headings
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            let name = format!(
                "{} -- @{}.{}",
                scenario.name,
                table_index + 1,
                row_index + 1
            );
            expanded.push(build(name, tags.clone(), &values));
        }
    }
    expanded
}

fn convert_feature(feature: gherkin::Feature, path: &Path) -> FeatureSpec {
    let tags: Vec<String> = feature.tags.iter().map(|t| clean_tag(t)).collect();
    let background: Vec<gherkin::Step> = feature
        .background
        .as_ref()
        .map(|b| b.steps.clone())
        .unwrap_or_default();

    let mut scenarios = Vec::new();
    for scenario in &feature.scenarios {
        scenarios.extend(expand_scenario(scenario, &background, &tags));
    }
    for rule in &feature.rules {
        let mut rule_background = background.clone();
        if let Some(b) = rule.background.as_ref() {
            rule_background.extend(b.steps.iter().cloned());
        }
        let mut rule_tags = tags.clone();
        rule_tags.extend(rule.tags.iter().map(|t| clean_tag(t)));
        for scenario in &rule.scenarios {
            scenarios.extend(expand_scenario(scenario, &rule_background, &rule_tags));
        }
    }

    FeatureSpec {
        name: feature.name.clone(),
        path: path.to_path_buf(),
        tags,
        scenarios,
    }
}

/// Parse feature source text.
pub fn parse_feature(source: &str, path: &Path) -> Result<FeatureSpec, HarnessError> {
    let feature = gherkin::Feature::parse(source, gherkin::GherkinEnv::default()).map_err(|e| {
        HarnessError::FeatureParse {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(convert_feature(feature, path))
}

/// Collect `.feature` files below each path (files are taken as-is), sorted.
pub fn discover_feature_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, HarnessError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(HarnessError::Config(format!(
                "feature path {} does not exist",
                path.display()
            )));
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "feature"))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// Discover and parse every feature under `paths`.
pub fn load_features(paths: &[PathBuf]) -> Result<Vec<FeatureSpec>, HarnessError> {
    let mut features = Vec::new();
    for file in discover_feature_files(paths)? {
        let source = std::fs::read_to_string(&file).map_err(|e| HarnessError::FeatureParse {
            path: file.display().to_string(),
            message: e.to_string(),
        })?;
        log::debug!("loading feature file {}", file.display());
        features.push(parse_feature(&source, &file)?);
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"@single_session
Feature: Shopping cart

  Background:
    Given I have shop.apk installed

  @smoke
  Scenario: Add an item
    When I run the app on an android 5.0 phone
    And I tap on add
    Then the following strings should be in the logcat logs
      | string | times |
      | added  | 1     |

  Scenario Outline: Search
    When I type <term> into search
    Then results should contain the text <term>

    Examples:
      | term  |
      | shoes |
      | hats  |
"#;

    fn parsed() -> FeatureSpec {
        parse_feature(SOURCE, Path::new("cart.feature")).unwrap()
    }

    #[test]
    fn test_background_is_prepended() {
        let feature = parsed();
        assert_eq!(feature.name, "Shopping cart");
        assert!(feature.has_tag("single_session"));
        let first = &feature.scenarios[0];
        assert_eq!(first.background_len, 1);
        assert_eq!(first.steps[0].text, "I have shop.apk installed");
        assert_eq!(first.steps[0].step_type, StepType::Given);
        assert_eq!(first.steps.len(), 4);
    }

    #[test]
    fn test_and_inherits_previous_type() {
        let feature = parsed();
        let steps = &feature.scenarios[0].steps;
        assert_eq!(steps[2].keyword, "And");
        assert_eq!(steps[2].step_type, StepType::When);
    }

    #[test]
    fn test_tags_are_inherited_without_at_sign() {
        let feature = parsed();
        assert_eq!(
            feature.scenarios[0].tags,
            vec!["single_session".to_string(), "smoke".to_string()]
        );
    }

    #[test]
    fn test_tables_are_keyed_by_heading() {
        let feature = parsed();
        let table = feature.scenarios[0].steps[3].table.clone().unwrap();
        let records = table.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["string"], "added");
        assert_eq!(records[0]["times"], "1");
    }

    #[test]
    fn test_outline_expands_per_row() {
        let feature = parsed();
        assert_eq!(feature.scenarios.len(), 3);
        assert_eq!(feature.scenarios[1].name, "Search -- @1.1");
        assert_eq!(feature.scenarios[1].steps[1].text, "I type shoes into search");
        assert_eq!(
            feature.scenarios[2].steps[2].text,
            "results should contain the text hats"
        );
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_feature("this is not gherkin", Path::new("bad.feature")).unwrap_err();
        assert!(err.to_string().contains("bad.feature"));
    }

    #[test]
    fn test_missing_feature_dir_is_rejected() {
        let err = discover_feature_files(&[PathBuf::from("/definitely/not/here")]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
