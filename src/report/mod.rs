pub mod html;
pub mod json;
pub mod junit;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

/// Render a saved `results.json` in another format
pub fn generate_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let results = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read {}", results_path.display()))?;
    let test_results: types::TestResults = serde_json::from_str(&results)
        .with_context(|| format!("{} is not a results file", results_path.display()))?;

    match format {
        "json" => json::generate(&test_results, output),
        "html" => html::generate(&test_results, output),
        "junit" => junit::generate(&test_results, output),
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

/// Write `results.json`, `index.html` and `junit.xml` into `dir`.
pub fn write_all(results: &types::TestResults, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    json::generate(results, Some(&dir.join("results.json")))?;
    html::generate(results, Some(&dir.join("index.html")))?;
    junit::generate(results, Some(&dir.join("junit.xml")))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::types::TestResults;
    use crate::runner::feature::parse_feature;
    use crate::runner::state::{FeatureState, RunState};
    use std::path::Path;

    const CHECKOUT: &str = r#"@smoke
Feature: Checkout
  Scenario: Add item
    Given I run the app on android 5.0
    When I tap on add <here>

  Scenario: Pay
    Given I run the app on android 5.0
    When I tap on pay
    Then receipt should appear
"#;

    /// One passing and one failing scenario
    pub fn sample_results() -> TestResults {
        let feature = parse_feature(CHECKOUT, Path::new("features/checkout.feature")).unwrap();
        let mut state = FeatureState::new(&feature);
        state.start();

        let add = &mut state.scenarios[0];
        add.start();
        for step in &mut add.steps {
            step.start();
            step.pass();
        }
        add.steps[1].screenshot_path =
            Some("Checkout/Add item/screenshot-001-I tap on add here.png".into());
        add.finish();

        let pay = &mut state.scenarios[1];
        pay.start();
        pay.steps[0].start();
        pay.steps[0].pass();
        pay.steps[1].start();
        pay.steps[1].fail("could not find element 'pay'".into());
        pay.skip_remaining(2);
        pay.finish();
        state.finish();

        let mut run = RunState::new("run-42");
        run.start();
        run.features.push(state);
        run.finish();
        TestResults::new(run.to_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::sample_results;

    #[test]
    fn test_write_all_and_regenerate() {
        let dir = std::env::temp_dir().join(format!("lumi-bdd-report-{}", uuid::Uuid::new_v4()));
        write_all(&sample_results(), &dir).unwrap();
        assert!(dir.join("results.json").exists());
        assert!(dir.join("index.html").exists());
        assert!(dir.join("junit.xml").exists());

        let junit = dir.join("again.xml");
        generate_report(&dir.join("results.json"), "junit", Some(&junit)).unwrap();
        let xml = std::fs::read_to_string(&junit).unwrap();
        assert!(xml.contains(r#"<testsuite name="Checkout""#));

        let err = generate_report(&dir.join("results.json"), "pdf", None).unwrap_err();
        assert_eq!(err.to_string(), "Unknown format: pdf");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_results_file() {
        let err = generate_report(Path::new("/nonexistent/results.json"), "html", None).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));
    }
}
