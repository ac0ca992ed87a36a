use super::types::TestResults;
use crate::runner::state::{FeatureReport, ScenarioReport, Status};
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: Option<u64>) -> String {
    (ms.unwrap_or(0) as f64 / 1000.0).to_string()
}

fn is_failure(status: Status) -> bool {
    matches!(status, Status::Failed | Status::Undefined)
}

/// Generate a JUnit XML document: one testsuite per feature, one testcase per scenario.
pub fn generate_junit_xml(results: &TestResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let scenarios = &results.summary.scenarios;
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "lumi-bdd-run"));
    suites_start.push_attribute(("tests", scenarios.total.to_string().as_str()));
    suites_start.push_attribute((
        "failures",
        (scenarios.failed + scenarios.undefined).to_string().as_str(),
    ));
    suites_start.push_attribute(("skipped", scenarios.skipped.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(results.summary.total_duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    for feature in &results.features {
        write_test_suite(&mut writer, feature, &results.generated_at)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_suite<W: std::io::Write>(
    writer: &mut Writer<W>,
    feature: &FeatureReport,
    timestamp: &str,
) -> Result<()> {
    let failures = feature
        .scenarios
        .iter()
        .filter(|s| is_failure(s.status))
        .count();
    let skipped = feature
        .scenarios
        .iter()
        .filter(|s| s.status == Status::Skipped)
        .count();

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", feature.name.as_str()));
    suite_start.push_attribute(("tests", feature.scenarios.len().to_string().as_str()));
    suite_start.push_attribute(("failures", failures.to_string().as_str()));
    suite_start.push_attribute(("skipped", skipped.to_string().as_str()));
    suite_start.push_attribute(("time", seconds(feature.duration_ms).as_str()));
    suite_start.push_attribute(("timestamp", timestamp));
    writer.write_event(Event::Start(suite_start))?;

    // feature path as a dotted class name, like a package
    let classname = feature
        .path
        .trim_end_matches(".feature")
        .replace(['/', '\\'], ".");
    for scenario in &feature.scenarios {
        write_test_case(writer, scenario, &classname)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

/// The message a failed scenario is reported with
fn failure_message(scenario: &ScenarioReport) -> String {
    if let Some(error) = &scenario.error {
        return error.clone();
    }
    scenario
        .steps
        .iter()
        .find_map(|step| match step.status {
            Status::Failed => Some(format!(
                "{} {}: {}",
                step.keyword,
                step.name,
                step.error.as_deref().unwrap_or("failed")
            )),
            Status::Undefined => Some(format!("Undefined step: {} {}", step.keyword, step.name)),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &ScenarioReport,
    classname: &str,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", scenario.name.as_str()));
    case_start.push_attribute(("classname", classname));
    case_start.push_attribute(("time", seconds(scenario.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    if is_failure(scenario.status) {
        let message = failure_message(scenario);
        let mut fail_start = BytesStart::new("failure");
        fail_start.push_attribute(("message", message.as_str()));
        fail_start.push_attribute(("type", scenario.status.as_str()));
        writer.write_event(Event::Start(fail_start))?;
        writer.write_event(Event::Text(BytesText::new(&message)))?;
        writer.write_event(Event::End(BytesEnd::new("failure")))?;
    } else if scenario.status == Status::Skipped {
        writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write the XML to `output`, or stdout
pub fn generate(results: &TestResults, output: Option<&Path>) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    if let Some(path) = output {
        std::fs::write(path, xml).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("JUnit report saved to {}", path.display());
    } else {
        println!("{}", xml);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_results;

    #[test]
    fn test_generate_junit_xml() {
        let xml = generate_junit_xml(&sample_results()).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="lumi-bdd-run" tests="2" failures="1" skipped="0""#));
        assert!(xml.contains(r#"<testsuite name="Checkout" tests="2" failures="1""#));
        assert!(xml.contains(r#"<testcase name="Add item" classname="features.checkout""#));
        assert!(xml.contains(r#"message="When I tap on pay: could not find element"#));
        assert!(xml.contains(r#"type="failed""#));
    }

    #[test]
    fn test_skipped_scenario_marked() {
        let mut results = sample_results();
        results.features[0].scenarios[0].status = Status::Skipped;
        let xml = generate_junit_xml(&results).unwrap();
        assert!(xml.contains("<skipped/>"));
    }
}
