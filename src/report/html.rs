use super::types::TestResults;
use crate::runner::state::{FeatureReport, ScenarioReport, Status, StepReport};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate the HTML report, to stdout without `output`.
///
/// The page is self-contained; screenshot links stay relative so the report
/// keeps working when the artifact directory is moved.
pub fn generate(results: &TestResults, output: Option<&Path>) -> Result<()> {
    let html = generate_html(results);

    if let Some(path) = output {
        std::fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("HTML report saved to {}", path.display());
    } else {
        println!("{}", html);
    }

    Ok(())
}

fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Passed => "✓",
        Status::Failed => "✗",
        Status::Skipped => "○",
        Status::Undefined => "?",
        Status::Untested => "·",
    }
}

fn duration_html(ms: Option<u64>) -> String {
    ms.map(|d| format!("<span class=\"duration\">{}</span>", format_duration(d)))
        .unwrap_or_default()
}

fn step_html(step: &StepReport) -> String {
    let status = step.status.as_str();

    let screenshot_html = match &step.screenshot_path {
        Some(path) => format!(
            r#"<a href="{path}" class="screenshot-link" onclick="return showScreenshot(this.getAttribute('href'))">📸 Screenshot</a>"#,
            path = html_escape(path)
        ),
        None => String::new(),
    };

    let error_html = step
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="error-message">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
                <div class="step {status}">
                    <div class="step-icon">{icon}</div>
                    <div class="step-content">
                        <div class="step-name"><span class="keyword">{keyword}</span> {name}</div>
                        <div class="step-meta">
                            {duration}
                            {screenshot_html}
                        </div>
                        {error_html}
                    </div>
                </div>"#,
        icon = status_icon(step.status),
        keyword = html_escape(&step.keyword),
        name = html_escape(&step.name),
        duration = duration_html(step.duration_ms),
    )
}

fn tags_html(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!(r#"<span class="tag">@{}</span>"#, html_escape(t)))
        .collect()
}

fn scenario_html(scenario: &ScenarioReport) -> String {
    let status = scenario.status.as_str();
    let open = if matches!(scenario.status, Status::Failed | Status::Undefined) {
        " open"
    } else {
        ""
    };
    let steps: String = scenario.steps.iter().map(step_html).collect();
    let error_html = scenario
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="error-message">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
            <details class="scenario {status}"{open}>
                <summary>
                    <span class="badge">{status}</span>
                    <span class="scenario-name">{name}</span>
                    {tags}
                    {duration}
                </summary>
                <div class="steps">{steps}
                    {error_html}
                </div>
            </details>"#,
        name = html_escape(&scenario.name),
        tags = tags_html(&scenario.tags),
        duration = duration_html(scenario.duration_ms),
    )
}

fn feature_html(feature: &FeatureReport) -> String {
    let status = feature.status.as_str();
    let scenarios: String = feature.scenarios.iter().map(scenario_html).collect();
    format!(
        r#"
        <details class="feature {status}" open>
            <summary class="feature-header">
                <h3>{name} <span class="badge">{status}</span></h3>
                <span class="path">{path}</span>
                {duration}
            </summary>
            <div class="scenarios">{scenarios}
            </div>
        </details>"#,
        name = html_escape(&feature.name),
        path = html_escape(&feature.path),
        duration = duration_html(feature.duration_ms),
    )
}

fn generate_html(results: &TestResults) -> String {
    let summary = &results.summary;
    let scenarios = &summary.scenarios;
    let pass_rate = if scenarios.total > 0 {
        (scenarios.passed as f64 / scenarios.total as f64 * 100.0) as u32
    } else {
        0
    };

    let features_html: String = results.features.iter().map(feature_html).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Test Report - {session}</title>
    <style>
        :root {{
            --bg-primary: #0a0f1d;
            --bg-secondary: #141b2d;
            --bg-tertiary: #1f2937;
            --border: #374151;
            --text-primary: #f9fafb;
            --text-secondary: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
            --blue: #3b82f6;
            --purple: #8b5cf6;
        }}
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: system-ui, -apple-system, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.5;
            padding: 3rem 1rem;
        }}
        .container {{ max-width: 1100px; margin: 0 auto; }}
        header {{ margin-bottom: 3rem; display: flex; justify-content: space-between; align-items: flex-end; }}
        h1 {{ font-size: 2.25rem; font-weight: 800; letter-spacing: -0.025em; }}
        .summary {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
            gap: 1.5rem;
            margin-bottom: 3rem;
        }}
        .stat {{ background: var(--bg-secondary); border: 1px solid var(--border); padding: 1.5rem; border-radius: 1rem; }}
        .stat-value {{ font-size: 2.5rem; font-weight: 800; }}
        .stat-label {{ color: var(--text-secondary); font-size: 0.875rem; text-transform: uppercase; letter-spacing: 0.05em; }}
        .stat.passed .stat-value {{ color: var(--green); }}
        .stat.failed .stat-value {{ color: var(--red); }}
        .stat.skipped .stat-value {{ color: var(--yellow); }}
        .progress-container {{ margin-bottom: 4rem; }}
        .progress-bar {{ background: var(--bg-secondary); height: 12px; border-radius: 6px; overflow: hidden; border: 1px solid var(--border); }}
        .progress-fill {{ height: 100%; background: var(--green); }}
        details > summary {{ cursor: pointer; list-style: none; }}
        details > summary::-webkit-details-marker {{ display: none; }}
        .feature {{
            background: var(--bg-secondary);
            border: 1px solid var(--border);
            border-radius: 1.25rem;
            margin-bottom: 2rem;
            overflow: hidden;
        }}
        .feature-header {{
            padding: 1.5rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
            gap: 1rem;
            border-bottom: 1px solid var(--border);
        }}
        .feature-header h3 {{ font-size: 1.25rem; font-weight: 700; display: flex; align-items: center; gap: 0.75rem; }}
        .path {{ color: var(--text-secondary); font-family: monospace; font-size: 0.8125rem; flex: 1; }}
        .badge {{
            padding: 0.25rem 0.75rem;
            border-radius: 9999px;
            font-size: 0.75rem;
            font-weight: 600;
            text-transform: uppercase;
        }}
        .passed > summary .badge {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .failed > summary .badge, .undefined > summary .badge {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .skipped > summary .badge, .untested > summary .badge {{ background: rgba(245, 158, 11, 0.1); color: var(--yellow); }}
        .scenarios {{ padding: 1rem 1.5rem; }}
        .scenario {{ border-bottom: 1px solid var(--border); padding: 0.75rem 0; }}
        .scenario > summary {{ display: flex; align-items: center; gap: 0.75rem; }}
        .scenario-name {{ font-weight: 600; flex: 1; }}
        .tag {{ color: var(--purple); font-size: 0.75rem; font-family: monospace; }}
        .steps {{ padding: 0.5rem 0 0.5rem 1.5rem; }}
        .step {{ padding: 0.5rem; border-radius: 0.75rem; display: flex; align-items: flex-start; gap: 1rem; }}
        .step:hover {{ background: var(--bg-tertiary); }}
        .step-icon {{
            width: 1.75rem;
            height: 1.75rem;
            display: flex;
            align-items: center;
            justify-content: center;
            border-radius: 0.5rem;
            flex-shrink: 0;
        }}
        .step.passed .step-icon {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .step.failed .step-icon {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .step.skipped .step-icon, .step.undefined .step-icon {{ background: rgba(245, 158, 11, 0.1); color: var(--yellow); }}
        .step-content {{ flex: 1; }}
        .step-name {{ font-family: monospace; font-size: 0.9375rem; }}
        .keyword {{ color: var(--blue); font-weight: 600; }}
        .step-meta {{ display: flex; gap: 1rem; margin-top: 0.25rem; }}
        .duration {{ color: var(--text-secondary); font-size: 0.75rem; }}
        .screenshot-link {{ color: var(--blue); font-size: 0.75rem; font-weight: 600; text-decoration: none; }}
        .screenshot-link:hover {{ text-decoration: underline; }}
        .error-message {{
            background: rgba(239, 68, 68, 0.1);
            border-radius: 0.5rem;
            padding: 0.75rem;
            margin-top: 0.75rem;
            color: #fca5a5;
            font-size: 0.8125rem;
            font-family: monospace;
            white-space: pre-wrap;
            border: 1px solid rgba(239, 68, 68, 0.2);
        }}
        .meta {{
            margin-top: 4rem;
            padding-top: 2rem;
            border-top: 1px solid var(--border);
            color: var(--text-secondary);
            font-size: 0.875rem;
            display: flex;
            justify-content: center;
            gap: 2rem;
        }}
        #modal {{
            display: none;
            position: fixed;
            z-index: 100;
            top: 0;
            left: 0;
            width: 100%;
            height: 100%;
            background: rgba(0, 0, 0, 0.9);
            padding: 2rem;
            align-items: center;
            justify-content: center;
        }}
        #modal img {{ max-width: 100%; max-height: 100%; border-radius: 0.5rem; }}
        #modal.active {{ display: flex; }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <div>
                <div style="font-size: 0.875rem; font-weight: 600; color: var(--purple); text-transform: uppercase; letter-spacing: 0.1em;">Behaviour Tests</div>
                <h1>Test Execution Report</h1>
            </div>
            <div style="text-align: right;">
                <div style="font-size: 0.875rem; color: var(--text-secondary);">Run Duration</div>
                <div style="font-size: 1.25rem; font-weight: 700;">{duration}</div>
            </div>
        </header>

        <div class="summary">
            <div class="stat">
                <div class="stat-value">{features}</div>
                <div class="stat-label">Features</div>
            </div>
            <div class="stat">
                <div class="stat-value">{scenario_total}</div>
                <div class="stat-label">Scenarios</div>
            </div>
            <div class="stat passed">
                <div class="stat-value">{passed}</div>
                <div class="stat-label">Passed</div>
            </div>
            <div class="stat failed">
                <div class="stat-value">{failed}</div>
                <div class="stat-label">Failed</div>
            </div>
            <div class="stat skipped">
                <div class="stat-value">{skipped}</div>
                <div class="stat-label">Skipped</div>
            </div>
            <div class="stat">
                <div class="stat-value">{steps}</div>
                <div class="stat-label">Steps</div>
            </div>
        </div>

        <div class="progress-container">
            <div style="display: flex; justify-content: space-between; margin-bottom: 0.75rem;">
                <span style="font-weight: 600; font-size: 0.875rem;">Success Rate</span>
                <span style="font-weight: 700; color: var(--green);">{pass_rate}%</span>
            </div>
            <div class="progress-bar">
                <div class="progress-fill" style="width: {pass_rate}%"></div>
            </div>
        </div>
        {features_html}

        <div class="meta">
            <span>Session: {session}</span>
            <span>Generated: {generated}</span>
        </div>
    </div>

    <div id="modal" onclick="this.classList.remove('active')">
        <img id="modal-img" src="" alt="Screenshot">
    </div>

    <script>
        function showScreenshot(path) {{
            document.getElementById('modal-img').src = path;
            document.getElementById('modal').classList.add('active');
            return false;
        }}
    </script>
</body>
</html>"#,
        session = html_escape(&summary.session_id),
        duration = format_duration(summary.total_duration_ms.unwrap_or(0)),
        features = summary.features.total,
        scenario_total = scenarios.total,
        passed = scenarios.passed,
        failed = scenarios.failed + scenarios.undefined,
        skipped = scenarios.skipped,
        steps = summary.steps.total,
        generated = html_escape(&results.generated_at),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_results;

    #[test]
    fn test_html_has_tree_and_relative_screenshots() {
        let html = generate_html(&sample_results());

        assert!(html.contains(r#"<details class="feature failed" open>"#));
        assert!(html.contains(r#"<details class="scenario passed">"#));
        assert!(html.contains(r#"<details class="scenario failed" open>"#));
        assert!(html.contains(r#"href="Checkout/Add item/screenshot-001-I tap on add here.png""#));
        assert!(html.contains("I tap on add &lt;here&gt;"));
        assert!(html.contains("could not find element &#39;pay&#39;"));
        assert!(html.contains(r#"<span class="tag">@smoke</span>"#));
        assert!(html.contains("50%"));
    }

    #[test]
    fn test_html_is_self_contained() {
        let html = generate_html(&sample_results());
        assert!(!html.contains("https://"));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(125_000), "2m 5s");
    }
}
