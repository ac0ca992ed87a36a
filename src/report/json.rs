use super::types::TestResults;
use anyhow::{Context, Result};
use std::path::Path;

/// Write the feature/scenario/step tree as pretty JSON, to stdout without `output`.
pub fn generate(results: &TestResults, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;

    if let Some(path) = output {
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("JSON report saved to {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
