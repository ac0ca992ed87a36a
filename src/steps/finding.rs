//! Assertions about elements, pages and backend logs.

use super::waiting::wait_time;
use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::family::{NATIVE_CONTEXT, WEBVIEW_CONTEXT};
use crate::driver::traits::{LogEntry, Rect};
use crate::error::HarnessError;
use crate::handler;
use crate::runner::context::TestContext;
use crate::utils::poll::Poller;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

/// How long the log waits give text to show up when the step names no time
const DEFAULT_LOG_WAIT_SECS: f64 = 20.0;

const LOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Frequency meaning "at least once"
const AT_LEAST_ONCE: i64 = -1;

async fn visible(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let locator = args.get("element")?;
    let element = ctx.find(locator).await?;
    anyhow::ensure!(
        ctx.session().await?.is_displayed(&element).await?,
        "{} should be present and displayed",
        locator
    );
    Ok(())
}

/// Passes when the element is missing altogether.
async fn hidden(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let locator = args.get("element")?;
    let element = match ctx.driver()?.find(locator).await {
        Ok(element) => element,
        Err(HarnessError::ElementNotFound { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    anyhow::ensure!(
        !ctx.session().await?.is_displayed(&element).await?,
        "{} should not be present and displayed",
        locator
    );
    Ok(())
}

async fn selected(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let locator = args.get("element")?;
    let element = ctx.find(locator).await?;
    anyhow::ensure!(
        ctx.session().await?.is_selected(&element).await?,
        "{} should be selected",
        locator
    );
    Ok(())
}

async fn not_selected(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let locator = args.get("element")?;
    let element = ctx.find(locator).await?;
    anyhow::ensure!(
        !ctx.session().await?.is_selected(&element).await?,
        "{} should not be selected",
        locator
    );
    Ok(())
}

/// Whether `rect` lies in the named region of a `window`-sized surface.
///
/// `center` and `viewport` look at both axes. Any other location is read
/// word by word and decided by its first word alone, so `top left` only
/// checks `top`.
pub(crate) fn in_region(rect: &Rect, window: (f64, f64), location: &str) -> bool {
    let (width, height) = window;
    let top = rect.y / height;
    let bottom = top + rect.height / height;
    let left = rect.x / width;
    let right = left + rect.width / width;
    log::debug!(
        "element bounds: top {}, left {}, right {}, bottom {}; expecting {}",
        top,
        left,
        right,
        bottom,
        location
    );

    match location {
        "center" => top > 0.3 && bottom < 0.7 && left > 0.3 && right < 0.7,
        "viewport" => top >= 0.0 && bottom <= 1.0 && left >= 0.0 && right <= 1.0,
        _ => match location.split_whitespace().next() {
            Some("top") => top >= 0.0 && bottom <= 0.5,
            Some("bottom") => top >= 0.5 && bottom <= 1.0,
            Some("left") => left >= 0.0 && right <= 0.5,
            Some("right") => left >= 0.5 && right <= 1.0,
            _ => {
                log::error!("unsupported location {}", location);
                false
            }
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    App,
    Webview,
}

fn script_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Web view sizes come from the page itself so they share the element's
/// pixel density.
async fn webview_size(ctx: &mut TestContext) -> Result<(f64, f64)> {
    let session = ctx.session().await?;
    let width = session
        .execute_script("return document.documentElement.clientWidth", Vec::new())
        .await?;
    let height = session
        .execute_script("return document.documentElement.clientHeight", Vec::new())
        .await?;
    let width = script_number(&width).context("web view reported no width")?;
    let height = script_number(&height).context("web view reported no height")?;
    Ok((width, height))
}

async fn is_in_region(
    ctx: &mut TestContext,
    thing: &str,
    location: &str,
    surface: Surface,
) -> Result<bool> {
    let context = match surface {
        Surface::App => NATIVE_CONTEXT,
        Surface::Webview => WEBVIEW_CONTEXT,
    };
    let element = match ctx.driver()?.find_in_context(thing, context).await {
        Ok(element) => element,
        Err(e) => {
            log::debug!("{} not found in {}: {}", thing, context, e);
            return Ok(false);
        }
    };
    let window = match surface {
        Surface::App => ctx.session().await?.window_size().await?,
        Surface::Webview => webview_size(ctx).await?,
    };
    let session = ctx.session().await?;
    if !session.is_displayed(&element).await? {
        return Ok(false);
    }
    let rect = session.element_rect(&element).await?;
    Ok(in_region(&rect, window, location))
}

async fn check_region(ctx: &mut TestContext, args: &StepArgs, surface: Surface, expected: bool) -> Result<()> {
    let thing = args.get("thing")?;
    let location = args.get("location")?;
    let found = is_in_region(ctx, thing, location, surface).await?;
    if expected {
        anyhow::ensure!(found, "{} was not at {}", thing, location);
    } else {
        anyhow::ensure!(!found, "{} was at {}", thing, location);
    }
    Ok(())
}

async fn in_app_region(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    check_region(ctx, &args, Surface::App, true).await
}

async fn not_in_app_region(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    check_region(ctx, &args, Surface::App, false).await
}

async fn in_webview_region(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    check_region(ctx, &args, Surface::Webview, true).await
}

async fn not_in_webview_region(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    check_region(ctx, &args, Surface::Webview, false).await
}

/// The point of `rect` a location names, e.g. its bottom-right corner
fn anchor_point(rect: &Rect, location: &str) -> Option<(f64, f64)> {
    let (fx, fy) = match location {
        "top-left" => (0.0, 0.0),
        "top-right" => (1.0, 0.0),
        "top-center" => (0.5, 0.0),
        "bottom-left" => (0.0, 1.0),
        "bottom-right" => (1.0, 1.0),
        "bottom-center" => (0.5, 1.0),
        "center" => (0.5, 0.5),
        _ => return None,
    };
    Some((rect.x + rect.width * fx, rect.y + rect.height * fy))
}

async fn inside_at(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let thing = args.get("thing")?;
    let container = args.get("element")?;
    let location = args.get("location")?;

    let item = ctx.find(thing).await?;
    let outer = ctx.find(container).await?;
    let session = ctx.session().await?;
    let item_rect = session.element_rect(&item).await?;
    let outer_rect = session.element_rect(&outer).await?;

    let (Some(actual), Some(expected)) = (
        anchor_point(&item_rect, location),
        anchor_point(&outer_rect, location),
    ) else {
        anyhow::bail!("{} is not a supported location", location);
    };

    // odd dimensions round differently on each side
    anyhow::ensure!(
        (actual.0 - expected.0).abs() <= 1.0 && (actual.1 - expected.1).abs() <= 1.0,
        "{} is not in expected location inside {} at {}. Expected at [{}, {}] but was at [{}, {}]",
        thing,
        container,
        location,
        expected.0,
        expected.1,
        actual.0,
        actual.1
    );
    Ok(())
}

async fn text_of(ctx: &mut TestContext, locator: &str) -> Result<String> {
    let element = ctx.find(locator).await?;
    Ok(ctx.session().await?.element_text(&element).await?)
}

async fn contains_text(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let actual = text_of(ctx, args.get("thing")?).await?;
    anyhow::ensure!(
        actual.contains(text),
        "specified text \"{}\" was not present in element text: \"{}\"",
        text,
        actual
    );
    Ok(())
}

async fn lacks_text(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let actual = text_of(ctx, args.get("thing")?).await?;
    anyhow::ensure!(
        !actual.contains(text),
        "specified text \"{}\" was present in element text: \"{}\"",
        text,
        actual
    );
    Ok(())
}

async fn exact_text(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let actual = text_of(ctx, args.get("thing")?).await?;
    anyhow::ensure!(
        actual == text,
        "specified text \"{}\" != element text \"{}\"",
        text,
        actual
    );
    Ok(())
}

async fn in_current_url(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let url = ctx.session().await?.current_url().await?;
    anyhow::ensure!(url.contains(text), "\"{}\" was not in the current url: {}", text, url);
    Ok(())
}

async fn in_page_source(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let source = ctx.session().await?.page_source().await?;
    anyhow::ensure!(source.contains(text), "\"{}\" was not in the page source", text);
    Ok(())
}

async fn attribute_contains(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let attribute = args.get("attribute")?;
    let text = args.get("text")?;
    let element = ctx.find(args.get("thing")?).await?;
    let value = ctx
        .session()
        .await?
        .element_attribute(&element, attribute)
        .await?
        .filter(|v| !v.is_empty())
        .with_context(|| {
            format!(
                "element did not have an attribute named {} or it was empty",
                attribute
            )
        })?;
    anyhow::ensure!(
        value.contains(text),
        "could not find the text \"{}\" in the \"{}\" attribute, real value: \"{}\"",
        text,
        attribute,
        value
    );
    Ok(())
}

/// Check each expected substring occurs in `entries` exactly the given
/// number of times, or at least once for a negative count.
fn check_log_frequencies(
    entries: &[LogEntry],
    expected: &[(String, i64)],
    log_name: &str,
) -> Result<()> {
    let mut found = vec![0i64; expected.len()];
    for entry in entries {
        for (i, (text, times)) in expected.iter().enumerate() {
            if !entry.message.contains(text.as_str()) {
                continue;
            }
            log::debug!("string found in {}", entry.message);
            found[i] += 1;
            if *times >= 0 && found[i] > *times {
                anyhow::bail!(
                    "Expected {} {} times in the {} logs, but the number of occurrences exceeded the expectation",
                    text,
                    times,
                    log_name
                );
            }
        }
    }
    for ((text, times), count) in expected.iter().zip(found) {
        if *times >= 0 {
            anyhow::ensure!(
                count == *times,
                "Expected {} {} times in the {} logs, but found it {} times",
                text,
                times,
                log_name,
                count
            );
        } else {
            anyhow::ensure!(count > 0, "{} was not found in the {} logs", text, log_name);
        }
    }
    Ok(())
}

async fn expect_in_logs(ctx: &mut TestContext, log_name: &str, expected: &[(String, i64)]) -> Result<()> {
    let entries = ctx.session().await?.logs(log_name).await?;
    check_log_frequencies(&entries, expected, log_name)
}

async fn text_in_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let times = match args.opt("times") {
        Some(_) => args.parse::<i64>("times")?,
        None => AT_LEAST_ONCE,
    };
    let expected = [(args.get("text")?.to_string(), times)];
    expect_in_logs(ctx, args.get("log_name")?, &expected).await
}

async fn text_not_in_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let expected = [(args.get("text")?.to_string(), 0)];
    expect_in_logs(ctx, args.get("log_name")?, &expected).await
}

fn frequency(raw: &str, text: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .with_context(|| format!("frequency of '{}' is not a number: {}", text, raw))
}

/// Table rows of `string` and `frequency` (or `times`)
async fn table_in_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let table = ctx
        .table
        .clone()
        .context("this step needs a table of strings and frequencies")?;
    let mut expected = Vec::new();
    for record in table.records() {
        let text = record
            .get("string")
            .context("the table needs a 'string' column")?;
        let raw = record
            .get("frequency")
            .or_else(|| record.get("times"))
            .context("the table needs a 'frequency' column")?;
        expected.push((text.to_string(), frequency(raw, text)?));
    }
    expect_in_logs(ctx, args.get("log_name")?, &expected).await
}

/// `{"text": count, ...}` in the step itself
async fn json_in_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let raw = args.get("text_json")?;
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(raw)
        .with_context(|| format!("expected a JSON object of strings to counts, got {}", raw))?;
    let mut expected = Vec::new();
    for (text, count) in parsed {
        let times = match &count {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .with_context(|| format!("frequency of '{}' is not a number: {}", text, count))?;
        expected.push((text, times));
    }
    expect_in_logs(ctx, args.get("log_name")?, &expected).await
}

/// Every regex in the table has to match one and the same entry.
async fn same_entry_in_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let log_name = args.get("log_name")?;
    let table = ctx
        .table
        .clone()
        .context("this step needs a table of strings")?;
    let patterns = table
        .records()
        .iter()
        .map(|record| {
            let raw = record
                .get("string")
                .context("the table needs a 'string' column")?;
            Regex::new(raw).with_context(|| format!("invalid regular expression {}", raw))
        })
        .collect::<Result<Vec<_>>>()?;

    let entries = ctx.session().await?.logs(log_name).await?;
    let together = entries
        .iter()
        .any(|entry| patterns.iter().all(|re| re.is_match(&entry.message)));
    anyhow::ensure!(
        together,
        "The strings were not present in the same entry of the {} logs",
        log_name
    );
    Ok(())
}

/// Keep the last log message matching `regex` under `key`.
async fn save_log_message(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let log_name = args.get("log_name")?;
    let raw = args.get("regex")?;
    let re = Regex::new(raw).with_context(|| format!("invalid regular expression {}", raw))?;
    let entries = ctx.session().await?.logs(log_name).await?;
    let message = entries
        .into_iter()
        .rev()
        .find(|entry| re.is_match(&entry.message))
        .map(|entry| entry.message)
        .with_context(|| format!("{} was not found in the {} logs", raw, log_name))?;
    ctx.save(args.get("key")?, message);
    Ok(())
}

async fn value_in_saved(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let value = args.get("value")?;
    let key = args.get("key")?;
    let saved = ctx.saved(key)?;
    anyhow::ensure!(saved.contains(value), "{} is not in {}: {}", value, key, saved);
    Ok(())
}

async fn value_not_in_saved(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let value = args.get("value")?;
    let key = args.get("key")?;
    let saved = ctx.saved(key)?;
    anyhow::ensure!(!saved.contains(value), "{} is in {}: {}", value, key, saved);
    Ok(())
}

async fn wait_for_log_text(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let text = args.get("text")?;
    let log_name = args.get("log_name")?;
    let secs = wait_time(&args, DEFAULT_LOG_WAIT_SECS)?;
    let mut poller = Poller::new(Duration::from_secs_f64(secs), LOG_POLL_INTERVAL);
    loop {
        let entries = ctx.session().await?.logs(log_name).await?;
        if entries.iter().any(|entry| entry.message.contains(text)) {
            return Ok(());
        }
        if !poller.tick().await {
            anyhow::bail!(
                "{} did not appear in the {} logs within {} seconds",
                text,
                log_name,
                secs
            );
        }
    }
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Then,
        &[
            "{element} should appear",
            "{element} should be visible",
            "{element} should not be hidden",
        ],
        handler!(visible),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{element} should be hidden",
            "{element} should not appear",
            "{element} should not be visible",
        ],
        handler!(hidden),
    )?;
    registry.register(StepKind::Then, "{element} should be selected", handler!(selected))?;
    registry.register(StepKind::Then, "{element} should not be selected", handler!(not_selected))?;

    registry.register_all(
        StepKind::Then,
        &[
            "{thing} should not be at the {location} of the webview",
            "{thing} should not be in the {location} of the webview",
        ],
        handler!(not_in_webview_region),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{thing} should not be at the {location} of the app",
            "{thing} should not be in the {location} of the app",
        ],
        handler!(not_in_app_region),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{thing} should be at the {location} of the webview",
            "{thing} should be in the {location} of the webview",
        ],
        handler!(in_webview_region),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{thing} should be at the {location} of the app",
            "{thing} should be in the {location} of the app",
        ],
        handler!(in_app_region),
    )?;
    registry.register(
        StepKind::Then,
        "{thing} should be inside {element} located at {location}",
        handler!(inside_at),
    )?;

    registry.register(
        StepKind::Then,
        "{thing} should contain the exact text {text}",
        handler!(exact_text),
    )?;
    registry.register(
        StepKind::Then,
        "{thing} should not contain the text {text}",
        handler!(lacks_text),
    )?;
    registry.register(
        StepKind::Then,
        "{thing} should contain the text {text}",
        handler!(contains_text),
    )?;
    registry.register(
        StepKind::Then,
        "{text} should be in the current url",
        handler!(in_current_url),
    )?;
    registry.register(
        StepKind::Then,
        "{text} should be in the page source",
        handler!(in_page_source),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{thing} should have an {attribute} containing {text}",
            "{thing} should have a {attribute} containing {text}",
        ],
        handler!(attribute_contains),
    )?;

    registry.register_all(
        StepKind::Then,
        &[
            "the {log_name} logs will contain the following strings in the same entry",
            "the {log_name} logs will contain the following strings in the same line",
            "the {log_name} logs will contain the following strings on the same line",
        ],
        handler!(same_entry_in_logs),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "the {log_name} logs will contain the following strings",
            "the {log_name} logs will contain strings based on their frequencies listed in the following table",
        ],
        handler!(table_in_logs),
    )?;
    registry.register(
        StepKind::Then,
        "the strings {text_json} should be in the {log_name} logs",
        handler!(json_in_logs),
    )?;
    registry.register(
        StepKind::Then,
        "{text} should not be in the {log_name} logs",
        handler!(text_not_in_logs),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "the following string should be in the {log_name} logs {times} times: {text}",
            "the following string should be in the {log_name} logs {times} time: {text}",
            "the following string should be in the {log_name} logs: {text}",
            "{text} should be in the {log_name} logs {times} times",
            "{text} should be in the {log_name} logs {times} time",
            "{text} should be in the {log_name} logs",
        ],
        handler!(text_in_logs),
    )?;

    registry.register_all(
        StepKind::Step,
        &[
            "I save the {log_name} log message containing the text {regex} as {key}",
            "I save the {log_name} log message matching the regular expression {regex} as {key}",
        ],
        handler!(save_log_message),
    )?;
    registry.register(
        StepKind::Step,
        "I verify {value} is not in the context's list at {key}",
        handler!(value_not_in_saved),
    )?;
    registry.register(
        StepKind::Step,
        "I verify {value} is in the context's list at {key}",
        handler!(value_in_saved),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "I wait until the following text appears in the {log_name} logs within {wait_time} seconds: {text}",
            "I wait until the following text appears in the {log_name} logs: {text}",
            "I wait until {text} appears in the {log_name} logs within {wait_time} seconds",
            "I wait until {text} appears in the {log_name} logs",
            "{text} will eventually appear in the {log_name} logs within {wait_time} seconds",
            "{text} will eventually appear in the {log_name} logs",
        ],
        handler!(wait_for_log_text),
    )?;
    Ok(())
}
