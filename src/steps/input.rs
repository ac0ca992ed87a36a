//! Navigation, buttons, typing, taps and cookies.

use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::family::{NATIVE_CONTEXT, WEBVIEW_CONTEXT};
use crate::driver::traits::{ElementHandle, Strategy};
use crate::handler;
use crate::runner::context::TestContext;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

/// Room left above an element scrolled to, so what precedes it stays visible
const SCROLL_OFFSET: f64 = 100.0;

/// Scrolling animates; screenshots should see the final position
const SCROLL_SETTLE: Duration = Duration::from_secs(5);

async fn browse_to(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.session().await?.navigate(args.get("url")?).await?;
    Ok(())
}

async fn press_button(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.driver()?.press_button(args.get("button")?).await
}

async fn clear_and_type(ctx: &mut TestContext, element: &ElementHandle, text: &str) -> Result<()> {
    let session = ctx.session().await?;
    session.clear(element).await?;
    session.send_keys(element, text).await?;
    Ok(())
}

async fn type_into(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = ctx.find(args.get("thing")?).await?;
    clear_and_type(ctx, &element, args.get("string")?).await
}

async fn type_into_focused(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = ctx.session().await?.active_element().await?;
    clear_and_type(ctx, &element, args.get("string")?).await
}

/// Clicks inside iOS web views are unreliable, so those taps go to the
/// native layer: element centre plus the web view's own offset.
async fn tap_ios_webview(ctx: &mut TestContext, element: &ElementHandle) -> Result<()> {
    log::debug!("tapping a web view element through the native context");
    let driver = ctx.driver()?;
    let rect = driver.session().await.element_rect(element).await?;

    driver.switch_to(NATIVE_CONTEXT).await?;
    let webview = driver
        .session()
        .await
        .find_element(Strategy::ClassName, "UIAScrollView")
        .await?
        .context("could not find the web view's scroll view in the native context")?;
    let offset = driver.session().await.element_rect(&webview).await?;

    let x = rect.x + rect.width / 2.0 + offset.x;
    let y = rect.y + rect.height / 2.0 + offset.y;
    log::debug!("tapping the native context at ({}, {})", x, y);
    driver.session().await.tap(x, y).await?;

    driver.switch_to(WEBVIEW_CONTEXT).await?;
    Ok(())
}

async fn tap_on(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let thing = args.get("thing")?;
    let element = ctx.find(thing).await?;

    let is_ios = ctx
        .declared
        .os_type
        .as_deref()
        .map_or(false, |os| os.eq_ignore_ascii_case("ios"));
    let in_webview = ctx
        .session()
        .await?
        .current_context()
        .await
        .map_or(false, |c| c.contains(WEBVIEW_CONTEXT));

    if is_ios && in_webview {
        tap_ios_webview(ctx, &element).await
    } else {
        ctx.session().await?.click(&element).await?;
        Ok(())
    }
}

async fn tap_coordinate(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let x: f64 = args.parse("x")?;
    let y: f64 = args.parse("y")?;
    ctx.session().await?.tap(x, y).await?;
    Ok(())
}

async fn scroll_to(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = ctx.find(args.get("thing")?).await?;
    let session = ctx.session().await?;
    let rect = session.element_rect(&element).await?;
    let script = format!("window.scrollTo(0, {});", rect.y - SCROLL_OFFSET);
    session.execute_script(&script, Vec::new()).await?;
    tokio::time::sleep(SCROLL_SETTLE).await;
    Ok(())
}

async fn select_from_dropdown(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let value = args.get("value")?;
    let dropdown = ctx.find(args.get("dropdown")?).await?;
    let selector = format!("option[value=\"{}\"]", value.replace('"', "\\\""));
    let session = ctx.session().await?;
    let options = session
        .find_child_elements(&dropdown, Strategy::CssSelector, &selector)
        .await?;
    let option = options
        .first()
        .with_context(|| format!("Cannot locate option with value: {}", value))?;
    session.click(option).await?;
    Ok(())
}

async fn switch_context(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.driver()?.switch_to(args.get("context_name")?).await?;
    Ok(())
}

fn parse_cookie(raw: &str) -> Result<Value> {
    let cookie: Value =
        serde_json::from_str(raw).with_context(|| format!("cookie is not valid JSON: {}", raw))?;
    anyhow::ensure!(cookie.is_object(), "cookie must be a JSON object: {}", raw);
    Ok(cookie)
}

async fn add_cookie(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let cookie = parse_cookie(args.get("cookie")?)?;
    ctx.session().await?.add_cookie(cookie).await?;
    Ok(())
}

async fn delete_cookies(ctx: &mut TestContext, _args: StepArgs) -> Result<()> {
    ctx.session().await?.delete_all_cookies().await?;
    Ok(())
}

/// Replace every cookie with one weblab cookie and reload.
async fn add_weblab(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let cookie = parse_cookie(args.get("cookie")?)?;
    let session = ctx.session().await?;
    if let Some(url) = args.opt("url") {
        session.navigate(url).await?;
    }
    session.delete_all_cookies().await?;
    session.add_cookie(cookie).await?;
    let current = session.current_url().await?;
    session.navigate(&current).await?;
    Ok(())
}

async fn cookie_value(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let name = args.get("cookie_name")?;
    let expected = args.get("cookie_value")?;
    let cookie = ctx
        .session()
        .await?
        .cookie(name)
        .await?
        .with_context(|| format!("no cookie named {}", name))?;
    let actual = match &cookie["value"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    anyhow::ensure!(
        actual == expected,
        "cookie {} has the value {}, expected {}",
        name,
        actual,
        expected
    );
    Ok(())
}

async fn execute_script(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let script = args.get("script")?;
    let script_args: Vec<Value> = args
        .opt("args")
        .map(|raw| raw.split(", ").map(|a| Value::String(a.to_string())).collect())
        .unwrap_or_default();
    log::debug!("executing script '{}' with {} arguments", script, script_args.len());
    ctx.session().await?.execute_script(script, script_args).await?;
    Ok(())
}

async fn set_checkbox(ctx: &mut TestContext, args: &StepArgs, checked: bool) -> Result<()> {
    let element = ctx.find(args.get("checkbox")?).await?;
    let session = ctx.session().await?;
    let current = session.element_attribute(&element, "checked").await?;
    let toggle_from = if checked { "false" } else { "true" };
    if current.as_deref() == Some(toggle_from) {
        session.click(&element).await?;
    }
    Ok(())
}

async fn check(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    set_checkbox(ctx, &args, true).await
}

async fn uncheck(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    set_checkbox(ctx, &args, false).await
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Step,
        &["I browse to {url}", "I go to {url}"],
        handler!(browse_to),
    )?;
    registry.register_all(
        StepKind::Step,
        &["I press the {button} button", "I press {button}"],
        handler!(press_button),
    )?;
    registry.register_all(
        StepKind::Step,
        &["I type {string} into {thing}", "I type {string} in {thing}"],
        handler!(type_into),
    )?;
    registry.register(StepKind::Step, "I type {string}", handler!(type_into_focused))?;
    registry.register(StepKind::Step, "I tap on {thing}", handler!(tap_on))?;
    registry.register(StepKind::Step, "I tap coordinate {x},{y}", handler!(tap_coordinate))?;
    registry.register(StepKind::Step, "I scroll to {thing}", handler!(scroll_to))?;
    registry.register_all(
        StepKind::Step,
        &[
            "I select {value} from drop-down {dropdown}",
            "I select {value} from dropdown {dropdown}",
        ],
        handler!(select_from_dropdown),
    )?;
    registry.register(
        StepKind::Step,
        "I switch to the {context_name} context",
        handler!(switch_context),
    )?;
    registry.register(StepKind::Step, "I add the cookie {cookie}", handler!(add_cookie))?;
    registry.register(StepKind::Step, "I delete all cookies", handler!(delete_cookies))?;
    registry.register_all(
        StepKind::Step,
        &[
            "I add the weblab {cookie} on the domain {url}",
            "I add the weblab {cookie}",
        ],
        handler!(add_weblab),
    )?;
    registry.register(
        StepKind::Then,
        "the cookie {cookie_name} should have the value {cookie_value}",
        handler!(cookie_value),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "I execute the Javascript {script} with no arguments",
            "I execute the JS {script} with no arguments",
            "I execute the Javascript {script} with arguments {args}",
            "I execute the JS {script} with arguments {args}",
        ],
        handler!(execute_script),
    )?;
    registry.register(StepKind::Step, "I check the {checkbox} checkbox", handler!(check))?;
    registry.register(StepKind::Step, "I uncheck the {checkbox} checkbox", handler!(uncheck))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::driver::traits::{Rect, Strategy};
    use crate::runner::feature::StepType;
    use crate::steps::testing::{android_context, context_on, run};
    use serde_json::json;

    #[tokio::test]
    async fn test_type_into_clears_first() {
        let (mut ctx, fake) =
            android_context(|s| s.add_element(None, Strategy::Id, "search", "e1")).await;
        run(&mut ctx, StepType::When, "I type red shoes into search").await.unwrap();
        let state = fake.state.lock().unwrap();
        assert_eq!(state.cleared, vec!["e1"]);
        assert_eq!(state.typed, vec![("e1".to_string(), "red shoes".to_string())]);
    }

    #[tokio::test]
    async fn test_type_into_focused_element() {
        let (mut ctx, fake) = android_context(|s| s.active = Some("focused".into())).await;
        run(&mut ctx, StepType::When, "I type hello").await.unwrap();
        assert_eq!(
            fake.state.lock().unwrap().typed,
            vec![("focused".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_tap_clicks_element() {
        let (mut ctx, fake) =
            android_context(|s| s.add_element(None, Strategy::XPath, "//button", "b1")).await;
        run(&mut ctx, StepType::When, "I tap on //button").await.unwrap();
        assert_eq!(fake.state.lock().unwrap().clicks, vec!["b1"]);
    }

    #[tokio::test]
    async fn test_ios_webview_tap_goes_native() {
        let (mut ctx, fake) = context_on("ios", "9.3", "app.ipa", |s| {
            s.contexts.push("WEBVIEW_1".into());
            s.current_context = "WEBVIEW_1".into();
            s.add_element(Some("WEBVIEW_1"), Strategy::Id, "buy", "buy-btn");
            s.add_element(Some("NATIVE_APP"), Strategy::ClassName, "UIAScrollView", "scroll");
            s.rects.insert(
                "buy-btn".into(),
                Rect { x: 10.0, y: 20.0, width: 100.0, height: 40.0 },
            );
            s.rects.insert(
                "scroll".into(),
                Rect { x: 0.0, y: 64.0, width: 320.0, height: 500.0 },
            );
        })
        .await;
        run(&mut ctx, StepType::When, "I tap on buy").await.unwrap();
        let state = fake.state.lock().unwrap();
        assert!(state.clicks.is_empty());
        assert_eq!(state.taps, vec![(60.0, 104.0)]);
        assert_eq!(state.current_context, "WEBVIEW_1");
    }

    #[tokio::test]
    async fn test_press_button_on_ios_is_unsupported() {
        let (mut ctx, _) = context_on("ios", "9.3", "app.ipa", |_| {}).await;
        let err = run(&mut ctx, StepType::When, "I press the home button")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported on ios"));
    }

    #[tokio::test]
    async fn test_select_dropdown_option() {
        let (mut ctx, fake) = android_context(|s| {
            s.add_element(None, Strategy::Id, "size", "select");
            s.children
                .insert("select option[value=\"xl\"]".into(), vec!["opt-xl".into()]);
        })
        .await;
        run(&mut ctx, StepType::When, "I select xl from dropdown size").await.unwrap();
        assert_eq!(fake.state.lock().unwrap().clicks, vec!["opt-xl"]);

        let err = run(&mut ctx, StepType::When, "I select xs from drop-down size")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot locate option with value: xs"));
    }

    #[tokio::test]
    async fn test_weblab_replaces_cookies_and_reloads() {
        let (mut ctx, fake) = android_context(|s| {
            s.cookies.push(json!({"name": "old", "value": "1"}));
            s.url = "http://shop.example/home".into();
        })
        .await;
        run(
            &mut ctx,
            StepType::Given,
            r#"I add the weblab {"name": "lab", "value": "T1"}"#,
        )
        .await
        .unwrap();
        {
            let state = fake.state.lock().unwrap();
            assert_eq!(state.cookies, vec![json!({"name": "lab", "value": "T1"})]);
            assert_eq!(state.url, "http://shop.example/home");
        }
        run(&mut ctx, StepType::Then, "the cookie lab should have the value T1")
            .await
            .unwrap();
        assert!(run(&mut ctx, StepType::Then, "the cookie lab should have the value C")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_bad_cookie_json_fails() {
        let (mut ctx, _) = android_context(|_| {}).await;
        let err = run(&mut ctx, StepType::When, "I add the cookie not-json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_script_arguments_are_split() {
        let (mut ctx, fake) = android_context(|_| {}).await;
        run(
            &mut ctx,
            StepType::When,
            "I execute the JS go(arguments[0], arguments[1]) with arguments foo, bar",
        )
        .await
        .unwrap();
        run(&mut ctx, StepType::When, "I execute the Javascript reset() with no arguments")
            .await
            .unwrap();
        let scripts = fake.state.lock().unwrap().scripts.clone();
        assert_eq!(scripts[0].1, vec![json!("foo"), json!("bar")]);
        assert_eq!(scripts[1], ("reset()".to_string(), vec![]));
    }

    #[tokio::test]
    async fn test_checkbox_only_toggles_when_needed() {
        let (mut ctx, fake) = android_context(|s| {
            s.add_element(None, Strategy::Id, "terms", "cb");
            s.attributes
                .insert(("cb".into(), "checked".into()), "false".into());
        })
        .await;
        run(&mut ctx, StepType::When, "I uncheck the terms checkbox").await.unwrap();
        assert!(fake.state.lock().unwrap().clicks.is_empty());
        run(&mut ctx, StepType::When, "I check the terms checkbox").await.unwrap();
        assert_eq!(fake.state.lock().unwrap().clicks, vec!["cb"]);
    }

    #[tokio::test]
    async fn test_switch_context_picks_latest_match() {
        let (mut ctx, fake) = android_context(|s| {
            s.contexts.push("WEBVIEW_1".into());
            s.contexts.push("WEBVIEW_2".into());
        })
        .await;
        run(&mut ctx, StepType::When, "I switch to the webview context").await.unwrap();
        assert_eq!(fake.state.lock().unwrap().current_context, "WEBVIEW_2");
    }
}
