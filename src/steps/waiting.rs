use super::{StepArgs, StepKind, StepRegistry};
use crate::error::HarnessError;
use crate::handler;
use crate::runner::context::TestContext;
use crate::utils::poll::Poller;
use anyhow::Result;
use std::time::Duration;

/// How long an element gets to appear when the step names no time
const DEFAULT_APPEAR_SECS: f64 = 20.0;

const APPEAR_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Seconds from the `wait_time` argument, or `default` when absent
pub(crate) fn wait_time(args: &StepArgs, default: f64) -> Result<f64> {
    let secs = match args.opt("wait_time") {
        Some(_) => args.parse::<f64>("wait_time")?,
        None => default,
    };
    anyhow::ensure!(
        secs.is_finite() && secs >= 0.0,
        "wait time must be a positive number of seconds, got {}",
        secs
    );
    Ok(secs)
}

async fn wait_seconds(_ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let secs = wait_time(&args, 0.0)?;
    log::debug!("waiting {} seconds", secs);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    Ok(())
}

/// Poll until `locator` resolves to a displayed element.
async fn wait_until_visible(ctx: &mut TestContext, locator: &str, secs: f64) -> Result<()> {
    let mut poller = Poller::new(Duration::from_secs_f64(secs), APPEAR_POLL_INTERVAL);
    loop {
        match ctx.driver()?.find(locator).await {
            Ok(element) => {
                let session = ctx.session().await?;
                if session.is_displayed(&element).await.unwrap_or(false) {
                    return Ok(());
                }
            }
            Err(HarnessError::ElementNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        if !poller.tick().await {
            anyhow::bail!("{} did not appear within {} seconds", locator, secs);
        }
    }
}

async fn element_appears(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let secs = wait_time(&args, DEFAULT_APPEAR_SECS)?;
    let element = args.get("element")?;
    wait_until_visible(ctx, element, secs).await
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Step,
        &["I wait {wait_time} seconds", "I wait {wait_time} second"],
        handler!(wait_seconds),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{element} should appear within {wait_time} seconds",
            "{element} should appear in time",
        ],
        handler!(element_appears),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "I wait {wait_time} seconds for {element} to appear",
            "I wait {wait_time} seconds for {element} to be visible",
            "I wait for {element} to appear",
            "I wait for {element} to be visible",
        ],
        handler!(element_appears),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::driver::traits::Strategy;
    use crate::runner::feature::StepType;
    use crate::steps::testing::{android_context, run};
    use std::time::Instant;

    #[tokio::test]
    async fn test_wait_sleeps() {
        let (mut ctx, _) = android_context(|_| {}).await;
        let start = Instant::now();
        run(&mut ctx, StepType::When, "I wait 0.2 seconds").await.unwrap();
        assert!(start.elapsed().as_millis() >= 200);
        assert!(run(&mut ctx, StepType::When, "I wait -1 second").await.is_err());
    }

    #[tokio::test]
    async fn test_visible_element_appears_at_once() {
        let (mut ctx, _) =
            android_context(|s| s.add_element(None, Strategy::Id, "banner", "b")).await;
        run(&mut ctx, StepType::Then, "banner should appear in time").await.unwrap();
        run(&mut ctx, StepType::When, "I wait 1 seconds for banner to be visible")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hidden_element_times_out() {
        let (mut ctx, _) = android_context(|s| {
            s.add_element(None, Strategy::Id, "banner", "b");
            s.hidden.push("b".into());
        })
        .await;
        let err = run(&mut ctx, StepType::Then, "banner should appear within 0.6 seconds")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "banner did not appear within 0.6 seconds");
    }

    #[tokio::test]
    async fn test_missing_element_times_out() {
        let (mut ctx, _) = android_context(|_| {}).await;
        let err = run(&mut ctx, StepType::When, "I wait 0 seconds for spinner to appear")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("spinner did not appear"));
    }
}
