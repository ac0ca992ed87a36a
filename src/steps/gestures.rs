use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::traits::SwipeDirection;
use crate::handler;
use crate::runner::context::TestContext;
use anyhow::Result;

/// How far a swipe travels when the step does not say
const DEFAULT_SWIPE_PERCENT: f64 = 50.0;

fn direction(args: &StepArgs) -> Result<SwipeDirection> {
    args.get("direction")?
        .parse::<SwipeDirection>()
        .map_err(anyhow::Error::msg)
}

async fn swipe(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let direction = direction(&args)?;
    let percentage = match args.opt("percentage") {
        Some(_) => args.parse::<f64>("percentage")?,
        None => DEFAULT_SWIPE_PERCENT,
    };
    anyhow::ensure!(
        percentage > 0.0 && percentage <= 100.0,
        "swipe percentage must be between 0 and 100, got {}",
        percentage
    );
    log::debug!("swiping {:?} through {}% of the screen", direction, percentage);
    ctx.driver()?.swipe(direction, percentage).await
}

async fn scroll_up(ctx: &mut TestContext, _args: StepArgs) -> Result<()> {
    ctx.driver()?
        .swipe(SwipeDirection::Up.scrolled(), DEFAULT_SWIPE_PERCENT)
        .await
}

async fn scroll_down(ctx: &mut TestContext, _args: StepArgs) -> Result<()> {
    ctx.driver()?
        .swipe(SwipeDirection::Down.scrolled(), DEFAULT_SWIPE_PERCENT)
        .await
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Step,
        &[
            "I swipe {direction} through {percentage} percent of screen",
            "I swipe to the {direction}",
            "I swipe {direction}",
        ],
        handler!(swipe),
    )?;
    registry.register(StepKind::Step, "I scroll up", handler!(scroll_up))?;
    registry.register(StepKind::Step, "I scroll down", handler!(scroll_down))?;
    Ok(())
}
