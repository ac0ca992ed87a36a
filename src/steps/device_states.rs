use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::family::NATIVE_CONTEXT;
use crate::handler;
use crate::runner::context::TestContext;
use anyhow::Result;
use std::time::Duration;

/// Time for the device to finish rendering after a rotation
const ROTATION_SETTLE: Duration = Duration::from_secs(2);

async fn rotate(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let rotation = args.get("rotation")?.to_uppercase();
    anyhow::ensure!(
        rotation == "PORTRAIT" || rotation == "LANDSCAPE",
        "invalid rotation: {}",
        rotation
    );
    log::debug!("rotating to {}", rotation);

    let session = ctx.session().await?;
    let original = session.current_context().await?;
    if original != NATIVE_CONTEXT {
        session.switch_context(NATIVE_CONTEXT).await?;
    }
    session.set_orientation(&rotation).await?;
    if session.current_context().await? != original {
        session.switch_context(&original).await?;
    }

    log::debug!("rotated, letting the device settle");
    tokio::time::sleep(ROTATION_SETTLE).await;
    Ok(())
}

async fn current_activity(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let expected = args.get("activity")?;
    let actual = ctx.session().await?.current_activity().await?;
    anyhow::ensure!(
        actual
            .trim()
            .to_lowercase()
            .ends_with(&expected.to_lowercase()),
        "Expected activity to be {} but instead it was {}",
        expected,
        actual
    );
    Ok(())
}

/// Reading a log drains it, so later checks only see newer lines.
async fn clear_logs(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let log_name = args.get("log_name")?;
    let dropped = ctx.session().await?.logs(log_name).await?;
    log::debug!("cleared {} {} log entries", dropped.len(), log_name);
    Ok(())
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Step,
        &["I rotate the device to {rotation}", "I rotate to {rotation}"],
        handler!(rotate),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "current activity should be {activity}",
            "the current activity should be {activity}",
        ],
        handler!(current_activity),
    )?;
    registry.register(StepKind::Step, "I clear the {log_name} logs", handler!(clear_logs))?;
    Ok(())
}
