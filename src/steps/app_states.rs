//! Declaring the app and the device to run it on.

use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::requirements::DeviceType;
use crate::handler;
use crate::runner::context::TestContext;
use crate::runner::detect::{APP_ACTIVITY_STEP, APP_PACKAGE_STEP, APP_STEPS, DEVICE_STEPS};
use anyhow::Result;

async fn have_app(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let app = ctx.config.app_uri(args.get("app")?);
    anyhow::ensure!(
        !app.is_empty(),
        "a path to the app or a lookup in the test config was not found!"
    );
    if ctx.declared.app_uri.as_deref() != Some(app.as_str()) {
        ctx.declared.app_uri = Some(app);
        ctx.mark_refresh();
    }
    Ok(())
}

async fn app_package(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.declared.app_package = Some(args.get("package")?.to_string());
    Ok(())
}

async fn app_activity(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.declared.app_activity = Some(args.get("activity")?.to_string());
    Ok(())
}

async fn user_agent(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    ctx.declared.user_agent = Some(args.get("user_agent")?.to_string());
    Ok(())
}

async fn window_size(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let width: u32 = args.parse("window_size_x")?;
    let height: u32 = args.parse("window_size_y")?;
    ctx.declared.window_size = Some((width, height));
    Ok(())
}

/// Record the device and make sure a matching session is running.
async fn run_on_device(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let device_type = args
        .opt("device_type")
        .and_then(|d| d.parse::<DeviceType>().ok())
        .unwrap_or_default();

    ctx.declared.os_type = Some(args.get("os_type")?.to_string());
    ctx.declared.os_version = Some(args.get("os_ver")?.to_string());
    ctx.declared.device_type = device_type;

    let driver = ctx.request_session().await?;
    log::debug!("running on a {} session", driver.family());
    Ok(())
}

/// Screenshots are taken after every step anyway.
async fn take_screenshot(_ctx: &mut TestContext, _args: StepArgs) -> Result<()> {
    Ok(())
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(StepKind::Given, &APP_STEPS, handler!(have_app))?;
    registry.register(StepKind::Given, APP_PACKAGE_STEP, handler!(app_package))?;
    registry.register(StepKind::Given, APP_ACTIVITY_STEP, handler!(app_activity))?;
    registry.register(
        StepKind::Given,
        "the app's user agent is {user_agent}",
        handler!(user_agent),
    )?;
    registry.register(
        StepKind::Given,
        "the app's window size is {window_size_x} by {window_size_y}",
        handler!(window_size),
    )?;
    let most_specific_first: Vec<&str> = DEVICE_STEPS.iter().rev().copied().collect();
    registry.register_all(StepKind::Given, &most_specific_first, handler!(run_on_device))?;
    registry.register(StepKind::Step, "I take a screenshot", handler!(take_screenshot))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeFactory;
    use crate::driver::family::DriverFamily;
    use crate::runner::feature::StepType;
    use crate::steps::testing::run;
    use crate::utils::config::HarnessConfig;
    use std::sync::Arc;

    fn context(factory: &FakeFactory) -> TestContext {
        let mut config = HarnessConfig::default();
        config
            .app_urls
            .insert("shop".into(), "http://builds/shop.apk".into());
        TestContext::new(Arc::new(config), Arc::new(factory.clone()), None)
    }

    #[tokio::test]
    async fn test_device_step_creates_session() {
        let factory = FakeFactory::default();
        let mut ctx = context(&factory);
        run(&mut ctx, StepType::Given, "I have shop installed").await.unwrap();
        run(&mut ctx, StepType::Given, "I run the app on an android 4.2 tablet")
            .await
            .unwrap();

        assert_eq!(factory.created_count(), 1);
        let caps = factory.capabilities(0);
        assert_eq!(caps["app"], "http://builds/shop.apk");
        assert_eq!(caps["deviceType"], "tablet");
        assert_eq!(ctx.driver().unwrap().family(), DriverFamily::Selendroid);
    }

    #[tokio::test]
    async fn test_unknown_device_type_is_dropped() {
        let factory = FakeFactory::default();
        let mut ctx = context(&factory);
        run(&mut ctx, StepType::Given, "I have shop.apk installed").await.unwrap();
        run(&mut ctx, StepType::Given, "I run the app on an android 5.0 watch")
            .await
            .unwrap();
        assert!(!factory.capabilities(0).contains_key("deviceType"));
    }

    #[tokio::test]
    async fn test_same_device_twice_reuses_session() {
        let factory = FakeFactory::default();
        let mut ctx = context(&factory);
        run(&mut ctx, StepType::Given, "I have shop.apk installed").await.unwrap();
        run(&mut ctx, StepType::Given, "I run the app on android 5.0").await.unwrap();
        run(&mut ctx, StepType::Given, "I run the app on android 5.0").await.unwrap();
        assert_eq!(factory.created_count(), 1);

        run(&mut ctx, StepType::Given, "I have other.apk installed").await.unwrap();
        run(&mut ctx, StepType::Given, "I run the app on android 5.0").await.unwrap();
        assert_eq!(factory.created_count(), 2);
    }

    #[tokio::test]
    async fn test_device_step_without_app_fails() {
        let factory = FakeFactory::default();
        let mut ctx = context(&factory);
        let err = run(&mut ctx, StepType::Given, "I run the app on ios 9.3")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("path to the app"));
        assert_eq!(factory.created_count(), 0);
    }

    #[tokio::test]
    async fn test_package_activity_and_window_size_are_declared() {
        let factory = FakeFactory::default();
        let mut ctx = context(&factory);
        run(&mut ctx, StepType::Given, "the app's package is com.shop").await.unwrap();
        run(&mut ctx, StepType::Given, "the app's activity is .Main").await.unwrap();
        run(&mut ctx, StepType::Given, "the app's window size is 1024 by 768")
            .await
            .unwrap();
        assert_eq!(ctx.declared.app_package.as_deref(), Some("com.shop"));
        assert_eq!(ctx.declared.app_activity.as_deref(), Some(".Main"));
        assert_eq!(ctx.declared.window_size, Some((1024, 768)));
        assert!(run(&mut ctx, StepType::Given, "the app's window size is big by 768")
            .await
            .is_err());
    }
}
