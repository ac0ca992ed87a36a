//! Size and position assertions, in pixels or in density-independent
//! pixels measured against a ruler element of known dp width.

use super::{StepArgs, StepKind, StepRegistry};
use crate::driver::traits::Rect;
use crate::handler;
use crate::runner::context::TestContext;
use anyhow::{Context, Result};

/// Locator of the app's root view
const APP_ROOT: &str = "content";

async fn rect_of(ctx: &mut TestContext, locator: &str) -> Result<Rect> {
    let element = ctx.find(locator).await?;
    Ok(ctx.session().await?.element_rect(&element).await?)
}

/// Device pixels per dp, from the ruler's pixel width and its known dp width
async fn scale_factor(ctx: &mut TestContext, args: &StepArgs) -> Result<f64> {
    let ruler_dp: f64 = args.parse("rulerWidth")?;
    anyhow::ensure!(ruler_dp > 0.0, "ruler width must be positive, got {}", ruler_dp);
    let ruler = rect_of(ctx, args.get("ruler")?).await?;
    let scale = ruler.width / ruler_dp;
    anyhow::ensure!(scale > 0.0, "ruler {} has no width", args.get("ruler")?);
    Ok(scale)
}

fn to_dp(pixels: f64, scale: f64) -> i64 {
    (pixels / scale) as i64
}

fn dimension(rect: &Rect, name: &str) -> Result<f64> {
    match name {
        "width" => Ok(rect.width),
        "height" => Ok(rect.height),
        other => anyhow::bail!("unknown dimension {}; use width or height", other),
    }
}

fn coordinate(rect: &Rect, name: &str) -> Result<f64> {
    match name {
        "x" => Ok(rect.x),
        "y" => Ok(rect.y),
        other => anyhow::bail!("unknown coordinate {}; use x or y", other),
    }
}

/// The number written in an element's text
async fn number_in(ctx: &mut TestContext, locator: &str) -> Result<i64> {
    let element = ctx.find(locator).await?;
    let text = ctx.session().await?.element_text(&element).await?;
    text.trim()
        .parse::<i64>()
        .with_context(|| format!("{} contains '{}', which is not a number", locator, text))
}

fn check_size(element: &str, actual: (i64, i64), expected: (i64, i64)) -> Result<()> {
    anyhow::ensure!(
        actual.0 == expected.0,
        "{} is {} wide. Expected it to be {} wide",
        element,
        actual.0,
        expected.0
    );
    anyhow::ensure!(
        actual.1 == expected.1,
        "{} is {} high. Expected it to be {} high",
        element,
        actual.1,
        expected.1
    );
    Ok(())
}

fn check_position(element: &str, actual: (i64, i64), expected: (i64, i64)) -> Result<()> {
    anyhow::ensure!(
        actual.0 == expected.0,
        "{} is located at unexpected X Value. Expected = {}, Actual = {}",
        element,
        expected.0,
        actual.0
    );
    anyhow::ensure!(
        actual.1 == expected.1,
        "{} is located at unexpected Y Value. Expected = {}, Actual = {}",
        element,
        expected.1,
        actual.1
    );
    Ok(())
}

async fn size_in_pixels(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = args.get("element")?;
    let rect = rect_of(ctx, element).await?;
    check_size(
        element,
        (rect.width as i64, rect.height as i64),
        (args.parse("width")?, args.parse("height")?),
    )
}

async fn size_in_dp(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let scale = scale_factor(ctx, &args).await?;
    let element = args.get("element")?;
    let rect = rect_of(ctx, element).await?;
    check_size(
        element,
        (to_dp(rect.width, scale), to_dp(rect.height, scale)),
        (args.parse("width")?, args.parse("height")?),
    )
}

async fn position_in_pixels(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = args.get("element")?;
    let rect = rect_of(ctx, element).await?;
    check_position(
        element,
        (rect.x as i64, rect.y as i64),
        (args.parse("xValue")?, args.parse("yValue")?),
    )
}

async fn position_in_dp(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let scale = scale_factor(ctx, &args).await?;
    let element = args.get("element")?;
    let rect = rect_of(ctx, element).await?;
    let origin = match args.opt("thing") {
        Some(thing) => rect_of(ctx, thing).await?,
        None => Rect::default(),
    };
    check_position(
        element,
        (to_dp(rect.x - origin.x, scale), to_dp(rect.y - origin.y, scale)),
        (args.parse("xValue")?, args.parse("yValue")?),
    )
}

async fn size_of_app(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = args.get("element")?;
    let root = rect_of(ctx, APP_ROOT).await?;
    let rect = rect_of(ctx, element).await?;
    anyhow::ensure!(
        rect.width == root.width,
        "{} width, {}, does not match app width, {}",
        element,
        rect.width,
        root.width
    );
    anyhow::ensure!(
        rect.height == root.height,
        "{} height, {}, does not match app height, {}",
        element,
        rect.height,
        root.height
    );
    Ok(())
}

/// Text of `element` against a dimension of the app root or of `thing`.
async fn text_equals_dimension(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let scale = scale_factor(ctx, &args).await?;
    let name = args.get("dimension")?;
    let measured = args.opt("thing").unwrap_or(APP_ROOT);
    let actual = to_dp(dimension(&rect_of(ctx, measured).await?, name)?, scale);

    let element = args.get("element")?;
    let expected = number_in(ctx, element).await?;
    anyhow::ensure!(
        actual == expected,
        "{} contains the text \"{}\" which is not equal to the {} of {}, which is {}",
        element,
        expected,
        name,
        measured,
        actual
    );
    Ok(())
}

/// Text of `element` against a coordinate of `thing`, optionally relative
/// to `otherThing`.
async fn text_equals_coordinate(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let scale = scale_factor(ctx, &args).await?;
    let name = args.get("coordinate")?;
    let thing = args.get("thing")?;
    let mut pixels = coordinate(&rect_of(ctx, thing).await?, name)?;
    if let Some(other) = args.opt("otherThing") {
        pixels -= coordinate(&rect_of(ctx, other).await?, name)?;
    }
    let actual = to_dp(pixels, scale);

    let element = args.get("element")?;
    let expected = number_in(ctx, element).await?;
    anyhow::ensure!(
        actual == expected,
        "{} contains the text \"{}\" which is not equal to the {} coordinate of {}, which is {}",
        element,
        expected,
        name,
        thing,
        actual
    );
    Ok(())
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register(
        StepKind::Then,
        "{element} size should be {width}x{height} pixels",
        handler!(size_in_pixels),
    )?;
    registry.register(
        StepKind::Then,
        "{element} size should be {width}x{height} dp using {ruler} as ruler at {rulerWidth} dp",
        handler!(size_in_dp),
    )?;
    registry.register(
        StepKind::Then,
        "{element} should be positioned at ({xValue}, {yValue}) pixels",
        handler!(position_in_pixels),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "{element} should be positioned at ({xValue}, {yValue}) dp within {thing} using {ruler} as ruler at {rulerWidth} dp",
            "{element} should be positioned at ({xValue}, {yValue}) dp using {ruler} as ruler at {rulerWidth} dp",
        ],
        handler!(position_in_dp),
    )?;
    registry.register(
        StepKind::Then,
        "{element} should be the size of the app",
        handler!(size_of_app),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "the text in {element} should equal the {dimension} of the app in dp using {ruler} as ruler at {rulerWidth} dp",
            "the text in {element} should equal the {dimension} dimension of {thing} in dp using {ruler} as ruler at {rulerWidth} dp",
        ],
        handler!(text_equals_dimension),
    )?;
    registry.register_all(
        StepKind::Then,
        &[
            "the text in {element} should equal the {coordinate} coordinate of {thing} within {otherThing} in dp using {ruler} as ruler at {rulerWidth} dp",
            "the text in {element} should equal the {coordinate} coordinate of {thing} in dp using {ruler} as ruler at {rulerWidth} dp",
        ],
        handler!(text_equals_coordinate),
    )?;
    Ok(())
}
