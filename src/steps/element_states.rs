//! Noting element values and comparing them later in the scenario.

use super::{StepArgs, StepKind, StepRegistry};
use crate::handler;
use crate::runner::context::TestContext;
use anyhow::{Context, Result};

/// Read `attr` of the element `locator` resolves to.
///
/// `text`, `tag_name`, `location` and `size` are element properties; any
/// other name is read as an attribute. Empty values are an error.
pub(crate) async fn element_value(ctx: &mut TestContext, locator: &str, attr: &str) -> Result<String> {
    let element = ctx.find(locator).await?;
    let session = ctx.session().await?;
    let value = match attr {
        "text" => session.element_text(&element).await?,
        "tag_name" => session.element_tag_name(&element).await?,
        "location" => {
            let rect = session.element_rect(&element).await?;
            format!("({}, {})", rect.x, rect.y)
        }
        "size" => {
            let rect = session.element_rect(&element).await?;
            format!("{}x{}", rect.width, rect.height)
        }
        other => session
            .element_attribute(&element, other)
            .await?
            .unwrap_or_default(),
    };
    anyhow::ensure!(
        !value.is_empty(),
        "couldn't find attribute {} on {}",
        attr,
        locator
    );
    Ok(value)
}

async fn indexed_value(
    ctx: &mut TestContext,
    locator: &str,
    attr: &str,
    index: Option<usize>,
) -> Result<String> {
    let value = element_value(ctx, locator, attr).await?;
    match index {
        None => Ok(value),
        Some(i) => value
            .chars()
            .nth(i)
            .map(String::from)
            .with_context(|| format!("{} of {} has no index {}: '{}'", attr, locator, i, value)),
    }
}

fn saved_key(element: &str, attr: &str, index: Option<usize>) -> String {
    match index {
        None => format!("{}__{}", element, attr),
        Some(i) => format!("{}__{}[{}]", element, attr, i),
    }
}

fn index_arg(args: &StepArgs, name: &str) -> Result<Option<usize>> {
    match args.opt(name) {
        Some(_) => Ok(Some(args.parse::<usize>(name)?)),
        None => Ok(None),
    }
}

async fn note(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let element = args.get("element")?;
    let attr = args.get("attr")?;
    let index = index_arg(&args, "index")?;
    let value = indexed_value(ctx, element, attr, index).await?;
    ctx.save(saved_key(element, attr, index), value);
    Ok(())
}

/// The stored and the current value a comparison step talks about
async fn stored_and_current(ctx: &mut TestContext, args: &StepArgs) -> Result<(String, String)> {
    let current_element = args.get("current_element")?;
    let current_attr = args.get("current_attr")?;
    let stored_element = args.opt("stored_element").unwrap_or(current_element);
    let stored_attr = args.opt("stored_attr").unwrap_or(current_attr);
    let current_index = index_arg(args, "current_index")?;

    let stored = ctx
        .saved(&saved_key(stored_element, stored_attr, None))?
        .to_string();
    let current = indexed_value(ctx, current_element, current_attr, current_index).await?;
    Ok((stored, current))
}

async fn matches_stored(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let (stored, current) = stored_and_current(ctx, &args).await?;
    anyhow::ensure!(
        current == stored,
        "current value '{}' does not match the stored value '{}'",
        current,
        stored
    );
    Ok(())
}

async fn differs_from_stored(ctx: &mut TestContext, args: StepArgs) -> Result<()> {
    let (stored, current) = stored_and_current(ctx, &args).await?;
    anyhow::ensure!(
        current != stored,
        "current value '{}' still matches the stored value",
        current
    );
    Ok(())
}

pub fn register(registry: &mut StepRegistry) -> Result<()> {
    registry.register_all(
        StepKind::Step,
        &[
            "I note the {index} index of the {attr} of {element}",
            "I note the {attr} of {element}",
        ],
        handler!(note),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "the stored {stored_attr} of {stored_element} should match the current {current_index} index of the {current_attr} of {current_element}",
            "the stored {stored_attr} of {stored_element} should match the current {current_attr} of {current_element}",
            "the current {current_attr} of {current_element} should match the stored {stored_attr} of {stored_element}",
            "the current {current_attr} of {current_element} should match its stored value",
        ],
        handler!(matches_stored),
    )?;
    registry.register_all(
        StepKind::Step,
        &[
            "the stored {stored_attr} of {stored_element} should not match the current {current_attr} of {current_element}",
            "the current {current_attr} of {current_element} should not match its stored value",
        ],
        handler!(differs_from_stored),
    )?;
    Ok(())
}
