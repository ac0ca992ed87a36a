//! Step library.
//!
//! Steps live in an explicit, ordered table built once at startup. A step's
//! text is matched against the table top to bottom and the first definition
//! whose kind accepts the step type and whose phrase matches wins, so longer
//! phrases are registered before the shorter ones they would otherwise shadow.

/// Wrap an `async fn(&mut TestContext, StepArgs) -> Result<()>` as a [`StepHandler`].
#[macro_export]
macro_rules! handler {
    ($f:path) => {{
        fn boxed<'a>(
            ctx: &'a mut $crate::runner::context::TestContext,
            args: $crate::steps::StepArgs,
        ) -> $crate::steps::StepFuture<'a> {
            Box::pin($f(ctx, args))
        }
        boxed as $crate::steps::StepHandler
    }};
}

pub mod app_states;
pub mod device_states;
pub mod element_states;
pub mod finding;
pub mod gestures;
pub mod input;
pub mod pattern;
pub mod size;
pub mod waiting;

use crate::runner::context::TestContext;
use crate::runner::feature::StepType;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use pattern::{Anchoring, StepPattern};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

pub type StepFuture<'a> = BoxFuture<'a, Result<()>>;

/// A step implementation: borrows the context for the duration of the step
pub type StepHandler = for<'a> fn(&'a mut TestContext, StepArgs) -> StepFuture<'a>;

/// Values captured from the step text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArgs(HashMap<String, String>);

impl StepArgs {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(
            values
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_string()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.opt(name)
            .with_context(|| format!("step is missing the '{}' argument", name))
    }

    pub fn opt(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn parse<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(name)?;
        raw.parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", name, raw, e))
    }
}

/// Which step keywords a definition answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Given,
    When,
    Then,
    /// Any keyword
    Step,
}

impl StepKind {
    pub fn accepts(&self, step_type: StepType) -> bool {
        match self {
            StepKind::Given => step_type == StepType::Given,
            StepKind::When => step_type == StepType::When,
            StepKind::Then => step_type == StepType::Then,
            StepKind::Step => true,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            StepKind::Given => &["Given"],
            StepKind::When => &["When"],
            StepKind::Then => &["Then"],
            StepKind::Step => &["Given", "When", "Then"],
        }
    }
}

pub struct StepDefinition {
    pub kind: StepKind,
    pub pattern: StepPattern,
    pub handler: StepHandler,
}

#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in library
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        app_states::register(&mut registry)?;
        device_states::register(&mut registry)?;
        input::register(&mut registry)?;
        gestures::register(&mut registry)?;
        element_states::register(&mut registry)?;
        size::register(&mut registry)?;
        // log waits end in "seconds" too and must win over plain waits
        finding::register(&mut registry)?;
        waiting::register(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, kind: StepKind, phrase: &str, handler: StepHandler) -> Result<()> {
        let pattern = StepPattern::new(phrase, Anchoring::Full)
            .with_context(|| format!("invalid step phrase '{}'", phrase))?;
        self.steps.push(StepDefinition {
            kind,
            pattern,
            handler,
        });
        Ok(())
    }

    /// Register several phrases for the same handler, in order.
    pub fn register_all(
        &mut self,
        kind: StepKind,
        phrases: &[&str],
        handler: StepHandler,
    ) -> Result<()> {
        for phrase in phrases {
            self.register(kind, phrase, handler)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// First definition matching the step
    pub fn find(&self, step_type: StepType, text: &str) -> Option<(&StepDefinition, StepArgs)> {
        self.steps
            .iter()
            .filter(|def| def.kind.accepts(step_type))
            .find_map(|def| def.pattern.captures(text).map(|caps| (def, StepArgs::new(caps))))
    }

    /// Every phrase with the keywords it can be written with
    pub fn available_steps(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for def in &self.steps {
            for keyword in def.kind.keywords() {
                lines.push(format!("{} {}", keyword, def.pattern.source()));
            }
            lines.push(format!("And {}", def.pattern.source()));
        }
        lines
    }
}
