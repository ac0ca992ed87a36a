//! Run listeners.
//!
//! Listeners observe the run at eight points. A listener that errors or
//! panics is logged and the run carries on; one listener's failure never
//! stops the others from being called.

use crate::error::HarnessError;
use crate::runner::state::{FeatureState, RunState, ScenarioState, StepState};
use anyhow::Result;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Lifecycle callbacks; every method defaults to a no-op.
#[allow(unused_variables)]
pub trait Listener: Send {
    fn before_all(&mut self, run: &RunState) -> Result<()> {
        Ok(())
    }

    fn before_feature(&mut self, feature: &FeatureState) -> Result<()> {
        Ok(())
    }

    fn before_scenario(&mut self, scenario: &ScenarioState) -> Result<()> {
        Ok(())
    }

    fn before_step(&mut self, step: &StepState) -> Result<()> {
        Ok(())
    }

    fn after_step(&mut self, step: &StepState) -> Result<()> {
        Ok(())
    }

    fn after_scenario(&mut self, scenario: &ScenarioState) -> Result<()> {
        Ok(())
    }

    fn after_feature(&mut self, feature: &FeatureState) -> Result<()> {
        Ok(())
    }

    fn after_all(&mut self, run: &RunState) -> Result<()> {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

/// Dispatches each callback to every registered listener in order
#[derive(Default)]
pub struct Listeners {
    listeners: Vec<Box<dyn Listener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn each<F>(&mut self, callback: &'static str, mut call: F)
    where
        F: FnMut(&mut dyn Listener) -> Result<()>,
    {
        for listener in &mut self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| call(listener.as_mut())));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => panic_message(payload.as_ref()),
            };
            log::error!("{}", HarnessError::Listener { callback, message });
        }
    }

    pub fn before_all(&mut self, run: &RunState) {
        self.each("before_all", |l| l.before_all(run));
    }

    pub fn before_feature(&mut self, feature: &FeatureState) {
        self.each("before_feature", |l| l.before_feature(feature));
    }

    pub fn before_scenario(&mut self, scenario: &ScenarioState) {
        self.each("before_scenario", |l| l.before_scenario(scenario));
    }

    pub fn before_step(&mut self, step: &StepState) {
        self.each("before_step", |l| l.before_step(step));
    }

    pub fn after_step(&mut self, step: &StepState) {
        self.each("after_step", |l| l.after_step(step));
    }

    pub fn after_scenario(&mut self, scenario: &ScenarioState) {
        self.each("after_scenario", |l| l.after_scenario(scenario));
    }

    pub fn after_feature(&mut self, feature: &FeatureState) {
        self.each("after_feature", |l| l.after_feature(feature));
    }

    pub fn after_all(&mut self, run: &RunState) {
        self.each("after_all", |l| l.after_all(run));
    }
}
