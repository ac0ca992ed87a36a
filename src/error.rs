//! Error taxonomy shared by the driver, runner and step layers.

use std::fmt;
use thiserror::Error;

use crate::driver::traits::Strategy;

/// Failures reported by an automation session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend no longer knows the session (already quit or crashed).
    #[error("session is already gone: {0}")]
    SessionGone(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("no such context: {0}")]
    NoSuchContext(String),

    /// The backend answered with an error payload.
    #[error("{error}: {message}")]
    Protocol { error: String, message: String },

    /// The request never produced a usable answer.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{0} is not supported by this session")]
    Unsupported(String),
}

impl SessionError {
    pub fn is_gone(&self) -> bool {
        matches!(self, SessionError::SessionGone(_))
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Why one (surface, strategy) attempt of the resolver came back empty.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    NotFound,
    /// Switching to the context or window failed, so no strategy ran there.
    SwitchFailed(String),
    Protocol(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::NotFound => write!(f, "not found"),
            AttemptFailure::SwitchFailed(msg) => write!(f, "switch failed: {}", msg),
            AttemptFailure::Protocol(msg) => write!(f, "{}", msg),
        }
    }
}

/// One failed attempt recorded during the last resolver sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct FindAttempt {
    pub surface: String,
    pub strategy: Option<Strategy>,
    pub failure: AttemptFailure,
}

impl fmt::Display for FindAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            Some(strategy) => write!(f, "[{} / {}] {}", self.surface, strategy, self.failure),
            None => write!(f, "[{}] {}", self.surface, self.failure),
        }
    }
}

/// An undefined step as reported by the dry-run pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UndefinedStep {
    pub step_type: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("{}", element_not_found_message(.locator, .attempts))]
    ElementNotFound {
        locator: String,
        attempts: Vec<FindAttempt>,
    },

    #[error("{}", undefined_steps_message(.0))]
    UndefinedSteps(Vec<UndefinedStep>),

    #[error("failed to close session: {0}")]
    SessionClose(#[source] SessionError),

    #[error("listener {callback} failed: {message}")]
    Listener {
        callback: &'static str,
        message: String,
    },

    #[error(transparent)]
    CapabilityProcessing(anyhow::Error),

    #[error("{0} was not previously stored")]
    MissingSavedData(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("invalid tag expression '{0}'")]
    InvalidTagExpression(String),

    #[error("failed to parse feature file {path}: {message}")]
    FeatureParse { path: String, message: String },

    #[error("{0}")]
    Config(String),
}

fn element_not_found_message(locator: &str, attempts: &[FindAttempt]) -> String {
    if attempts.is_empty() {
        return format!("could not find element '{}'", locator);
    }
    let tried: Vec<String> = attempts.iter().map(|a| a.to_string()).collect();
    format!(
        "could not find element '{}' (last sweep: {})",
        locator,
        tried.join("; ")
    )
}

fn undefined_steps_message(steps: &[UndefinedStep]) -> String {
    let mut msg = String::from("Undefined steps found:");
    for step in steps {
        msg.push_str(&format!("\n  {} {}", step.step_type, step.text));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_steps_message_lists_every_step() {
        let err = HarnessError::UndefinedSteps(vec![
            UndefinedStep {
                step_type: "given".into(),
                text: "I own a spaceship".into(),
            },
            UndefinedStep {
                step_type: "then".into(),
                text: "it should fly".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("given I own a spaceship"));
        assert!(msg.contains("then it should fly"));
    }

    #[test]
    fn test_element_not_found_names_locator() {
        let err = HarnessError::ElementNotFound {
            locator: "login".into(),
            attempts: vec![FindAttempt {
                surface: "NATIVE_APP".into(),
                strategy: Some(Strategy::Id),
                failure: AttemptFailure::NotFound,
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("'login'"));
        assert!(msg.contains("NATIVE_APP / id"));
    }

    #[test]
    fn test_capability_processing_is_transparent() {
        let err = HarnessError::CapabilityProcessing(anyhow::anyhow!("bad capability"));
        assert_eq!(err.to_string(), "bad capability");
    }
}
