//! Driver selection, capability building and element resolution on top of
//! an [`AutomationSession`](traits::AutomationSession).

pub mod capabilities;
pub mod family;
pub mod instance;
pub mod requirements;
pub mod resolver;
pub mod traits;
pub mod webdriver;

#[cfg(test)]
pub mod fake;
