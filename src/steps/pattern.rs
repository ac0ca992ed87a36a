//! Step phrase patterns.
//!
//! A phrase like `I type {string} into {thing}` compiles to a case-insensitive
//! regex where every `{name}` is a lazy named capture.

use regex::Regex;
use std::collections::HashMap;

/// How much of the text a pattern has to cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchoring {
    /// The whole step text
    Full,
    /// The end of a line, starting anywhere on it
    LineEnd,
}

fn to_regex(pattern: &str, anchoring: Anchoring) -> String {
    let mut out = String::from("(?i)");
    out.push_str(match anchoring {
        Anchoring::Full => "^",
        Anchoring::LineEnd => "(?m)",
    });
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        out.push_str(&regex::escape(&rest[..open]));
        let name = &rest[open + 1..close];
        out.push_str(&format!("(?P<{}>.+?)", name));
        rest = &rest[close + 1..];
    }
    out.push_str(&regex::escape(rest));
    out.push('$');
    out
}

#[derive(Debug, Clone)]
pub struct StepPattern {
    source: String,
    names: Vec<String>,
    regex: Regex,
}

impl StepPattern {
    pub fn new(pattern: &str, anchoring: Anchoring) -> Result<Self, regex::Error> {
        let regex = Regex::new(&to_regex(pattern, anchoring))?;
        let names = regex
            .capture_names()
            .flatten()
            .map(String::from)
            .collect();
        Ok(Self {
            source: pattern.to_string(),
            names,
            regex,
        })
    }

    /// The phrase as written at registration
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Named captures when `text` matches
    pub fn captures(&self, text: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(text)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}
