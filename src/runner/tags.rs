//! Tag filtering.
//!
//! Each argument is one AND term; comma separated tags inside a term are
//! OR-ed. A `~` or `-` prefix negates a tag, `@` is optional:
//! `--tags @smoke,@wip --tags ~@slow` selects (smoke OR wip) AND NOT slow.

use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagMatch {
    name: String,
    negated: bool,
}

impl TagMatch {
    fn matches(&self, tags: &[String]) -> bool {
        let present = tags.iter().any(|t| t.eq_ignore_ascii_case(&self.name));
        present != self.negated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagExpression {
    terms: Vec<Vec<TagMatch>>,
}

impl TagExpression {
    pub fn parse(args: &[String]) -> Result<Self, HarnessError> {
        let mut terms = Vec::new();
        for arg in args {
            if arg.trim().is_empty() {
                continue;
            }
            let mut term = Vec::new();
            for raw in arg.split(',') {
                let raw = raw.trim();
                let (negated, rest) = match raw.strip_prefix('~').or_else(|| raw.strip_prefix('-')) {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                let name = rest.trim_start_matches('@');
                if name.is_empty() || name.chars().any(char::is_whitespace) {
                    return Err(HarnessError::InvalidTagExpression(arg.clone()));
                }
                term.push(TagMatch {
                    name: name.to_string(),
                    negated,
                });
            }
            terms.push(term);
        }
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether a scenario with these (inherited + own) tags should run
    pub fn matches(&self, tags: &[String]) -> bool {
        self.terms
            .iter()
            .all(|term| term.iter().any(|m| m.matches(tags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn expr(args: &[&str]) -> TagExpression {
        TagExpression::parse(&tags(args)).unwrap()
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        assert!(expr(&[]).matches(&tags(&["anything"])));
        assert!(expr(&[]).matches(&[]));
    }

    #[test]
    fn test_or_within_term_and_across_terms() {
        let e = expr(&["@smoke,@wip", "~@slow"]);
        assert!(e.matches(&tags(&["smoke"])));
        assert!(e.matches(&tags(&["wip", "fast"])));
        assert!(!e.matches(&tags(&["smoke", "slow"])));
        assert!(!e.matches(&tags(&["other"])));
    }

    #[test]
    fn test_negation_prefixes() {
        assert!(!expr(&["-@slow"]).matches(&tags(&["slow"])));
        assert!(expr(&["~slow"]).matches(&tags(&["quick"])));
    }

    #[test]
    fn test_malformed_terms_are_rejected() {
        assert!(TagExpression::parse(&tags(&["~"])).is_err());
        assert!(TagExpression::parse(&tags(&["@a,,@b"])).is_err());
        assert!(TagExpression::parse(&tags(&["@a b"])).is_err());
    }
}
