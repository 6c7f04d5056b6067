use crate::error::Result;
use crate::types::{Head, Revision};
use regex::Regex;

/// Decides whether a head reported by a source should become a child project
/// at all. Passed to `ScmSource::fetch`.
pub trait HeadCriteria: Send + Sync {
    fn is_head(&self, head: &Head, revision: &Revision) -> bool;
}

/// Compile a space-separated list of wildcards (`*` matches any run of
/// characters) into one anchored regex.
pub fn wildcards_to_regex(patterns: &str) -> Result<Regex> {
    let alternatives: Vec<String> = patterns
        .split_whitespace()
        .map(|p| {
            p.split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*")
        })
        .collect();
    if alternatives.is_empty() {
        // Matches nothing.
        return Ok(Regex::new(r"^\b$")?);
    }
    Ok(Regex::new(&format!("^(?:{})$", alternatives.join("|")))?)
}

// ---------------------------------------------------------------------------
// WildcardFilter
// ---------------------------------------------------------------------------

/// Include/exclude filter on head names.
#[derive(Debug, Clone)]
pub struct WildcardFilter {
    include: Regex,
    exclude: Regex,
}

impl WildcardFilter {
    pub fn new(include: &str, exclude: &str) -> Result<Self> {
        Ok(Self {
            include: wildcards_to_regex(include)?,
            exclude: wildcards_to_regex(exclude)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.is_match(name)
    }
}

impl HeadCriteria for WildcardFilter {
    fn is_head(&self, head: &Head, _revision: &Revision) -> bool {
        self.matches(&head.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        let re = wildcards_to_regex("main release/* PR-*").unwrap();
        assert!(re.is_match("main"));
        assert!(re.is_match("release/1.0"));
        assert!(re.is_match("PR-42"));
        assert!(!re.is_match("mainline"));
        assert!(!re.is_match("feature/x"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let re = wildcards_to_regex("v1.0+build").unwrap();
        assert!(re.is_match("v1.0+build"));
        assert!(!re.is_match("v1x0+build"));
    }

    #[test]
    fn empty_pattern_matches_nothing() {
        let re = wildcards_to_regex("   ").unwrap();
        assert!(!re.is_match(""));
        assert!(!re.is_match("main"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = WildcardFilter::new("*", "wip/* tmp").unwrap();
        assert!(filter.matches("main"));
        assert!(!filter.matches("wip/spike"));
        assert!(!filter.matches("tmp"));
        assert!(filter.is_head(&Head::branch("feature/x"), &Revision::new("1")));
    }
}
