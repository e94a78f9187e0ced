// src/policy/rules.rs

//! Path classification against an ordered pattern table
//!
//! Bump-required rules are checked before exempt rules; within each list
//! the first matching rule wins. Paths matching nothing land in the
//! unclassified bucket, which is reported but never fatal.

use tracing::warn;

/// How a rule pattern matches a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Whole-path equality
    Exact,
    /// Directory prefix (pattern ends with '/')
    Prefix,
    /// Path suffix (extension-style patterns)
    Suffix,
}

/// One classification rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: MatchKind,
    pub pattern: &'static str,
}

impl Rule {
    pub const fn exact(pattern: &'static str) -> Self {
        Self {
            kind: MatchKind::Exact,
            pattern,
        }
    }

    pub const fn prefix(pattern: &'static str) -> Self {
        Self {
            kind: MatchKind::Prefix,
            pattern,
        }
    }

    pub const fn suffix(pattern: &'static str) -> Self {
        Self {
            kind: MatchKind::Suffix,
            pattern,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.kind {
            MatchKind::Exact => path == self.pattern,
            MatchKind::Prefix => path.starts_with(self.pattern),
            MatchKind::Suffix => path.ends_with(self.pattern),
        }
    }
}

/// Ordered rule table driving the bump decision
#[derive(Debug, Clone)]
pub struct PatternTable {
    /// Changes to these paths require a version bump
    pub required: Vec<Rule>,
    /// Changes to these paths never require a bump
    pub exempt: Vec<Rule>,
    /// If true, a single bump-required path outweighs any number of exempt
    /// changes; policy knob rather than a hard-coded law
    pub bump_on_any_required: bool,
}

impl Default for PatternTable {
    /// Default table for the deployment's protected layout: everything
    /// under framework/ or scripts/ and the marker itself are protected;
    /// repo housekeeping and prose are exempt.
    fn default() -> Self {
        Self {
            required: vec![
                Rule::prefix("framework/"),
                Rule::prefix("scripts/"),
                Rule::exact("VERSION"),
            ],
            exempt: vec![
                Rule::exact("README.md"),
                Rule::prefix(".github/"),
                Rule::prefix("docs/"),
                Rule::suffix(".md"),
            ],
            bump_on_any_required: true,
        }
    }
}

/// Result buckets from classifying a changeset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub bump_required: Vec<String>,
    pub exempt: Vec<String>,
    pub unclassified: Vec<String>,
}

impl Classification {
    /// Whether the classified changes require a version bump under the
    /// given table's policy
    pub fn requires_bump(&self, table: &PatternTable) -> bool {
        table.bump_on_any_required && !self.bump_required.is_empty()
    }

    /// Merge another classification into this one, preserving order
    pub fn merge(&mut self, other: Classification) {
        self.bump_required.extend(other.bump_required);
        self.exempt.extend(other.exempt);
        self.unclassified.extend(other.unclassified);
    }
}

/// Classify changed paths against the table
///
/// Deterministic and total: every path lands in exactly one bucket.
pub fn classify<S: AsRef<str>>(paths: &[S], table: &PatternTable) -> Classification {
    let mut result = Classification::default();

    for path in paths {
        let path = path.as_ref();
        if table.required.iter().any(|r| r.matches(path)) {
            result.bump_required.push(path.to_string());
        } else if table.exempt.iter().any(|r| r.matches(path)) {
            result.exempt.push(path.to_string());
        } else {
            warn!("Unclassified changed path: {}", path);
            result.unclassified.push(path.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_framework_path() {
        let c = classify(&["framework/agents/x.md"], &PatternTable::default());
        assert_eq!(c.bump_required, vec!["framework/agents/x.md"]);
        assert!(c.exempt.is_empty());
        assert!(c.requires_bump(&PatternTable::default()));
    }

    #[test]
    fn test_exempt_only_changeset() {
        let c = classify(
            &["README.md", ".github/workflows/ci.yml"],
            &PatternTable::default(),
        );
        assert!(c.bump_required.is_empty());
        assert_eq!(c.exempt.len(), 2);
        assert!(!c.requires_bump(&PatternTable::default()));
    }

    #[test]
    fn test_required_checked_before_exempt() {
        // framework/agents/x.md also ends with ".md"; the required prefix
        // rule must win over the exempt suffix rule
        let c = classify(&["framework/agents/x.md"], &PatternTable::default());
        assert!(c.exempt.is_empty());
        assert_eq!(c.bump_required.len(), 1);
    }

    #[test]
    fn test_unclassified_bucket() {
        let c = classify(&["Makefile"], &PatternTable::default());
        assert_eq!(c.unclassified, vec!["Makefile"]);
        assert!(!c.requires_bump(&PatternTable::default()));
    }

    #[test]
    fn test_exact_marker_rule() {
        let c = classify(&["VERSION"], &PatternTable::default());
        assert_eq!(c.bump_required, vec!["VERSION"]);
    }

    #[test]
    fn test_one_protected_outweighs_exempt() {
        let c = classify(
            &["README.md", "docs/guide.md", "framework/commands/run.md"],
            &PatternTable::default(),
        );
        assert_eq!(c.bump_required.len(), 1);
        assert_eq!(c.exempt.len(), 2);
        assert!(c.requires_bump(&PatternTable::default()));
    }

    #[test]
    fn test_policy_knob_disables_requirement() {
        let table = PatternTable {
            bump_on_any_required: false,
            ..PatternTable::default()
        };
        let c = classify(&["framework/agents/x.md"], &table);
        assert!(!c.requires_bump(&table));
    }

    #[test]
    fn test_union_equals_merged_classifications() {
        let table = PatternTable::default();
        let a = ["framework/agents/x.md", "Makefile"];
        let b = ["README.md", "scripts/install.sh"];

        let union: Vec<&str> = a.iter().chain(b.iter()).copied().collect();
        let mut merged = classify(&a, &table);
        merged.merge(classify(&b, &table));

        assert_eq!(classify(&union, &table), merged);
    }

    #[test]
    fn test_classification_deterministic() {
        let table = PatternTable::default();
        let paths = ["framework/a.md", "docs/b.md", "weird.bin"];
        assert_eq!(classify(&paths, &table), classify(&paths, &table));
    }
}
