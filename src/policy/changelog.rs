// src/policy/changelog.rs

//! Changelog structure validation
//!
//! The changelog is a markdown document with a title line, version sections
//! of the form `## [MAJOR.MINOR.PATCH] - YYYY-MM-DD`, and `### <category>`
//! subsections inside each. Validation accumulates every failure instead of
//! short-circuiting so one run reports the full repair list.

use crate::version::Version;

/// One parsed version section
#[derive(Debug, Clone)]
pub struct Section {
    pub version: Version,
    pub date: Option<String>,
    pub categories: Vec<String>,
}

/// Parsed changelog document
#[derive(Debug, Clone, Default)]
pub struct Changelog {
    pub title: Option<String>,
    pub sections: Vec<Section>,
}

/// A single validation failure with a stable machine-readable code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    MissingTitle,
    MissingVersionHeaders,
    MissingCurrentVersion(Version),
    MissingCategories(Version),
}

impl Issue {
    pub fn code(&self) -> &'static str {
        match self {
            Issue::MissingTitle => "missing-title",
            Issue::MissingVersionHeaders => "missing-version-headers",
            Issue::MissingCurrentVersion(_) => "missing-current-version",
            Issue::MissingCategories(_) => "missing-categories",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Issue::MissingTitle => "no title line found".to_string(),
            Issue::MissingVersionHeaders => {
                "no '## [x.y.z] - date' section headers found".to_string()
            }
            Issue::MissingCurrentVersion(v) => {
                format!("no section for version {}", v)
            }
            Issue::MissingCategories(v) => {
                format!("section for {} has no '### <category>' subsection", v)
            }
        }
    }
}

/// Parse a changelog document
///
/// Lenient by design: lines that do not look like a title, section header,
/// or category are ignored, and section headers whose bracketed text is not
/// a valid version are skipped. Validation decides what is missing.
pub fn parse(text: &str) -> Changelog {
    let mut doc = Changelog::default();

    for line in text.lines() {
        let line = line.trim_end();

        // longest heading prefix first: "### " also starts with "## "
        if let Some(rest) = line.strip_prefix("### ") {
            let category = rest.trim();
            if !category.is_empty() {
                if let Some(section) = doc.sections.last_mut() {
                    section.categories.push(category.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("## ") {
            if let Some(section) = parse_section_header(rest) {
                doc.sections.push(section);
            }
        } else if doc.title.is_none() {
            if let Some(rest) = line.strip_prefix("# ") {
                let title = rest.trim();
                if !title.is_empty() {
                    doc.title = Some(title.to_string());
                }
            }
        }
    }

    doc
}

/// Parse "`[x.y.z] - date`" into a section, None if malformed
fn parse_section_header(rest: &str) -> Option<Section> {
    let rest = rest.trim();
    let close = rest.find(']')?;
    let inner = rest.strip_prefix('[')?;
    let version_text = &inner[..close - 1];
    let version = Version::parse(version_text).ok()?;

    let after = rest[close + 1..].trim();
    let date = after
        .strip_prefix('-')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Some(Section {
        version,
        date,
        categories: Vec::new(),
    })
}

/// Validate a changelog against a target version, accumulating all issues
pub fn validate(doc: &Changelog, target: &Version) -> Vec<Issue> {
    let mut issues = Vec::new();

    if doc.title.is_none() {
        issues.push(Issue::MissingTitle);
    }

    if doc.sections.is_empty() {
        issues.push(Issue::MissingVersionHeaders);
    }

    match doc.sections.iter().find(|s| s.version == *target) {
        None => issues.push(Issue::MissingCurrentVersion(*target)),
        Some(section) => {
            if section.categories.is_empty() {
                issues.push(Issue::MissingCategories(*target));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
# Changelog

## [0.2.0] - 2026-08-01

### Added
- new agent definitions

### Fixed
- marker backup naming

## [0.1.0] - 2026-07-15

### Added
- initial release
";

    #[test]
    fn test_parse_structure() {
        let doc = parse(GOOD);
        assert_eq!(doc.title.as_deref(), Some("Changelog"));
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].version, Version::new(0, 2, 0));
        assert_eq!(doc.sections[0].date.as_deref(), Some("2026-08-01"));
        assert_eq!(doc.sections[0].categories, vec!["Added", "Fixed"]);
        assert_eq!(doc.sections[1].categories, vec!["Added"]);
    }

    #[test]
    fn test_validate_ok() {
        let doc = parse(GOOD);
        assert!(validate(&doc, &Version::new(0, 2, 0)).is_empty());
        assert!(validate(&doc, &Version::new(0, 1, 0)).is_empty());
    }

    #[test]
    fn test_validate_missing_target_section() {
        let doc = parse(GOOD);
        let issues = validate(&doc, &Version::new(0, 3, 0));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "missing-current-version");
    }

    #[test]
    fn test_validate_accumulates_all_failures() {
        let doc = parse("just prose, no structure\n");
        let issues = validate(&doc, &Version::new(1, 0, 0));
        let codes: Vec<_> = issues.iter().map(|i| i.code()).collect();
        assert_eq!(
            codes,
            vec![
                "missing-title",
                "missing-version-headers",
                "missing-current-version"
            ]
        );
    }

    #[test]
    fn test_validate_section_without_categories() {
        let doc = parse("# Changelog\n\n## [0.2.0] - 2026-08-01\n\nprose only\n");
        let issues = validate(&doc, &Version::new(0, 2, 0));
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], Issue::MissingCategories(_)));
    }

    #[test]
    fn test_malformed_section_headers_are_skipped() {
        let doc = parse("# Changelog\n\n## [not-a-version] - 2026-08-01\n### Added\n");
        assert!(doc.sections.is_empty());
        let issues = validate(&doc, &Version::new(0, 1, 0));
        assert!(issues.iter().any(|i| i.code() == "missing-version-headers"));
    }

    #[test]
    fn test_section_header_without_date() {
        let doc = parse("# Changelog\n\n## [0.1.0]\n### Added\n");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].date.is_none());
    }
}
