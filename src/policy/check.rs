// src/policy/check.rs

//! Change-impact check driver
//!
//! Pure evaluation over an already-gathered changeset plus git plumbing to
//! gather it. Git is invoked as a subprocess (system git, like Cargo does)
//! rather than through a bindings crate.

use crate::error::{Error, Result};
use crate::policy::changelog;
use crate::policy::rules::{classify, Classification, PatternTable};
use crate::version::Version;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Outcome of the bump-requirement evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStatus {
    /// A bump was required and the marker + changelog fulfil it
    Satisfied,
    /// A bump was required but the marker or changelog do not fulfil it
    Unsatisfied,
    /// No protected path changed
    NotRequired,
}

impl RequirementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementStatus::Satisfied => "satisfied",
            RequirementStatus::Unsatisfied => "unsatisfied",
            RequirementStatus::NotRequired => "not_required",
        }
    }

    /// Process exit mapping: only an unfulfilled requirement fails the gate
    pub fn is_failure(&self) -> bool {
        matches!(self, RequirementStatus::Unsatisfied)
    }
}

/// Full result of a change-impact check
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub classification: Classification,
    pub base_version: Version,
    pub current_version: Version,
    pub status: RequirementStatus,
    /// Why the requirement is unsatisfied, when it is
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn version_required(&self) -> bool {
        self.status != RequirementStatus::NotRequired
    }

    /// key=value lines for automation pipelines
    pub fn machine_readable(&self) -> String {
        format!(
            "version_required={}\nbase_version={}\ncurrent_version={}\nrequirement_status={}\n",
            self.version_required(),
            self.base_version,
            self.current_version,
            self.status.as_str()
        )
    }
}

/// Evaluate the bump requirement for an already-classified changeset
///
/// Pure: no filesystem or subprocess access. The changelog text is the
/// current working-tree changelog, or None if the repo has none.
pub fn evaluate(
    classification: Classification,
    base_version: Version,
    current_version: Version,
    changelog_text: Option<&str>,
    table: &PatternTable,
) -> CheckReport {
    if !classification.requires_bump(table) {
        return CheckReport {
            classification,
            base_version,
            current_version,
            status: RequirementStatus::NotRequired,
            problems: Vec::new(),
        };
    }

    let mut problems = Vec::new();

    if current_version <= base_version {
        problems.push(format!(
            "version not bumped: base {} vs current {}",
            base_version, current_version
        ));
    }

    match changelog_text {
        None => problems.push("no changelog found".to_string()),
        Some(text) => {
            let doc = changelog::parse(text);
            for issue in changelog::validate(&doc, &current_version) {
                problems.push(format!("changelog: {}", issue.describe()));
            }
        }
    }

    let status = if problems.is_empty() {
        RequirementStatus::Satisfied
    } else {
        RequirementStatus::Unsatisfied
    };

    CheckReport {
        classification,
        base_version,
        current_version,
        status,
        problems,
    }
}

/// Run the full check against a git repository
///
/// Gathers the changeset from `git diff --name-only <base> HEAD`, the base
/// marker from `git show <base>:VERSION`, and the current marker plus
/// changelog from the working tree.
pub fn run(repo: &Path, base_ref: &str, table: &PatternTable) -> Result<CheckReport> {
    let changed = changed_paths(repo, base_ref)?;
    debug!("{} path(s) changed since {}", changed.len(), base_ref);

    let classification = classify(&changed, table);

    let base_text = file_at_ref(repo, base_ref, "VERSION")?;
    let base_version = Version::parse(base_text.trim())?;
    let current_version = crate::version::read_marker(&repo.join("VERSION"))?;

    let changelog_path = repo.join("CHANGELOG.md");
    let changelog_text = if changelog_path.exists() {
        Some(std::fs::read_to_string(&changelog_path)?)
    } else {
        None
    };

    Ok(evaluate(
        classification,
        base_version,
        current_version,
        changelog_text.as_deref(),
        table,
    ))
}

/// Paths changed between a base ref and HEAD
pub fn changed_paths(repo: &Path, base_ref: &str) -> Result<Vec<String>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["diff", "--name-only", base_ref, "HEAD"])
        .output()?;

    if !output.status.success() {
        return Err(Error::Git(
            format!("diff --name-only {} HEAD", base_ref),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Contents of a file at a given ref
fn file_at_ref(repo: &Path, git_ref: &str, path: &str) -> Result<String> {
    let object = format!("{}:{}", git_ref, path);
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["show", &object])
        .output()?;

    if !output.status.success() {
        return Err(Error::Git(
            format!("show {}", object),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(paths: &[&str]) -> Classification {
        classify(paths, &PatternTable::default())
    }

    const CHANGELOG_020: &str = "\
# Changelog

## [0.2.0] - 2026-08-01

### Added
- things
";

    #[test]
    fn test_not_required_for_exempt_changes() {
        let report = evaluate(
            classified(&["README.md", ".github/workflows/ci.yml"]),
            Version::new(0, 1, 0),
            Version::new(0, 1, 0),
            None,
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::NotRequired);
        assert!(!report.status.is_failure());
        assert!(!report.version_required());
    }

    #[test]
    fn test_unsatisfied_without_bump() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 1, 0),
            Some(CHANGELOG_020),
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::Unsatisfied);
        assert!(report.status.is_failure());
    }

    #[test]
    fn test_satisfied_with_bump_and_changelog() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 2, 0),
            Some(CHANGELOG_020),
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::Satisfied);
        assert!(report.problems.is_empty());
    }

    #[test]
    fn test_unsatisfied_when_changelog_lacks_section() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 3, 0),
            Some(CHANGELOG_020),
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::Unsatisfied);
        assert!(report
            .problems
            .iter()
            .any(|p| p.contains("no section for version 0.3.0")));
    }

    #[test]
    fn test_unsatisfied_without_changelog() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 2, 0),
            None,
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::Unsatisfied);
    }

    #[test]
    fn test_downgrade_is_not_a_bump() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 2, 0),
            Version::new(0, 1, 9),
            Some(CHANGELOG_020),
            &PatternTable::default(),
        );
        assert_eq!(report.status, RequirementStatus::Unsatisfied);
    }

    #[test]
    fn test_machine_readable_lines() {
        let report = evaluate(
            classified(&["framework/agents/x.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 2, 0),
            Some(CHANGELOG_020),
            &PatternTable::default(),
        );
        let out = report.machine_readable();
        assert!(out.contains("version_required=true"));
        assert!(out.contains("base_version=0.1.0"));
        assert!(out.contains("current_version=0.2.0"));
        assert!(out.contains("requirement_status=satisfied"));
    }

    #[test]
    fn test_machine_readable_not_required() {
        let report = evaluate(
            classified(&["docs/notes.md"]),
            Version::new(0, 1, 0),
            Version::new(0, 1, 0),
            None,
            &PatternTable::default(),
        );
        assert!(report
            .machine_readable()
            .contains("requirement_status=not_required"));
        assert!(report.machine_readable().contains("version_required=false"));
    }
}
