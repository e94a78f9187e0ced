// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::policy::changelog::Issue;

/// Core error types for Curator
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed version or changelog text
    #[error("Invalid format: {0}")]
    Format(String),

    /// A required file does not exist
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// A required file exists but is empty
    #[error("File is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// Unknown version field passed to increment
    #[error("Invalid version field '{0}' (expected major, minor, or patch)")]
    InvalidField(String),

    /// Failed to write a file atomically
    #[error("Write failed: {0}")]
    Write(String),

    /// Installation failed; the target has been rolled back
    #[error("Install failed: {0} (target rolled back)")]
    InstallFailed(String),

    /// Update failed; the previous deployment has been restored
    #[error("Update failed: {0} (previous deployment restored)")]
    UpdateFailed(String),

    /// Uninstall could not remove every owned path
    #[error("Uninstall incomplete: {} path(s) could not be removed", .0.len())]
    UninstallPartial(Vec<PathBuf>),

    /// Changelog validation failures (accumulated, not short-circuited)
    #[error("Changelog validation failed: {}", format_issues(.0))]
    ChangelogInvalid(Vec<Issue>),

    /// Shared-file section markers are duplicated or unbalanced
    #[error("Shared file markers corrupt in {}: {}", .0.display(), .1)]
    SharedFileMarkers(PathBuf, String),

    /// A git subprocess failed
    #[error("git {0} failed: {1}")]
    Git(String, String),
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| i.code())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using Curator's Error type
pub type Result<T> = std::result::Result<T, Error>;
