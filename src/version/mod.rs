// src/version/mod.rs

//! Semantic version handling for the deployment marker
//!
//! The marker grammar is deliberately strict: exactly three dot-separated
//! base-10 integers, no pre-release or build suffixes. Marker writes are
//! temp-file-then-rename with a timestamped backup of the prior value.

use crate::error::{Error, Result};
use chrono::Utc;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// A parsed MAJOR.MINOR.PATCH version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string
    ///
    /// Accepts exactly three dot-separated base-10 integer components and
    /// nothing else:
    /// - "1.2.3" → ok
    /// - "1.2" → error (two components)
    /// - "1.2.3-alpha" → error (suffix)
    /// - " 1.2.3" → error (whitespace)
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::Format(format!(
                "version '{}' must have exactly three dot-separated components",
                s
            )));
        }

        let mut nums = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::Format(format!(
                    "version '{}' has a non-numeric component '{}'",
                    s, part
                )));
            }
            nums[i] = part
                .parse::<u64>()
                .map_err(|e| Error::Format(format!("version '{}': {}", s, e)))?;
        }

        Ok(Self::new(nums[0], nums[1], nums[2]))
    }

    /// Compare two versions
    ///
    /// Lexicographic over (major, minor, patch). Exposed alongside the
    /// derived `Ord` so callers can report EQUAL/GREATER/LESS directly.
    pub fn compare(&self, other: &Version) -> Ordering {
        self.cmp(other)
    }

    /// Increment one field, resetting the lower-order fields
    ///
    /// - major: 1.2.3 → 2.0.0
    /// - minor: 1.2.3 → 1.3.0
    /// - patch: 1.2.3 → 1.2.4
    pub fn increment(&self, field: Field) -> Version {
        match field {
            Field::Major => Version::new(self.major + 1, 0, 0),
            Field::Minor => Version::new(self.major, self.minor + 1, 0),
            Field::Patch => Version::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Version field selector for increment operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Major,
    Minor,
    Patch,
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(Field::Major),
            "minor" => Ok(Field::Minor),
            "patch" => Ok(Field::Patch),
            other => Err(Error::InvalidField(other.to_string())),
        }
    }
}

/// Read a version marker file
///
/// The marker holds a single trimmed line of canonical version text.
/// Discriminates missing file, empty file, and malformed content.
pub fn read_marker(path: &Path) -> Result<Version> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }

    let text = fs::read_to_string(path)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyFile(path.to_path_buf()));
    }

    Version::parse(trimmed)
}

/// Write a version marker file atomically
///
/// Any existing marker is first copied aside with a timestamp suffix, then
/// the new value is written to a temp file in the same directory and
/// renamed into place.
pub fn write_marker(path: &Path, version: &Version) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    if path.exists() {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let backup = path.with_file_name(format!(
            "{}.{}.bak",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("VERSION"),
            stamp
        ));
        fs::copy(path, &backup)
            .map_err(|e| Error::Write(format!("backup of {}: {}", path.display(), e)))?;
        debug!("Backed up previous marker to {:?}", backup);
    }

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::Write(format!("temp file in {}: {}", parent.display(), e)))?;
    writeln!(tmp, "{}", version).map_err(|e| Error::Write(e.to_string()))?;
    tmp.flush().map_err(|e| Error::Write(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| Error::Write(format!("rename into {}: {}", path.display(), e)))?;

    debug!("Wrote marker {} = {}", path.display(), version);
    Ok(())
}
