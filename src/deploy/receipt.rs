// src/deploy/receipt.rs

//! Install receipt: the persisted ownership record
//!
//! Written on install, rewritten on update, consumed by uninstall. The
//! receipt is the deployment's only record of which paths the package owns,
//! so transactions write it atomically and never leave it half-updated.

use crate::error::{Error, Result};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One owned file, path relative to the target root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedFile {
    pub rel: PathBuf,
    pub category: String,
    pub size: u64,
    pub sha256: String,
}

/// How the shared host file was touched at install time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedFileRecord {
    /// Path relative to the target root
    pub rel: PathBuf,
    /// True when a pre-install copy of the file was saved
    pub preinstall_backup: bool,
}

/// The full ownership record for one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub version: String,
    pub installed_at: String,
    pub updated_at: Option<String>,
    /// Directories this package created, in creation order
    pub created_dirs: Vec<PathBuf>,
    pub files: Vec<OwnedFile>,
    pub shared_file: Option<SharedFileRecord>,
}

impl Receipt {
    pub fn new(version: &Version, installed_at: String) -> Self {
        Self {
            version: version.to_string(),
            installed_at,
            updated_at: None,
            created_dirs: Vec::new(),
            files: Vec::new(),
            shared_file: None,
        }
    }

    /// Load a receipt, failing with MissingFile when none exists
    pub fn load(path: &Path) -> Result<Receipt> {
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Format(format!("receipt {}: {}", path.display(), e)))
    }

    /// Write the receipt atomically (temp file then rename)
    pub fn store(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Write(format!("serialize receipt: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| Error::Write(format!("temp file in {}: {}", parent.display(), e)))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| Error::Write(e.to_string()))?;
        tmp.flush().map_err(|e| Error::Write(e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| Error::Write(format!("rename into {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Owned file paths as a set of relative paths
    pub fn owned_paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.rel.as_path()).collect()
    }
}
