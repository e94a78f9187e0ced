// src/deploy/mod.rs

//! Deployment layout and transactions
//!
//! All deployment state lives in plain files under the target root:
//!
//! ```text
//! <target>/
//!   definitions/            copied artifact categories
//!   metadata/
//!   utilities/
//!   PLAYBOOK.md             shared host file (delimited section appended)
//!   .curator/               package-owned metadata
//!     VERSION               deployed version marker
//!     installed_at
//!     receipt.json          ownership record driving update/uninstall
//!     backups/<ts>/         pre-update snapshots
//!     preinstall/           pre-install copies of overwritten shared files
//! ```
//!
//! At most one install/update/uninstall invocation per target is assumed;
//! there is no locking.

pub mod backup;
pub mod install;
pub mod receipt;
pub mod uninstall;
pub mod update;

pub use install::{InstallReport, InstallTransaction};
pub use uninstall::{UninstallReport, UninstallTransaction};
pub use update::{UpdateReport, UpdateTransaction};

use crate::error::{Error, Result};
use crate::version::Version;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Artifact categories copied from the source tree, in install order
pub const CATEGORIES: [&str; 3] = ["definitions", "metadata", "utilities"];

/// Package metadata directory under the target root
pub const META_DIR: &str = ".curator";

/// Shared host file the package appends its section to
pub const SHARED_FILE: &str = "PLAYBOOK.md";

/// Source-side snippet appended into the shared host file
pub const PLAYBOOK_SNIPPET: &str = "playbook.md";

/// Delimiters around the package-owned section of the shared file
pub const SECTION_BEGIN: &str = "<!-- curator:begin -->";
pub const SECTION_END: &str = "<!-- curator:end -->";

/// Paths into a deployment target
///
/// Injected into each transaction so tests run against temporary roots.
#[derive(Debug, Clone)]
pub struct DeployStore {
    root: PathBuf,
}

impl DeployStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.meta_dir().join("VERSION")
    }

    pub fn installed_at_path(&self) -> PathBuf {
        self.meta_dir().join("installed_at")
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.meta_dir().join("receipt.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.meta_dir().join("backups")
    }

    pub fn preinstall_dir(&self) -> PathBuf {
        self.meta_dir().join("preinstall")
    }

    pub fn shared_file_path(&self) -> PathBuf {
        self.root.join(SHARED_FILE)
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    /// Marker presence decides install vs update
    pub fn is_installed(&self) -> bool {
        self.marker_path().exists()
    }

    pub fn installed_version(&self) -> Result<Version> {
        crate::version::read_marker(&self.marker_path())
    }
}

/// One artifact to deploy: its category and path relative to the category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub category: &'static str,
    pub rel: PathBuf,
}

/// The source artifact tree an install/update reads from
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source version from the tree's marker
    pub fn version(&self) -> Result<Version> {
        crate::version::read_marker(&self.root.join("VERSION"))
    }

    /// Absolute path of an artifact in the source tree
    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(artifact.category).join(&artifact.rel)
    }

    /// Enumerate every artifact, category by category, in sorted order
    pub fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut out = Vec::new();
        for category in CATEGORIES {
            let dir = self.root.join(category);
            if !dir.is_dir() {
                continue;
            }
            for rel in walk_files(&dir)? {
                out.push(Artifact { category, rel });
            }
        }
        Ok(out)
    }

    /// The playbook snippet shipped for the shared host file, if any
    pub fn playbook_snippet(&self) -> Result<Option<String>> {
        let path = self.root.join(PLAYBOOK_SNIPPET);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }
}

/// Collect every file under `dir`, relative to it, sorted for determinism
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fn visit(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                visit(base, &path, out)?;
            } else {
                let rel = path
                    .strip_prefix(base)
                    .expect("walked path is under its base")
                    .to_path_buf();
                out.push(rel);
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    visit(dir, dir, &mut out)?;
    out.sort();
    Ok(out)
}

/// SHA-256 of a file's contents, hex-encoded
pub fn sha256_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy a directory tree, creating `dst` and any needed parents
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for rel in walk_files(src)? {
        let from = src.join(&rel);
        let to = dst.join(&rel);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&from, &to)?;
    }
    Ok(())
}

/// Sortable timestamp id used for backups and archive entries
pub fn timestamp_id() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Confirm a copy target is inside the root it belongs to
///
/// Source trees are trusted local input, but a relative path containing
/// `..` must never escape the target root.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<()> {
    use std::path::Component;
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::Write(format!(
                "path {} escapes the target root {}",
                candidate.display(),
                root.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_files_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::write(dir.path().join("b/inner/z.md"), "z").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("a.md"), PathBuf::from("b/inner/z.md")]
        );
    }

    #[test]
    fn test_source_tree_artifacts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("definitions/agents")).unwrap();
        fs::write(dir.path().join("definitions/agents/reviewer.md"), "r").unwrap();
        fs::create_dir_all(dir.path().join("utilities")).unwrap();
        fs::write(dir.path().join("utilities/helper.sh"), "#!/bin/sh\n").unwrap();

        let source = SourceTree::new(dir.path());
        let artifacts = source.artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].category, "definitions");
        assert_eq!(artifacts[0].rel, PathBuf::from("agents/reviewer.md"));
        assert_eq!(artifacts[1].category, "utilities");
    }

    #[test]
    fn test_sha256_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/f.md"), "payload").unwrap();

        let target = dst.path().join("copy");
        copy_tree(src.path(), &target).unwrap();
        assert_eq!(fs::read_to_string(target.join("sub/f.md")).unwrap(), "payload");
    }

    #[test]
    fn test_ensure_within_rejects_parent_components() {
        let root = Path::new("/tmp/root");
        assert!(ensure_within(root, Path::new("ok/file.md")).is_ok());
        assert!(ensure_within(root, Path::new("../escape.md")).is_err());
        assert!(ensure_within(root, Path::new("a/../../b")).is_err());
    }

    #[test]
    fn test_store_marker_presence() {
        let dir = TempDir::new().unwrap();
        let store = DeployStore::new(dir.path());
        assert!(!store.is_installed());

        fs::create_dir_all(store.meta_dir()).unwrap();
        fs::write(store.marker_path(), "0.1.0\n").unwrap();
        assert!(store.is_installed());
        assert_eq!(
            store.installed_version().unwrap(),
            crate::version::Version::new(0, 1, 0)
        );
    }
}
