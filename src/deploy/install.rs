// src/deploy/install.rs

//! Clean-install transaction
//!
//! Every created path goes into an ordered ledger; the ledger lives inside
//! a guard whose `Drop` walks it in reverse and deletes everything recorded
//! whenever the transaction exits without disarming — error return, panic,
//! or interruption-by-unwind all take the same path. On failure the target
//! ends exactly as found.

use crate::deploy::receipt::{OwnedFile, Receipt, SharedFileRecord};
use crate::deploy::{
    ensure_within, sha256_file, DeployStore, SourceTree, CATEGORIES, SECTION_BEGIN, SECTION_END,
    SHARED_FILE,
};
use crate::error::{Error, Result};
use crate::version::Version;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Result of a successful install
#[derive(Debug)]
pub struct InstallReport {
    pub version: Version,
    /// (category, files installed) in category order
    pub counts: Vec<(&'static str, usize)>,
}

impl InstallReport {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// One recorded creation or modification, rolled back in reverse order
#[derive(Debug)]
enum LedgerEntry {
    CreatedDir(PathBuf),
    CreatedFile(PathBuf),
    /// A pre-existing file that was modified; `saved` holds the original
    ModifiedFile { path: PathBuf, saved: PathBuf },
}

/// Ordered creation ledger with rollback-on-drop
struct RollbackLedger {
    entries: Vec<LedgerEntry>,
    armed: bool,
}

impl RollbackLedger {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            armed: true,
        }
    }

    fn record_dir(&mut self, path: &Path) {
        self.entries.push(LedgerEntry::CreatedDir(path.to_path_buf()));
    }

    fn record_file(&mut self, path: &Path) {
        self.entries.push(LedgerEntry::CreatedFile(path.to_path_buf()));
    }

    fn record_modified(&mut self, path: &Path, saved: &Path) {
        self.entries.push(LedgerEntry::ModifiedFile {
            path: path.to_path_buf(),
            saved: saved.to_path_buf(),
        });
    }

    /// Create a directory and any missing ancestors, recording each one
    /// actually created
    fn create_dir_recorded(&mut self, path: &Path) -> Result<()> {
        // a bare relative root has "" as its final ancestor
        if path.as_os_str().is_empty() || path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.create_dir_recorded(parent)?;
        }
        fs::create_dir(path)?;
        self.record_dir(path);
        Ok(())
    }

    /// Keep everything: the install succeeded
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackLedger {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for entry in self.entries.iter().rev() {
            let outcome = match entry {
                LedgerEntry::CreatedFile(path) => fs::remove_file(path),
                LedgerEntry::CreatedDir(path) => fs::remove_dir(path),
                LedgerEntry::ModifiedFile { path, saved } => {
                    fs::copy(saved, path).map(|_| ())
                }
            };
            if let Err(e) = outcome {
                error!("Rollback step failed for {:?}: {}", entry, e);
            }
        }
    }
}

/// Atomic clean install of a source tree into a target root
pub struct InstallTransaction<'a> {
    store: &'a DeployStore,
    source: &'a SourceTree,
}

impl<'a> InstallTransaction<'a> {
    pub fn new(store: &'a DeployStore, source: &'a SourceTree) -> Self {
        Self { store, source }
    }

    pub fn run(&self) -> Result<InstallReport> {
        let version = self.source.version()?;
        info!(
            "Installing version {} into {}",
            version,
            self.store.root().display()
        );

        let mut ledger = RollbackLedger::new();
        match self.execute(&version, &mut ledger) {
            Ok(report) => {
                ledger.disarm();
                info!("Installed {} artifact(s)", report.total());
                Ok(report)
            }
            Err(e) => {
                // ledger drops here and unwinds every recorded path
                drop(ledger);
                Err(Error::InstallFailed(e.to_string()))
            }
        }
    }

    fn execute(&self, version: &Version, ledger: &mut RollbackLedger) -> Result<InstallReport> {
        let artifacts = self.source.artifacts()?;
        let mut counts: Vec<(&'static str, usize)> =
            CATEGORIES.iter().map(|c| (*c, 0usize)).collect();
        let mut receipt = Receipt::new(version, chrono::Utc::now().to_rfc3339());

        ledger.create_dir_recorded(self.store.root())?;
        for category in CATEGORIES {
            ledger.create_dir_recorded(&self.store.category_dir(category))?;
        }

        for artifact in &artifacts {
            ensure_within(self.store.root(), &artifact.rel)?;
            let target = self
                .store
                .category_dir(artifact.category)
                .join(&artifact.rel);
            if let Some(parent) = target.parent() {
                ledger.create_dir_recorded(parent)?;
            }

            let src = self.source.artifact_path(artifact);
            fs::copy(&src, &target)?;
            ledger.record_file(&target);
            debug!("Installed {}", target.display());

            let size = fs::metadata(&target)?.len();
            let rel = Path::new(artifact.category).join(&artifact.rel);
            receipt.files.push(OwnedFile {
                rel,
                category: artifact.category.to_string(),
                size,
                sha256: sha256_file(&target)?,
            });
            if let Some(slot) = counts.iter_mut().find(|(c, _)| *c == artifact.category) {
                slot.1 += 1;
            }
        }

        receipt.shared_file = self.append_playbook(ledger)?;

        ledger.create_dir_recorded(&self.store.meta_dir())?;
        receipt.created_dirs = created_dirs_relative(ledger, self.store.root());

        let installed_at = self.store.installed_at_path();
        fs::write(&installed_at, format!("{}\n", receipt.installed_at))?;
        ledger.record_file(&installed_at);

        receipt.store(&self.store.receipt_path())?;
        ledger.record_file(&self.store.receipt_path());

        // marker last: its presence is what declares the deployment live
        crate::version::write_marker(&self.store.marker_path(), version)?;
        ledger.record_file(&self.store.marker_path());

        Ok(InstallReport {
            version: *version,
            counts,
        })
    }

    /// Append the delimited playbook section to the shared host file
    ///
    /// A pre-existing shared file is first copied under the preinstall dir
    /// so uninstall can put it back verbatim.
    fn append_playbook(&self, ledger: &mut RollbackLedger) -> Result<Option<SharedFileRecord>> {
        let snippet = match self.source.playbook_snippet()? {
            Some(s) => s,
            None => return Ok(None),
        };

        let shared = self.store.shared_file_path();
        let section = format!(
            "{}\n{}\n{}\n",
            SECTION_BEGIN,
            snippet.trim_end(),
            SECTION_END
        );

        if shared.exists() {
            ledger.create_dir_recorded(&self.store.preinstall_dir())?;
            let saved = self.store.preinstall_dir().join(SHARED_FILE);
            fs::copy(&shared, &saved)?;
            ledger.record_file(&saved);

            let mut text = fs::read_to_string(&shared)?;
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
            text.push_str(&section);
            fs::write(&shared, text)?;
            ledger.record_modified(&shared, &saved);

            Ok(Some(SharedFileRecord {
                rel: PathBuf::from(SHARED_FILE),
                preinstall_backup: true,
            }))
        } else {
            fs::write(&shared, &section)?;
            ledger.record_file(&shared);
            Ok(Some(SharedFileRecord {
                rel: PathBuf::from(SHARED_FILE),
                preinstall_backup: false,
            }))
        }
    }
}

/// Directories the ledger created, relative to the target root, in
/// creation order
fn created_dirs_relative(ledger: &RollbackLedger, root: &Path) -> Vec<PathBuf> {
    ledger
        .entries
        .iter()
        .filter_map(|e| match e {
            LedgerEntry::CreatedDir(p) => p.strip_prefix(root).ok().map(Path::to_path_buf),
            _ => None,
        })
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::walk_files;
    use tempfile::TempDir;

    fn make_source(version: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("VERSION"), format!("{}\n", version)).unwrap();
        fs::create_dir_all(dir.path().join("definitions/agents")).unwrap();
        fs::write(dir.path().join("definitions/agents/reviewer.md"), "review").unwrap();
        fs::write(dir.path().join("definitions/agents/planner.md"), "plan").unwrap();
        fs::create_dir_all(dir.path().join("metadata")).unwrap();
        fs::write(dir.path().join("metadata/manifest.md"), "manifest").unwrap();
        fs::create_dir_all(dir.path().join("utilities")).unwrap();
        fs::write(dir.path().join("utilities/helper.sh"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("utilities/lint.sh"), "#!/bin/sh\n").unwrap();
        dir
    }

    #[test]
    fn test_fresh_install() {
        let source_dir = make_source("0.1.0");
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path().join("deploy"));
        let source = SourceTree::new(source_dir.path());

        let report = InstallTransaction::new(&store, &source).run().unwrap();
        assert_eq!(report.version, Version::new(0, 1, 0));
        assert_eq!(report.total(), 5);
        assert_eq!(report.counts[0], ("definitions", 2));
        assert_eq!(report.counts[1], ("metadata", 1));
        assert_eq!(report.counts[2], ("utilities", 2));

        assert!(store.is_installed());
        assert_eq!(store.installed_version().unwrap(), Version::new(0, 1, 0));
        assert!(store
            .category_dir("definitions")
            .join("agents/reviewer.md")
            .exists());

        let receipt = Receipt::load(&store.receipt_path()).unwrap();
        assert_eq!(receipt.files.len(), 5);
        assert!(receipt.shared_file.is_none());
    }

    #[test]
    fn test_install_rollback_leaves_target_as_found() {
        let source_dir = make_source("0.1.0");
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path());
        let source = SourceTree::new(source_dir.path());

        // squat a directory on the third artifact's target path so the
        // copy fails mid-transaction
        fs::create_dir_all(store.category_dir("metadata").join("manifest.md")).unwrap();

        let before: Vec<_> = walk_files(target_dir.path()).unwrap();
        let result = InstallTransaction::new(&store, &source).run();
        assert!(matches!(result, Err(Error::InstallFailed(_))));

        // zero of the five artifacts remain and no metadata was left behind
        let after: Vec<_> = walk_files(target_dir.path()).unwrap();
        assert_eq!(before, after);
        assert!(!store.marker_path().exists());
        assert!(!store.category_dir("definitions").exists());
        assert!(!store.meta_dir().exists());
    }

    #[test]
    fn test_install_rollback_removes_created_root() {
        let source_dir = make_source("0.1.0");
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("deploy");
        let store = DeployStore::new(&root);
        let source = SourceTree::new(source_dir.path());

        fs::create_dir_all(store.category_dir("utilities").join("lint.sh")).unwrap();

        assert!(InstallTransaction::new(&store, &source).run().is_err());
        assert!(!root.join(".curator").exists());
        assert!(!root.join("definitions").exists());
    }

    #[test]
    fn test_install_appends_playbook_to_fresh_shared_file() {
        let source_dir = make_source("0.1.0");
        fs::write(source_dir.path().join("playbook.md"), "Use the agents.\n").unwrap();
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path());
        let source = SourceTree::new(source_dir.path());

        InstallTransaction::new(&store, &source).run().unwrap();

        let text = fs::read_to_string(store.shared_file_path()).unwrap();
        assert!(text.starts_with(SECTION_BEGIN));
        assert!(text.contains("Use the agents."));
        assert!(text.trim_end().ends_with(SECTION_END));

        let receipt = Receipt::load(&store.receipt_path()).unwrap();
        let shared = receipt.shared_file.unwrap();
        assert!(!shared.preinstall_backup);
    }

    #[test]
    fn test_install_backs_up_existing_shared_file() {
        let source_dir = make_source("0.1.0");
        fs::write(source_dir.path().join("playbook.md"), "Use the agents.\n").unwrap();
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path());
        fs::write(store.shared_file_path(), "# User playbook\n").unwrap();
        let source = SourceTree::new(source_dir.path());

        InstallTransaction::new(&store, &source).run().unwrap();

        let text = fs::read_to_string(store.shared_file_path()).unwrap();
        assert!(text.starts_with("# User playbook"));
        assert!(text.contains(SECTION_BEGIN));

        let saved = store.preinstall_dir().join(SHARED_FILE);
        assert_eq!(fs::read_to_string(saved).unwrap(), "# User playbook\n");
    }

    #[test]
    fn test_rollback_restores_modified_shared_file() {
        let source_dir = make_source("0.1.0");
        fs::write(source_dir.path().join("playbook.md"), "Use the agents.\n").unwrap();
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path());
        fs::write(store.shared_file_path(), "# User playbook\n").unwrap();
        let source = SourceTree::new(source_dir.path());

        // force a failure after the playbook append by squatting on the
        // installed_at path
        fs::create_dir_all(store.installed_at_path()).unwrap();

        assert!(InstallTransaction::new(&store, &source).run().is_err());
        assert_eq!(
            fs::read_to_string(store.shared_file_path()).unwrap(),
            "# User playbook\n"
        );
        assert!(!store.preinstall_dir().exists());
    }

    #[test]
    fn test_install_without_source_marker_fails_before_touching_target() {
        let source_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("definitions")).unwrap();
        let target_dir = TempDir::new().unwrap();
        let store = DeployStore::new(target_dir.path().join("deploy"));
        let source = SourceTree::new(source_dir.path());

        let result = InstallTransaction::new(&store, &source).run();
        assert!(matches!(result, Err(Error::MissingFile(_))));
        assert!(!target_dir.path().join("deploy").exists());
    }
}
