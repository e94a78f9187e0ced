// src/deploy/update.rs

//! In-place update transaction
//!
//! The deployment is snapshotted into a timestamped backup before anything
//! is overwritten. Artifacts are copied over in place rather than
//! delete-then-copy, so user content living next to owned files is never
//! touched. Owned files that vanished from the source are removed, computed
//! from the previous receipt. Any failure restores the snapshot before the
//! error surfaces; success prunes backups beyond the retention count.

use crate::deploy::backup::{self, BackupSnapshot, RETAIN};
use crate::deploy::receipt::{OwnedFile, Receipt};
use crate::deploy::{
    ensure_within, sha256_file, timestamp_id, DeployStore, InstallReport, InstallTransaction,
    SourceTree,
};
use crate::error::{Error, Result};
use crate::version::Version;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Result of a successful update
#[derive(Debug)]
pub struct UpdateReport {
    pub from: Version,
    pub to: Version,
    pub written: usize,
    pub removed: usize,
    pub backup_id: String,
    pub pruned_backups: usize,
}

/// What an update invocation actually did
#[derive(Debug)]
pub enum UpdateOutcome {
    /// No marker at the target: degraded to a clean install
    Installed(InstallReport),
    Updated(UpdateReport),
}

/// Restores the pre-update snapshot on any exit that is not disarmed
struct RestoreGuard<'a> {
    snapshot: &'a BackupSnapshot,
    store: &'a DeployStore,
    armed: bool,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.snapshot.restore(self.store) {
            error!(
                "Failed to restore backup {} after aborted update: {}",
                self.snapshot.id, e
            );
        }
    }
}

/// Backup-then-overwrite update of an existing deployment
pub struct UpdateTransaction<'a> {
    store: &'a DeployStore,
    source: &'a SourceTree,
    retain: usize,
}

impl<'a> UpdateTransaction<'a> {
    pub fn new(store: &'a DeployStore, source: &'a SourceTree) -> Self {
        Self {
            store,
            source,
            retain: RETAIN,
        }
    }

    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain;
        self
    }

    pub fn run(&self) -> Result<UpdateOutcome> {
        if !self.store.is_installed() {
            info!("No deployment marker found, performing a clean install");
            let report = InstallTransaction::new(self.store, self.source).run()?;
            return Ok(UpdateOutcome::Installed(report));
        }

        let from = self.store.installed_version()?;
        let to = self.source.version()?;
        let old_receipt = Receipt::load(&self.store.receipt_path())?;
        info!(
            "Updating {} from {} to {}",
            self.store.root().display(),
            from,
            to
        );

        let snapshot = BackupSnapshot::create(self.store, timestamp_id())?;
        let mut guard = RestoreGuard {
            snapshot: &snapshot,
            store: self.store,
            armed: true,
        };

        match self.execute(&to, &old_receipt) {
            Ok((written, removed)) => {
                guard.armed = false;
                // the update itself is committed; a failed prune only
                // leaves extra backups behind
                let pruned_backups = backup::prune(self.store, self.retain).unwrap_or_else(|e| {
                    warn!("Backup pruning failed: {}", e);
                    0
                });
                Ok(UpdateOutcome::Updated(UpdateReport {
                    from,
                    to,
                    written,
                    removed,
                    backup_id: snapshot.id.clone(),
                    pruned_backups,
                }))
            }
            Err(e) => {
                // guard restores the snapshot as it drops
                drop(guard);
                Err(Error::UpdateFailed(e.to_string()))
            }
        }
    }

    fn execute(&self, to: &Version, old_receipt: &Receipt) -> Result<(usize, usize)> {
        let artifacts = self.source.artifacts()?;
        let mut receipt = Receipt::new(to, old_receipt.installed_at.clone());
        receipt.updated_at = Some(chrono::Utc::now().to_rfc3339());
        receipt.shared_file = old_receipt.shared_file.clone();

        let mut written = 0usize;
        let mut new_paths: BTreeSet<PathBuf> = BTreeSet::new();

        for artifact in &artifacts {
            ensure_within(self.store.root(), &artifact.rel)?;
            let target = self
                .store
                .category_dir(artifact.category)
                .join(&artifact.rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::copy(self.source.artifact_path(artifact), &target)?;
            written += 1;
            debug!("Updated {}", target.display());

            let rel = Path::new(artifact.category).join(&artifact.rel);
            new_paths.insert(rel.clone());
            receipt.files.push(OwnedFile {
                rel,
                category: artifact.category.to_string(),
                size: fs::metadata(&target)?.len(),
                sha256: sha256_file(&target)?,
            });
        }

        // owned files dropped by the new source are ours to remove;
        // everything else in the tree is user content and stays
        let mut removed = 0usize;
        for stale in old_receipt
            .files
            .iter()
            .filter(|f| !new_paths.contains(&f.rel))
        {
            let path = self.store.root().join(&stale.rel);
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    debug!("Removed stale artifact {}", path.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Stale artifact already missing: {}", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        receipt.created_dirs = merge_dirs(&old_receipt.created_dirs, &new_paths);
        receipt.store(&self.store.receipt_path())?;
        crate::version::write_marker(&self.store.marker_path(), to)?;

        Ok((written, removed))
    }
}

/// Union of previously-created dirs and the ancestors of the new artifact
/// paths, creation order preserved for the old entries
fn merge_dirs(old: &[PathBuf], new_paths: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
    let mut seen: BTreeSet<PathBuf> = old.iter().cloned().collect();
    let mut dirs: Vec<PathBuf> = old.to_vec();

    for path in new_paths {
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if !dir.as_os_str().is_empty() && seen.insert(dir.to_path_buf()) {
                dirs.push(dir.to_path_buf());
            }
            ancestor = dir.parent();
        }
    }

    dirs
}
