// src/deploy/uninstall.rs

//! Uninstall transaction
//!
//! Driven entirely by the receipt: only recorded paths are removed, with a
//! warning when a file's on-disk hash no longer matches what was installed.
//! The shared host file is restored from its pre-install copy when one was
//! taken, otherwise the delimited section is excised. Directories the
//! package created are pruned only when empty; paths that cannot be removed
//! accumulate into a partial-failure error while everything already removed
//! stays removed.

use crate::deploy::receipt::Receipt;
use crate::deploy::{sha256_file, DeployStore, SECTION_BEGIN, SECTION_END, SHARED_FILE};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to the shared host file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedOutcome {
    /// Package never touched a shared file
    None,
    /// Pre-install copy restored verbatim
    Restored,
    /// Delimited section excised, rest of the file kept
    Excised,
    /// Nothing but the section remained, file deleted
    Deleted,
}

/// Result of a successful uninstall
#[derive(Debug)]
pub struct UninstallReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub shared: SharedOutcome,
}

/// Receipt-driven removal of a deployment
pub struct UninstallTransaction<'a> {
    store: &'a DeployStore,
}

impl<'a> UninstallTransaction<'a> {
    pub fn new(store: &'a DeployStore) -> Self {
        Self { store }
    }

    /// Remove the deployment
    ///
    /// The caller is responsible for obtaining user confirmation before
    /// invoking this; nothing here prompts.
    pub fn run(&self) -> Result<UninstallReport> {
        let receipt = Receipt::load(&self.store.receipt_path())?;
        info!(
            "Uninstalling version {} from {}",
            receipt.version,
            self.store.root().display()
        );

        let mut failures: Vec<PathBuf> = Vec::new();
        let mut removed_files = 0usize;

        for owned in &receipt.files {
            let path = self.store.root().join(&owned.rel);
            if !path.exists() {
                debug!("Owned file already gone: {}", path.display());
                continue;
            }
            match sha256_file(&path) {
                Ok(hash) if hash != owned.sha256 => {
                    warn!("Removing locally modified file: {}", path.display());
                }
                Err(e) => warn!("Could not hash {}: {}", path.display(), e),
                _ => {}
            }
            match fs::remove_file(&path) {
                Ok(()) => removed_files += 1,
                Err(e) => {
                    warn!("Could not remove {}: {}", path.display(), e);
                    failures.push(path);
                }
            }
        }

        let shared = match self.restore_shared_file(&receipt) {
            Ok(outcome) => outcome,
            Err(Error::SharedFileMarkers(path, reason)) => {
                return Err(Error::SharedFileMarkers(path, reason));
            }
            Err(e) => {
                warn!("Shared file handling failed: {}", e);
                failures.push(self.store.shared_file_path());
                SharedOutcome::None
            }
        };

        let removed_dirs = self.prune_created_dirs(&receipt, &mut failures);

        // metadata dir goes last: it held the receipt driving all of the
        // above, plus the pre-install copies just restored
        if self.store.meta_dir().exists() {
            if let Err(e) = fs::remove_dir_all(self.store.meta_dir()) {
                warn!("Could not remove metadata dir: {}", e);
                failures.push(self.store.meta_dir());
            }
        }

        if !failures.is_empty() {
            return Err(Error::UninstallPartial(failures));
        }

        info!(
            "Uninstalled: {} file(s), {} dir(s) removed",
            removed_files, removed_dirs
        );
        Ok(UninstallReport {
            removed_files,
            removed_dirs,
            shared,
        })
    }

    /// Put the shared host file back the way it was before install
    fn restore_shared_file(&self, receipt: &Receipt) -> Result<SharedOutcome> {
        let record = match &receipt.shared_file {
            Some(r) => r,
            None => return Ok(SharedOutcome::None),
        };
        let path = self.store.root().join(&record.rel);

        let saved = self.store.preinstall_dir().join(SHARED_FILE);
        if record.preinstall_backup && saved.exists() {
            fs::copy(&saved, &path)?;
            debug!("Restored pre-install copy of {}", path.display());
            return Ok(SharedOutcome::Restored);
        }

        if !path.exists() {
            debug!("Shared file already gone: {}", path.display());
            return Ok(SharedOutcome::None);
        }

        excise_section(&path)
    }

    /// Remove now-empty directories the package created, deepest first
    fn prune_created_dirs(&self, receipt: &Receipt, failures: &mut Vec<PathBuf>) -> usize {
        let mut dirs: Vec<&PathBuf> = receipt
            .created_dirs
            .iter()
            .filter(|d| !d.starts_with(crate::deploy::META_DIR))
            .collect();
        // deepest first so children empty out their parents
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        let mut removed = 0usize;
        for rel in dirs {
            let path = self.store.root().join(rel);
            if !path.is_dir() {
                continue;
            }
            match fs::read_dir(&path) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        debug!("Keeping non-empty directory {}", path.display());
                        continue;
                    }
                }
                Err(e) => {
                    warn!("Could not inspect {}: {}", path.display(), e);
                    failures.push(path);
                    continue;
                }
            }
            match fs::remove_dir(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Could not remove {}: {}", path.display(), e);
                    failures.push(path);
                }
            }
        }
        removed
    }
}

/// Excise the delimited package section from a shared file
///
/// Duplicated or unbalanced markers are an explicit error: with multiple
/// packages sharing delimiter text there is no safe guess about which
/// section is ours.
fn excise_section(path: &Path) -> Result<SharedOutcome> {
    let text = fs::read_to_string(path)?;

    let begins: Vec<usize> = text.match_indices(SECTION_BEGIN).map(|(i, _)| i).collect();
    let ends: Vec<usize> = text.match_indices(SECTION_END).map(|(i, _)| i).collect();

    match (begins.len(), ends.len()) {
        (0, 0) => return Ok(SharedOutcome::None),
        (1, 1) if begins[0] < ends[0] => {}
        (b, e) => {
            return Err(Error::SharedFileMarkers(
                path.to_path_buf(),
                format!("{} begin and {} end marker(s) found", b, e),
            ));
        }
    }

    let start = begins[0];
    let mut stop = ends[0] + SECTION_END.len();
    if text[stop..].starts_with('\n') {
        stop += 1;
    }

    let mut remainder = String::new();
    remainder.push_str(text[..start].trim_end_matches([' ', '\t']));
    remainder.push_str(&text[stop..]);

    if remainder.trim().is_empty() {
        fs::remove_file(path)?;
        debug!("Removed shared file {} (nothing left)", path.display());
        return Ok(SharedOutcome::Deleted);
    }

    let trimmed = format!("{}\n", remainder.trim_end());
    fs::write(path, trimmed)?;
    debug!("Excised package section from {}", path.display());
    Ok(SharedOutcome::Excised)
}
