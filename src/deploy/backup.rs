// src/deploy/backup.rs

//! Pre-update backup snapshots
//!
//! A snapshot is a timestamp-named directory under `.curator/backups/`
//! holding the category subtrees plus marker and receipt as they were
//! before an update. Names sort chronologically, so retention pruning is
//! oldest-first by name.

use crate::deploy::{copy_tree, DeployStore, CATEGORIES};
use crate::error::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Number of snapshots kept after a successful update
pub const RETAIN: usize = 5;

/// A snapshot of the deployment taken before a destructive operation
#[derive(Debug)]
pub struct BackupSnapshot {
    pub id: String,
    pub dir: PathBuf,
}

impl BackupSnapshot {
    /// Snapshot the current deployment into a fresh timestamped directory
    ///
    /// Copies every existing category subtree plus the marker and receipt.
    /// The snapshot must be complete on disk before the caller overwrites
    /// anything.
    pub fn create(store: &DeployStore, id: String) -> Result<BackupSnapshot> {
        let dir = store.backups_dir().join(&id);
        fs::create_dir_all(&dir)?;

        for category in CATEGORIES {
            let src = store.category_dir(category);
            if src.is_dir() {
                copy_tree(&src, &dir.join(category))?;
            }
        }
        for meta in [store.marker_path(), store.receipt_path()] {
            if meta.exists() {
                let name = meta.file_name().expect("meta files have names");
                fs::copy(&meta, dir.join(name))?;
            }
        }

        debug!("Created backup snapshot {}", id);
        Ok(BackupSnapshot { id, dir })
    }

    /// Restore this snapshot over the target, replacing the category
    /// subtrees and metadata with the snapshotted state
    pub fn restore(&self, store: &DeployStore) -> Result<()> {
        for category in CATEGORIES {
            let target = store.category_dir(category);
            if target.exists() {
                fs::remove_dir_all(&target)?;
            }
            let saved = self.dir.join(category);
            if saved.is_dir() {
                copy_tree(&saved, &target)?;
            }
        }
        for (name, dest) in [
            ("VERSION", store.marker_path()),
            ("receipt.json", store.receipt_path()),
        ] {
            let saved = self.dir.join(name);
            if saved.exists() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&saved, &dest)?;
            }
        }

        info!("Restored backup snapshot {}", self.id);
        Ok(())
    }
}

/// List snapshot ids, oldest first
pub fn list(store: &DeployStore) -> Result<Vec<String>> {
    let dir = store.backups_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();
    ids.sort();
    Ok(ids)
}

/// Remove snapshots beyond the retention count, oldest first
pub fn prune(store: &DeployStore, retain: usize) -> Result<usize> {
    let ids = list(store)?;
    if ids.len() <= retain {
        return Ok(0);
    }

    let excess = ids.len() - retain;
    for id in &ids[..excess] {
        fs::remove_dir_all(store.backups_dir().join(id))?;
        debug!("Pruned backup snapshot {}", id);
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installed_store() -> (TempDir, DeployStore) {
        let dir = TempDir::new().unwrap();
        let store = DeployStore::new(dir.path());
        fs::create_dir_all(store.category_dir("definitions").join("agents")).unwrap();
        fs::write(
            store.category_dir("definitions").join("agents/reviewer.md"),
            "v1",
        )
        .unwrap();
        fs::create_dir_all(store.meta_dir()).unwrap();
        fs::write(store.marker_path(), "0.1.0\n").unwrap();
        (dir, store)
    }

    #[test]
    fn test_snapshot_then_restore() {
        let (_dir, store) = installed_store();
        let snapshot = BackupSnapshot::create(&store, "20260806-120000".to_string()).unwrap();

        // mutate the deployment, then restore
        fs::write(
            store.category_dir("definitions").join("agents/reviewer.md"),
            "v2",
        )
        .unwrap();
        fs::write(store.marker_path(), "0.2.0\n").unwrap();

        snapshot.restore(&store).unwrap();
        assert_eq!(
            fs::read_to_string(store.category_dir("definitions").join("agents/reviewer.md"))
                .unwrap(),
            "v1"
        );
        assert_eq!(fs::read_to_string(store.marker_path()).unwrap(), "0.1.0\n");
    }

    #[test]
    fn test_restore_removes_files_added_after_snapshot() {
        let (_dir, store) = installed_store();
        let snapshot = BackupSnapshot::create(&store, "20260806-120000".to_string()).unwrap();

        let stray = store.category_dir("definitions").join("agents/new.md");
        fs::write(&stray, "added later").unwrap();

        snapshot.restore(&store).unwrap();
        assert!(!stray.exists());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let (_dir, store) = installed_store();
        for i in 0..7 {
            BackupSnapshot::create(&store, format!("20260806-12000{}", i)).unwrap();
        }

        let removed = prune(&store, RETAIN).unwrap();
        assert_eq!(removed, 2);

        let ids = list(&store).unwrap();
        assert_eq!(ids.len(), RETAIN);
        assert_eq!(ids[0], "20260806-120002");
        assert_eq!(ids[4], "20260806-120006");
    }

    #[test]
    fn test_prune_noop_under_retention() {
        let (_dir, store) = installed_store();
        BackupSnapshot::create(&store, "20260806-120000".to_string()).unwrap();
        assert_eq!(prune(&store, RETAIN).unwrap(), 0);
        assert_eq!(list(&store).unwrap().len(), 1);
    }
}
