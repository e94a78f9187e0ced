// src/workspace/mod.rs

//! Working-directory lifecycle manager
//!
//! Maintains a "current" working pair (primary draft plus a working
//! subdirectory) and an archive of historical runs. The active archive
//! entry is named by a pointer record file rather than a symlink, so the
//! contract holds on platforms with awkward link semantics.
//!
//! A one-shot mode flag file selects the transition; every transition ends
//! by ensuring the working directory exists and clearing the flag, so a
//! bare re-invocation is idempotent first-run behavior.

use crate::deploy::timestamp_id;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Primary artifact file name
pub const DRAFT: &str = "draft.md";
/// Working subdirectory name
pub const WORKING: &str = "working";
/// Archive directory name
pub const ARCHIVE: &str = "archive";
/// Pointer record naming the active archived run
pub const CURRENT_POINTER: &str = "CURRENT";
/// One-shot mode flag file
pub const MODE_FLAG: &str = ".mode";

/// Lifecycle transition selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create the initial working structure
    First,
    /// Back up and clear for regeneration in place
    Update,
    /// Archive the current run and start fresh
    New,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(Mode::First),
            "update" => Ok(Mode::Update),
            "new" => Ok(Mode::New),
            other => Err(Error::Format(format!("unknown workspace mode '{}'", other))),
        }
    }
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::First => "first",
            Mode::Update => "update",
            Mode::New => "new",
        }
    }
}

/// What a transition did
#[derive(Debug)]
pub struct TransitionReport {
    pub mode: Mode,
    /// Archive id created by a `new` transition
    pub archived: Option<String>,
}

/// Manager for one workspace root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn draft_path(&self) -> PathBuf {
        self.root.join(DRAFT)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.root.join(WORKING)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE)
    }

    fn mode_flag_path(&self) -> PathBuf {
        self.root.join(MODE_FLAG)
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(CURRENT_POINTER)
    }

    /// Record the mode for the next transition to consume
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.mode_flag_path(), format!("{}\n", mode.as_str()))?;
        Ok(())
    }

    /// The archive id the pointer record currently names, if any
    pub fn current_pointer(&self) -> Result<Option<String>> {
        let path = self.pointer_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let id = text.trim();
        if id.is_empty() {
            Ok(None)
        } else {
            Ok(Some(id.to_string()))
        }
    }

    /// Where consumers find the active draft: the archive entry named by
    /// the pointer record, or the live draft when nothing is archived
    pub fn resolve_draft(&self) -> Result<PathBuf> {
        match self.current_pointer()? {
            Some(id) => Ok(self.archive_dir().join(id).join(DRAFT)),
            None => Ok(self.draft_path()),
        }
    }

    /// Consume the mode flag and run the matching transition
    ///
    /// A missing or unreadable flag defaults to `first`.
    pub fn transition(&self) -> Result<TransitionReport> {
        let mode = self.take_mode();
        debug!("Workspace transition: {}", mode.as_str());

        let archived = match mode {
            Mode::First => {
                self.first()?;
                None
            }
            Mode::Update => {
                self.update()?;
                None
            }
            Mode::New => Some(self.new_run()?),
        };

        // every transition lands in a usable first-like state
        fs::create_dir_all(self.working_dir())?;
        let flag = self.mode_flag_path();
        if flag.exists() {
            fs::remove_file(flag)?;
        }

        Ok(TransitionReport { mode, archived })
    }

    fn take_mode(&self) -> Mode {
        let path = self.mode_flag_path();
        if !path.exists() {
            return Mode::First;
        }
        match fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse() {
                Ok(mode) => mode,
                Err(_) => {
                    warn!("Ignoring malformed mode flag '{}'", text.trim());
                    Mode::First
                }
            },
            Err(e) => {
                warn!("Could not read mode flag: {}", e);
                Mode::First
            }
        }
    }

    fn first(&self) -> Result<()> {
        fs::create_dir_all(self.working_dir())?;
        Ok(())
    }

    /// Back up the draft, clear the working directory, leave room for the
    /// host to regenerate the draft in place
    fn update(&self) -> Result<()> {
        let draft = self.draft_path();
        if draft.exists() {
            let backups = self.root.join("backups");
            fs::create_dir_all(&backups)?;
            let saved = backups.join(format!("draft-{}.md", timestamp_id()));
            fs::copy(&draft, &saved)?;
            fs::remove_file(&draft)?;
            info!("Backed up draft to {}", saved.display());
        }

        let working = self.working_dir();
        if working.exists() {
            fs::remove_dir_all(&working)?;
        }
        fs::create_dir_all(&working)?;
        Ok(())
    }

    /// Move the current run into a timestamped archive entry and point the
    /// pointer record at it
    fn new_run(&self) -> Result<String> {
        let id = timestamp_id();
        let entry = self.archive_dir().join(&id);

        match self.populate_archive_entry(&entry) {
            Ok(()) => {}
            Err(e) => {
                // never leave a half-built entry behind a stale pointer
                if entry.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&entry) {
                        warn!("Could not remove partial archive entry: {}", cleanup);
                    }
                }
                return Err(e);
            }
        }

        write_pointer(&self.pointer_path(), &id)?;
        info!("Archived current run as {}", id);
        Ok(id)
    }

    fn populate_archive_entry(&self, entry: &Path) -> Result<()> {
        let draft = self.draft_path();
        let working = self.working_dir();
        if !draft.exists() && !working.exists() {
            return Err(Error::Write(format!(
                "nothing to archive in {}",
                self.root.display()
            )));
        }

        fs::create_dir_all(entry)?;
        if draft.exists() {
            fs::rename(&draft, entry.join(DRAFT))?;
        }
        if working.exists() {
            fs::rename(&working, entry.join(WORKING))?;
        }
        Ok(())
    }
}

/// Atomic pointer record write (temp file then rename)
fn write_pointer(path: &Path, id: &str) -> Result<()> {
    use std::io::Write;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::Write(format!("temp file in {}: {}", parent.display(), e)))?;
    writeln!(tmp, "{}", id).map_err(|e| Error::Write(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| Error::Write(format!("rename into {}: {}", path.display(), e)))?;
    Ok(())
}
