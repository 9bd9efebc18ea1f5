use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only record of mail UIDs that have already triggered a display,
/// so a dispatch is never shown twice across crashes and restarts.
///
/// One UID per line. Read in full once per polling cycle; never compacted.
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every recorded UID. Fails open: a missing file is created
    /// empty and an unreadable one yields the empty set. Dedup is
    /// best-effort; the alert path must keep running.
    pub fn load(&self) -> HashSet<String> {
        if !self.path.exists() {
            if let Err(e) = self.ensure_file() {
                log::warn!("could not create ledger {}: {e}", self.path.display());
            }
            return HashSet::new();
        }
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                log::warn!(
                    "ledger {} unreadable ({e}); treating as empty",
                    self.path.display()
                );
                HashSet::new()
            }
        }
    }

    /// Durably appends one UID. Must land before the corresponding alert is
    /// handed to the display, so a crash in between loses at most that one
    /// alert instead of looping it forever.
    pub fn record(&self, uid: &str) -> Result<()> {
        let mut file = self
            .open_append()
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        writeln!(file, "{uid}")?;
        file.sync_data()
            .with_context(|| format!("syncing ledger {}", self.path.display()))?;
        Ok(())
    }

    fn ensure_file(&self) -> Result<()> {
        self.open_append().map(|_| ())
    }

    fn open_append(&self) -> Result<fs::File> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?)
    }
}
