//! JSON-file watchlist.
//!
//! The file holds an ordered JSON array of instruments. Every toggle
//! rewrites it through a temp file followed by a rename, so a crash mid-write
//! leaves either the old or the new list, never a truncated one.

use crate::error::PersistenceResult;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tickwire_core::{Instrument, InstrumentKey};
use tracing::{debug, info, warn};

/// Ordered set of starred instruments, unique by symbol.
#[derive(Debug)]
pub struct Watchlist {
    path: PathBuf,
    items: Vec<Instrument>,
}

impl Watchlist {
    /// Load the watchlist stored at `path`.
    ///
    /// A missing file is an empty watchlist. An unreadable or corrupt file is
    /// also treated as empty (with a warning); it is overwritten on the next
    /// toggle.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Vec<Instrument>>(&text) {
                Ok(items) => {
                    info!(path = %path.display(), count = items.len(), "Watchlist loaded");
                    items
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt watchlist file, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No watchlist file yet");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read watchlist, starting empty");
                Vec::new()
            }
        };

        Self { path, items }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn items(&self) -> &[Instrument] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, instrument: &Instrument) -> bool {
        self.items.iter().any(|w| w.same_symbol(instrument))
    }

    /// Instrument keys, in watchlist order.
    pub fn keys(&self) -> Vec<InstrumentKey> {
        self.items.iter().map(|w| w.key.clone()).collect()
    }

    /// Add `instrument` if no entry has its symbol, remove that entry
    /// otherwise. Returns whether the instrument is starred afterwards.
    ///
    /// The in-memory list only changes once the file write succeeded.
    pub fn toggle(&mut self, instrument: Instrument) -> PersistenceResult<bool> {
        let mut next = self.items.clone();
        let starred = if let Some(pos) = next.iter().position(|w| w.same_symbol(&instrument)) {
            next.remove(pos);
            false
        } else {
            next.push(instrument);
            true
        };

        write_atomic(&self.path, &next)?;
        self.items = next;
        debug!(starred, count = self.items.len(), "Watchlist toggled");
        Ok(starred)
    }
}

fn write_atomic(path: &Path, items: &[Instrument]) -> PersistenceResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut file, items)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
