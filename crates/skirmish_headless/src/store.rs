//! File-backed snapshot store.
//!
//! One file per snapshot in a directory, encoded as RON (human-readable,
//! diffable) or JSON (for external tooling).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use skirmish_core::error::{GameError, Result};
use skirmish_core::snapshot::{SnapshotPort, WorldSnapshot};

/// On-disk encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SnapshotFormat {
    /// `.ron` files.
    #[default]
    Ron,
    /// `.json` files.
    Json,
}

impl SnapshotFormat {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Ron => "ron",
            Self::Json => "json",
        }
    }

    fn encode(self, snapshot: &WorldSnapshot) -> Result<String> {
        match self {
            Self::Ron => ron::ser::to_string_pretty(snapshot, ron::ser::PrettyConfig::default())
                .map_err(|e| GameError::SnapshotEncoding(e.to_string())),
            Self::Json => serde_json::to_string_pretty(snapshot)
                .map_err(|e| GameError::SnapshotEncoding(e.to_string())),
        }
    }

    fn decode(self, text: &str) -> Result<WorldSnapshot> {
        match self {
            Self::Ron => ron::from_str(text).map_err(|e| GameError::SnapshotEncoding(e.to_string())),
            Self::Json => {
                serde_json::from_str(text).map_err(|e| GameError::SnapshotEncoding(e.to_string()))
            }
        }
    }
}

/// Snapshots stored as files under one directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    format: SnapshotFormat,
}

impl FileSnapshotStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>, format: SnapshotFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
        Ok(Self { dir, format })
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(GameError::InvalidState(format!(
                "snapshot name {name:?} must be alphanumeric, '_' or '-'"
            )));
        }
        Ok(self.dir.join(format!("{name}.{}", self.format.extension())))
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> GameError {
    GameError::InvalidState(format!("{}: {err}", path.display()))
}

impl SnapshotPort for FileSnapshotStore {
    fn save(&mut self, name: &str, snapshot: &WorldSnapshot) -> Result<()> {
        let path = self.path_for(name)?;
        let text = self.format.encode(snapshot)?;
        fs::write(&path, text).map_err(|e| io_error(&path, &e))?;
        debug!(path = %path.display(), tick = snapshot.tick, "Snapshot written");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<WorldSnapshot> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(GameError::SnapshotNotFound(name.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|e| io_error(&path, &e))?;
        self.format.decode(&text)
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, &e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.dir, &e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(self.format.extension()) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
