//! Resolution of the on-disk layout used by the gateway.
//!
//! Everything the agent writes (session store, knowledge index, scripts,
//! generated audio) lives under one scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Settings;

/// Absolute paths derived from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub base_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub knowledge_db: PathBuf,
    pub session_db: PathBuf,
    pub python_dir: PathBuf,
    pub audio_dir: PathBuf,
}

impl WorkspacePaths {
    /// Resolve paths against the current working directory.
    pub fn resolve(settings: &Settings) -> io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::resolve_from(&cwd, settings))
    }

    /// Resolve paths against an explicit working directory.
    pub fn resolve_from(cwd: &Path, settings: &Settings) -> Self {
        let base_dir = match settings.paths.base_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => join_relative(cwd, dir),
            _ => cwd.to_path_buf(),
        };
        let tmp_dir = join_relative(&base_dir, &settings.paths.tmp_dir);

        Self {
            knowledge_db: join_relative(&tmp_dir, &settings.knowledge.db_file),
            session_db: join_relative(&tmp_dir, &settings.storage.db_file),
            python_dir: join_relative(&tmp_dir, &settings.tools.python.base_dir),
            audio_dir: join_relative(&tmp_dir, &settings.tools.speech.target_directory),
            base_dir,
            tmp_dir,
        }
    }

    /// Create the scratch directory and the tool directories under it.
    ///
    /// Safe to call repeatedly.
    pub fn ensure(&self) -> io::Result<()> {
        ensure_dir(&self.tmp_dir)?;
        ensure_dir(&self.python_dir)?;
        ensure_dir(&self.audio_dir)?;
        for db in [&self.knowledge_db, &self.session_db] {
            if let Some(parent) = db.parent() {
                ensure_dir(parent)?;
            }
        }
        Ok(())
    }
}

/// Create a directory and its parents; an existing directory is not an error.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    tracing::debug!(path = %path.display(), "created directory");
    Ok(())
}

fn join_relative(base: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
