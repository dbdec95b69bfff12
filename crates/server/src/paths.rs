//! Central path resolution for relaydeck data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `RELAYDECK_DATA_DIR` env > `~/.relaydeck`.
//! Callsites receive the resolved `DataPaths` instead of constructing paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Priority: `explicit` arg > `~/.relaydeck` default.
    ///
    /// Clap already folds `RELAYDECK_DATA_DIR` into `explicit`.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let root = match explicit {
            Some(p) => p.to_path_buf(),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("HOME directory not found"))?
                .join(".relaydeck"),
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join("attachments")
    }

    /// Create all required subdirectories under the data dir.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.attachments_dir())?;
        Ok(())
    }
}

/// Default location of the assistant's per-project transcript logs.
pub fn default_transcript_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins_and_subdirs_are_created() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = DataPaths::resolve(Some(tmp.path())).expect("resolve");
        paths.ensure_dirs().expect("ensure dirs");

        assert_eq!(paths.root(), tmp.path());
        assert!(paths.log_dir().is_dir());
        assert!(paths.attachments_dir().is_dir());
    }
}
