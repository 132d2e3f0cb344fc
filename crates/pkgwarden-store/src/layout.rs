use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_ROOT: &str = "/var/lib/pkgwarden";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn state_tmp_path(&self) -> PathBuf {
        self.root.join("state.json.tmp")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("{name}.lock"))
    }

    pub fn ensure_base_dirs(&self) -> io::Result<()> {
        for dir in [self.root.clone(), self.locks_dir()] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for StateLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_ROOT)
    }
}
