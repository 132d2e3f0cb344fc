use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{StateDocument, StateLayout};

const STATE_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access state file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse state file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize state")]
    Serialize(#[source] serde_json::Error),
    #[error("unsupported state file version {version}: {}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("state store lock was poisoned")]
    Poisoned,
}

/// Transactional record store. `update` reads a snapshot, lets the closure
/// mutate it and writes it back only when the closure succeeds.
pub trait Store {
    fn read(&self) -> Result<StateDocument, StoreError>;

    fn write(&self, state: &StateDocument) -> Result<(), StoreError>;

    fn update<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut StateDocument) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self.read()?;
        let value = apply(&mut state)?;
        self.write(&state)?;
        Ok(value)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(flatten)]
    state: StateDocument,
}

/// JSON document at `<state_root>/state.json`, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileStore {
    layout: StateLayout,
}

impl FileStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }
}

impl Store for FileStore {
    fn read(&self) -> Result<StateDocument, StoreError> {
        let path = self.layout.state_file_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(StateDocument::default())
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let file: StateFile =
            serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?;
        if file.version != STATE_FILE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path,
                version: file.version,
            });
        }
        Ok(file.state)
    }

    fn write(&self, state: &StateDocument) -> Result<(), StoreError> {
        let root = self.layout.root().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io { path: root, source })?;

        let file = StateFile {
            version: STATE_FILE_VERSION,
            state: state.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(StoreError::Serialize)?;

        let tmp_path = self.layout.state_tmp_path();
        fs::write(&tmp_path, content).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        let path = self.layout.state_file_path();
        fs::rename(&tmp_path, &path).map_err(|source| StoreError::Io { path, source })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StateDocument>,
}

impl MemoryStore {
    pub fn new(state: StateDocument) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl Store for MemoryStore {
    fn read(&self) -> Result<StateDocument, StoreError> {
        Ok(self.state.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn write(&self, state: &StateDocument) -> Result<(), StoreError> {
        *self.state.lock().map_err(|_| StoreError::Poisoned)? = state.clone();
        Ok(())
    }
}
