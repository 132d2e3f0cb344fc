use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::StateLayout;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("task '{name}' is already running{}", holder_label(.holder))]
    Busy { name: String, holder: Option<u32> },
    #[error("failed to access task lock {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Named lock held for the whole duration of a task. Exclusion comes from
/// `flock(LOCK_EX | LOCK_NB)` on `<state_root>/locks/<name>.lock`, so it
/// spans worker processes and the kernel drops it when the holder exits.
/// The file carries the holder pid for diagnostics only; it is truncated on
/// release and never deleted.
#[derive(Debug)]
pub struct TaskLock {
    name: String,
    path: PathBuf,
    file: File,
}

impl TaskLock {
    pub fn acquire(layout: &StateLayout, name: &str) -> Result<Self, LockError> {
        let dir = layout.locks_dir();
        fs::create_dir_all(&dir).map_err(|source| LockError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = layout.lock_path(name);
        let io_error = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        if !try_flock_exclusive(&file).map_err(io_error)? {
            return Err(LockError::Busy {
                name: name.to_string(),
                holder: read_holder(&path)?,
            });
        }

        // A failed pid write drops `file`, which releases the flock again.
        file.set_len(0).map_err(io_error)?;
        file.write_all(format!("{}\n", std::process::id()).as_bytes())
            .and_then(|()| file.flush())
            .map_err(io_error)?;

        debug!(lock = name, "task lock acquired");
        Ok(Self {
            name: name.to_string(),
            path,
            file,
        })
    }

    /// Pid recorded by the current holder, or `None` when nobody holds the
    /// lock. A pid left behind by an exited process is not reported.
    pub fn holder(layout: &StateLayout, name: &str) -> Result<Option<u32>, LockError> {
        let path = layout.lock_path(name);
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LockError::Io { path, source }),
        };
        let free = try_flock_exclusive(&file).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;
        if free {
            return Ok(None);
        }
        read_holder(&path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TaskLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.set_len(0) {
            warn!(lock = %self.name, error = %err, "failed to clear task lock holder");
        }
        debug!(lock = %self.name, "task lock released");
    }
}

fn read_holder(path: &Path) -> Result<Option<u32>, LockError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw.trim().parse::<u32>().ok()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Non-blocking exclusive flock. `Ok(false)` means another open file
/// description holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

fn holder_label(holder: &Option<u32>) -> String {
    holder
        .map(|pid| format!(" (pid {pid})"))
        .unwrap_or_default()
}
