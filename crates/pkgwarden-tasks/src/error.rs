use std::error::Error as StdError;

use pkgwarden_native::BackendError;
use pkgwarden_store::{LockError, StoreError};
use thiserror::Error;

use crate::{InstallAction, TaskKind};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to refresh the package catalogue")]
    Catalogue(#[source] BackendError),
    #[error("failed to list upgradable packages")]
    Upgradable(#[source] BackendError),
    #[error("failed to fingerprint the upgradable package list")]
    Fingerprint(#[source] serde_json::Error),
    #[error("control package '{key}' has no package record; sync packages first")]
    UnknownPackage { key: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("failed to refresh the package catalogue")]
    Catalogue(#[source] BackendError),
    #[error("update set {update_set_id} references unknown package '{key}'")]
    UnknownPackage { update_set_id: u64, key: String },
    #[error("failed to upgrade '{key}'")]
    Package {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to refresh the package catalogue")]
    Catalogue(#[source] BackendError),
    #[error("'{name}' is not in allowed packages")]
    NotAllowed { name: String },
    #[error("failed to {action} '{name}'")]
    Package {
        name: String,
        action: InstallAction,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to inspect package '{key}'")]
    Package {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Anything a locked task invocation can fail with.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(
        "cannot start {task}: the package manager is in use by another task{}",
        holder_label(.holder)
    )]
    PackageManagerBusy { task: TaskKind, holder: Option<u32> },
    #[error("failed to load the control package catalogue")]
    Catalogue(#[source] anyhow::Error),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl TaskError {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Lock(LockError::Busy { .. }) | Self::PackageManagerBusy { .. }
        )
    }
}

/// Joins an error and all of its sources with `": "`.
pub fn render_error_chain<E: StdError + ?Sized>(err: &E) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn holder_label(holder: &Option<u32>) -> String {
    holder
        .map(|pid| format!(" (pid {pid})"))
        .unwrap_or_default()
}
