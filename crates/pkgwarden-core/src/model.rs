use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One upgradable package as reported by a native backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpgradableInfo {
    pub name: String,
    pub from_version: String,
    pub to_version: String,
}

impl UpgradableInfo {
    pub fn new(
        name: impl Into<String>,
        from_version: impl Into<String>,
        to_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_version: from_version.into(),
            to_version: to_version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub installed_size: Option<String>,
}

impl PackageSummary {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            installed_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub failed: bool,
    pub position: u32,
}

/// A control package as last observed on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub installed: bool,
    #[serde(default)]
    pub info: Option<PackageSummary>,
    #[serde(default)]
    pub control_services_restart: bool,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    pub refreshed_at_unix: u64,
}

impl PackageRecord {
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUpdate {
    pub package_key: String,
    pub from_version: String,
    pub to_version: String,
    #[serde(default)]
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSetState {
    Pending,
    Done,
    Canceled,
}

impl UpdateSetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Canceled => "canceled",
        }
    }
}

/// Snapshot of the control packages that were upgradable when the set was
/// created. At most one set in a store is pending at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSet {
    pub id: u64,
    pub fingerprint: String,
    pub done: bool,
    pub canceled: bool,
    pub created_at_unix: u64,
    #[serde(default)]
    pub packages: Vec<PackageUpdate>,
}

impl UpdateSet {
    pub fn new(id: u64, fingerprint: impl Into<String>, created_at_unix: u64) -> Self {
        Self {
            id,
            fingerprint: fingerprint.into(),
            done: false,
            canceled: false,
            created_at_unix,
            packages: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.done && !self.canceled
    }

    pub fn state(&self) -> UpdateSetState {
        if self.canceled {
            UpdateSetState::Canceled
        } else if self.done {
            UpdateSetState::Done
        } else {
            UpdateSetState::Pending
        }
    }

    /// Cancels a pending set. Done and already canceled sets are left alone.
    pub fn cancel(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.canceled = true;
        true
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Returns the set to pending; reports whether anything changed. A set
    /// that comes back is applied from scratch, so its item flags reset.
    pub fn reactivate(&mut self) -> bool {
        let changed = self.done || self.canceled;
        if changed {
            for item in &mut self.packages {
                item.updated = false;
            }
        }
        self.done = false;
        self.canceled = false;
        changed
    }

    pub fn package_keys(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|update| update.package_key.as_str())
    }
}

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
