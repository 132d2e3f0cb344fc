use std::collections::BTreeSet;

use pkgwarden_core::{current_unix_timestamp, update_set_fingerprint, PackageUpdate};
use pkgwarden_native::NativeBackend;
use pkgwarden_store::Store;
use tracing::{debug, info};

use crate::progress::Reporter;
use crate::{ProgressSink, RefreshError, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// No control package is upgradable; the store was not touched.
    NoControlUpdates,
    /// The pending set already matches the upgradable list.
    Unchanged { update_set_id: u64 },
    /// A done or canceled set with the same fingerprint is pending again.
    Reactivated { update_set_id: u64 },
    Created { update_set_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    /// Pending sets canceled because the upgradable list changed.
    pub superseded: Vec<u64>,
}

impl RefreshOutcome {
    pub fn update_set_id(&self) -> Option<u64> {
        match self.status {
            RefreshStatus::NoControlUpdates => None,
            RefreshStatus::Unchanged { update_set_id }
            | RefreshStatus::Reactivated { update_set_id }
            | RefreshStatus::Created { update_set_id } => Some(update_set_id),
        }
    }
}

/// Keeps at most one pending update set that reflects what the native
/// backend currently reports as upgradable.
pub struct UpdateSetTracker<'a, B: ?Sized, S> {
    backend: &'a B,
    store: &'a S,
    progress: &'a dyn ProgressSink,
}

impl<'a, B, S> UpdateSetTracker<'a, B, S>
where
    B: NativeBackend + ?Sized,
    S: Store,
{
    pub fn new(backend: &'a B, store: &'a S, progress: &'a dyn ProgressSink) -> Self {
        Self {
            backend,
            store,
            progress,
        }
    }

    /// Refreshes the backend catalogue and reconciles the stored update sets
    /// with the upgradable list. The fingerprint covers every upgradable
    /// package, while the created set only lists control packages. All
    /// store changes land in a single write.
    pub fn refresh(&self, control_keys: &BTreeSet<String>) -> Result<RefreshOutcome, RefreshError> {
        let reporter = Reporter::new(self.progress, TaskKind::Refresh);
        reporter.bracket(|reporter| self.reconcile(reporter, control_keys))
    }

    fn reconcile(
        &self,
        reporter: &Reporter<'_>,
        control_keys: &BTreeSet<String>,
    ) -> Result<RefreshOutcome, RefreshError> {
        reporter.refreshing_catalogue();
        self.backend
            .refresh_catalogue()
            .map_err(RefreshError::Catalogue)?;
        reporter.catalogue_refreshed();

        let upgradable = self
            .backend
            .list_upgradable()
            .map_err(RefreshError::Upgradable)?;
        let controlled = upgradable
            .iter()
            .filter(|info| control_keys.contains(&info.name))
            .collect::<Vec<_>>();
        if controlled.is_empty() {
            debug!(upgradable = upgradable.len(), "no control package is upgradable");
            return Ok(RefreshOutcome {
                status: RefreshStatus::NoControlUpdates,
                superseded: Vec::new(),
            });
        }

        let fingerprint = update_set_fingerprint(&upgradable).map_err(RefreshError::Fingerprint)?;
        let mut state = self.store.read()?;

        // Validate before mutating so a failure leaves the store as it was.
        let packages = controlled
            .iter()
            .map(|info| {
                if state.package(&info.name).is_none() {
                    return Err(RefreshError::UnknownPackage {
                        key: info.name.clone(),
                    });
                }
                Ok(PackageUpdate {
                    package_key: info.name.clone(),
                    from_version: info.from_version.clone(),
                    to_version: info.to_version.clone(),
                    updated: false,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let superseded = state.cancel_pending_except(&fingerprint);
        let status = match state.update_set_by_fingerprint_mut(&fingerprint) {
            Some(set) => {
                let update_set_id = set.id;
                if set.reactivate() {
                    RefreshStatus::Reactivated { update_set_id }
                } else {
                    RefreshStatus::Unchanged { update_set_id }
                }
            }
            None => RefreshStatus::Created {
                update_set_id: state.create_update_set(
                    &fingerprint,
                    packages,
                    current_unix_timestamp(),
                ),
            },
        };

        let unchanged = matches!(status, RefreshStatus::Unchanged { .. });
        if !(unchanged && superseded.is_empty()) {
            self.store.write(&state)?;
        }

        let total = controlled.len() as u64;
        match status {
            RefreshStatus::Created { update_set_id } => {
                info!(update_set_id, packages = total, superseded = ?superseded, "created update set")
            }
            RefreshStatus::Reactivated { update_set_id } => {
                info!(update_set_id, superseded = ?superseded, "reactivated update set")
            }
            _ => debug!(?status, "update set already current"),
        }
        reporter.progress(total, total, format!("{total} control package update(s) available"), None);

        Ok(RefreshOutcome { status, superseded })
    }
}
