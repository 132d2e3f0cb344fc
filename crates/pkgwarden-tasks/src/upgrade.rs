use pkgwarden_core::ControlCatalogue;
use pkgwarden_native::{NativeBackend, ServiceManager, UpgradeOptions};
use pkgwarden_store::Store;
use tracing::{info, warn};

use crate::progress::Reporter;
use crate::{refresh_package, ProgressSink, TaskKind, UpgradeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRestart {
    pub service: String,
    pub restarted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    NothingPending,
    Completed {
        update_set_id: u64,
        upgraded: Vec<String>,
        restarts: Vec<ServiceRestart>,
    },
}

impl UpgradeOutcome {
    pub fn failed_restarts(&self) -> impl Iterator<Item = &ServiceRestart> {
        let restarts = match self {
            Self::NothingPending => &[][..],
            Self::Completed { restarts, .. } => restarts.as_slice(),
        };
        restarts.iter().filter(|restart| !restart.restarted)
    }
}

/// Applies the active update set one package at a time. Services of
/// packages that defer their restart are restarted once, after the whole
/// set went through.
pub struct UpgradeExecutor<'a, B: ?Sized, S> {
    backend: &'a B,
    store: &'a S,
    services: &'a dyn ServiceManager,
    progress: &'a dyn ProgressSink,
}

impl<'a, B, S> UpgradeExecutor<'a, B, S>
where
    B: NativeBackend + ?Sized,
    S: Store,
{
    pub fn new(
        backend: &'a B,
        store: &'a S,
        services: &'a dyn ServiceManager,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            backend,
            store,
            services,
            progress,
        }
    }

    /// A failure stops the run and leaves the set pending; items upgraded so
    /// far stay marked as updated.
    pub fn run(&self, catalogue: &ControlCatalogue) -> Result<UpgradeOutcome, UpgradeError> {
        let reporter = Reporter::new(self.progress, TaskKind::Upgrade);
        reporter.bracket(|reporter| self.apply_active_set(reporter, catalogue))
    }

    fn apply_active_set(
        &self,
        reporter: &Reporter<'_>,
        catalogue: &ControlCatalogue,
    ) -> Result<UpgradeOutcome, UpgradeError> {
        reporter.refreshing_catalogue();
        self.backend
            .refresh_catalogue()
            .map_err(UpgradeError::Catalogue)?;
        reporter.catalogue_refreshed();

        let state = self.store.read()?;
        let Some(set) = state.active_update_set().cloned() else {
            info!("no pending update set");
            return Ok(UpgradeOutcome::NothingPending);
        };

        let total = set.packages.len() as u64;
        let mut upgraded = Vec::with_capacity(set.packages.len());
        let mut deferred_services: Vec<String> = Vec::new();
        for (index, item) in set.packages.iter().enumerate() {
            let key = item.package_key.as_str();
            let unknown = || UpgradeError::UnknownPackage {
                update_set_id: set.id,
                key: key.to_string(),
            };
            let record = state.package(key).ok_or_else(unknown)?;
            let definition = catalogue.get(key).ok_or_else(unknown)?;

            reporter.progress(total, index as u64, &record.name, Some(key));
            let options = if record.control_services_restart {
                UpgradeOptions::deferred_restart()
            } else {
                UpgradeOptions::default()
            };
            self.backend
                .upgrade(&[key.to_string()], options)
                .map_err(|source| UpgradeError::Package {
                    key: key.to_string(),
                    source,
                })?;
            if options.defer_service_restart {
                deferred_services.extend(record.service_names().map(str::to_string));
            }

            let refreshed = refresh_package(self.backend, self.services, key, definition)
                .map_err(|source| UpgradeError::Package {
                    key: key.to_string(),
                    source,
                })?;
            self.store.update(|state| -> Result<(), UpgradeError> {
                state.upsert_package(refreshed);
                if let Some(entry) = state
                    .update_set_mut(set.id)
                    .and_then(|stored| stored.packages.get_mut(index))
                {
                    entry.updated = true;
                }
                Ok(())
            })?;

            info!(package = key, to = %item.to_version, "package upgraded");
            upgraded.push(key.to_string());
            reporter.progress(total, index as u64 + 1, &record.name, Some(key));
        }

        self.store.update(|state| -> Result<(), UpgradeError> {
            if let Some(stored) = state.update_set_mut(set.id) {
                stored.mark_done();
            }
            Ok(())
        })?;
        info!(update_set_id = set.id, packages = upgraded.len(), "update set done");

        let restarts = self.restart_deferred(reporter, total, deferred_services);
        Ok(UpgradeOutcome::Completed {
            update_set_id: set.id,
            upgraded,
            restarts,
        })
    }

    fn restart_deferred(
        &self,
        reporter: &Reporter<'_>,
        total: u64,
        services: Vec<String>,
    ) -> Vec<ServiceRestart> {
        let mut restarts: Vec<ServiceRestart> = Vec::new();
        for service in services {
            if restarts.iter().any(|done| done.service == service) {
                continue;
            }
            let restarted = self.services.restart(&service);
            if !restarted {
                warn!(service = %service, "service restart failed");
                reporter.progress(
                    total,
                    total,
                    format!("Failed to restart service {service}"),
                    Some(service.as_str()),
                );
            }
            restarts.push(ServiceRestart { service, restarted });
        }
        restarts
    }
}
