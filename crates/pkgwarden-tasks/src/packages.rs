use pkgwarden_core::{
    current_unix_timestamp, ControlCatalogue, PackageDefinition, PackageRecord, ServiceRecord,
};
use pkgwarden_native::{BackendError, NativeBackend, ServiceManager};
use pkgwarden_store::Store;
use tracing::{debug, info};

use crate::progress::Reporter;
use crate::{ProgressSink, SyncError, TaskKind};

/// Rebuilds the record of one control package from its catalogue
/// definition and what the host currently reports. Missing package info is
/// not an error; the record just carries none.
pub fn refresh_package<B>(
    backend: &B,
    services: &dyn ServiceManager,
    key: &str,
    definition: &PackageDefinition,
) -> Result<PackageRecord, BackendError>
where
    B: NativeBackend + ?Sized,
{
    let installed = backend.is_installed(key)?;
    let info = match backend.info(key) {
        Ok(summary) => Some(summary),
        Err(err) => {
            debug!(package = key, error = %err, "no package info available");
            None
        }
    };

    let services = definition
        .services
        .iter()
        .enumerate()
        .map(|(position, name)| ServiceRecord {
            name: name.clone(),
            enabled: services.is_enabled(name),
            active: services.is_active(name),
            failed: services.is_failed(name),
            position: position as u32,
        })
        .collect();

    Ok(PackageRecord {
        key: key.to_string(),
        name: definition.name.clone(),
        config_path: definition.config_path.clone(),
        endpoint: definition.endpoint.clone(),
        installed,
        info,
        control_services_restart: definition.control_services_restart,
        services,
        refreshed_at_unix: current_unix_timestamp(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub refreshed: Vec<String>,
    pub removed: Vec<String>,
}

/// Brings the stored package records in line with the catalogue: every
/// declared package is refreshed and records whose key left the catalogue
/// are dropped. Nothing is written unless every package could be inspected.
pub fn sync_packages<B, S>(
    backend: &B,
    services: &dyn ServiceManager,
    store: &S,
    catalogue: &ControlCatalogue,
    progress: &dyn ProgressSink,
) -> Result<SyncOutcome, SyncError>
where
    B: NativeBackend + ?Sized,
    S: Store,
{
    let reporter = Reporter::new(progress, TaskKind::Sync);
    reporter.bracket(|reporter| {
        let total = catalogue.len() as u64;
        let mut records = Vec::with_capacity(catalogue.len());
        for (index, (key, definition)) in catalogue.iter().enumerate() {
            reporter.progress(total, index as u64, &definition.name, Some(key.as_str()));
            let record = refresh_package(backend, services, key, definition).map_err(|source| {
                SyncError::Package {
                    key: key.clone(),
                    source,
                }
            })?;
            records.push(record);
        }

        let keep = catalogue.keys();
        let outcome = store.update(|state| -> Result<SyncOutcome, SyncError> {
            let refreshed = records.iter().map(|record| record.key.clone()).collect();
            for record in records {
                state.upsert_package(record);
            }
            let removed = state.retain_packages(&keep);
            Ok(SyncOutcome { refreshed, removed })
        })?;

        for key in &outcome.removed {
            info!(package = %key, "removed package record no longer in the catalogue");
        }
        reporter.progress(total, total, "Package records synchronized", None);
        Ok(outcome)
    })
}
