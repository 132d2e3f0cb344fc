use std::collections::BTreeMap;
use std::fmt;

use pkgwarden_core::ControlCatalogue;
use pkgwarden_native::{NativeBackend, ServiceManager};
use pkgwarden_store::Store;
use tracing::info;

use crate::progress::Reporter;
use crate::{refresh_package, InstallError, ProgressSink, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallAction {
    Install,
    Remove,
}

impl InstallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
        }
    }

    fn progress_message(&self, name: &str) -> String {
        match self {
            Self::Install => format!("Installing {name}"),
            Self::Remove => format!("Removing {name}"),
        }
    }
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
}

impl InstallOutcome {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.removed.is_empty()
    }
}

/// Names whose desired state differs between `old` and `new`, in name
/// order. A name absent from `old` counts as not installed; names only
/// present in `old` are left alone.
pub fn change_set(
    old: &BTreeMap<String, bool>,
    new: &BTreeMap<String, bool>,
) -> Vec<(String, InstallAction)> {
    new.iter()
        .filter(|(name, wanted)| old.get(*name).copied().unwrap_or(false) != **wanted)
        .map(|(name, wanted)| {
            let action = if *wanted {
                InstallAction::Install
            } else {
                InstallAction::Remove
            };
            (name.clone(), action)
        })
        .collect()
}

/// Installs and removes control packages so the host matches a desired
/// install map.
pub struct InstallExecutor<'a, B: ?Sized, S> {
    backend: &'a B,
    store: &'a S,
    services: &'a dyn ServiceManager,
    progress: &'a dyn ProgressSink,
}

impl<'a, B, S> InstallExecutor<'a, B, S>
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

    /// The whole change set is checked against the catalogue before any
    /// package is touched, so one disallowed name rejects the batch.
    pub fn apply(
        &self,
        old: &BTreeMap<String, bool>,
        new: &BTreeMap<String, bool>,
        catalogue: &ControlCatalogue,
    ) -> Result<InstallOutcome, InstallError> {
        let reporter = Reporter::new(self.progress, TaskKind::Install);
        reporter.bracket(|reporter| self.apply_changes(reporter, old, new, catalogue))
    }

    fn apply_changes(
        &self,
        reporter: &Reporter<'_>,
        old: &BTreeMap<String, bool>,
        new: &BTreeMap<String, bool>,
        catalogue: &ControlCatalogue,
    ) -> Result<InstallOutcome, InstallError> {
        reporter.refreshing_catalogue();
        self.backend
            .refresh_catalogue()
            .map_err(InstallError::Catalogue)?;
        reporter.catalogue_refreshed();

        let changes = change_set(old, new);
        if let Some((name, _)) = changes.iter().find(|(name, _)| !catalogue.contains(name)) {
            return Err(InstallError::NotAllowed { name: name.clone() });
        }

        let total = changes.len() as u64;
        let mut outcome = InstallOutcome::default();
        for (index, (name, action)) in changes.into_iter().enumerate() {
            let message = action.progress_message(&name);
            reporter.progress(total, index as u64, message.as_str(), Some(name.as_str()));

            let names = [name.clone()];
            let result = match action {
                InstallAction::Install => self.backend.install(&names, true),
                InstallAction::Remove => self.backend.remove(&names, false),
            };
            let package_error = |source| InstallError::Package {
                name: name.clone(),
                action,
                source,
            };
            result.map_err(package_error)?;

            if let Some(definition) = catalogue.get(&name) {
                let record = refresh_package(self.backend, self.services, &name, definition)
                    .map_err(package_error)?;
                self.store.update(|state| -> Result<(), InstallError> {
                    state.upsert_package(record);
                    Ok(())
                })?;
            }

            info!(package = %name, action = %action, "package state applied");
            reporter.progress(total, index as u64 + 1, message, Some(name.as_str()));
            match action {
                InstallAction::Install => outcome.installed.push(name),
                InstallAction::Remove => outcome.removed.push(name),
            }
        }
        Ok(outcome)
    }
}
