use std::collections::BTreeMap;

use pkgwarden_core::{CatalogueSource, ControlCatalogue};
use pkgwarden_native::{NativeBackend, ServiceManager};
use pkgwarden_store::{LockError, StateLayout, Store, TaskLock};
use tracing::debug;

use crate::progress::Reporter;
use crate::{
    sync_packages, InstallExecutor, InstallOutcome, ProgressSink, RefreshOutcome, SyncOutcome,
    TaskError, TaskKind, UpdateSetTracker, UpgradeExecutor, UpgradeOutcome,
};

/// Lock shared by every task that drives the native package manager.
pub const PACKAGE_MANAGER_LOCK: &str = "package-manager";

/// Entry point for task invocations. Each call claims its task lock and the
/// shared package manager lock, so a second invocation of a running task
/// fails with a busy error instead of queueing. The catalogue is loaded
/// fresh for every call.
pub struct TaskRunner<B, S, C> {
    layout: StateLayout,
    backend: B,
    store: S,
    catalogue: C,
    services: Box<dyn ServiceManager>,
    progress: Box<dyn ProgressSink>,
}

struct TaskGuard {
    _task: TaskLock,
    _package_manager: TaskLock,
}

impl<B, S, C> TaskRunner<B, S, C>
where
    B: NativeBackend,
    S: Store,
    C: CatalogueSource,
{
    pub fn new(
        layout: StateLayout,
        backend: B,
        store: S,
        catalogue: C,
        services: Box<dyn ServiceManager>,
        progress: Box<dyn ProgressSink>,
    ) -> Self {
        Self {
            layout,
            backend,
            store,
            catalogue,
            services,
            progress,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn services(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn control_catalogue(&self) -> Result<ControlCatalogue, TaskError> {
        self.catalogue
            .control_packages()
            .map_err(TaskError::Catalogue)
    }

    pub fn refresh(&self) -> Result<RefreshOutcome, TaskError> {
        let _guard = self.lock(TaskKind::Refresh)?;
        let catalogue = self.task_catalogue(TaskKind::Refresh)?;
        let tracker = UpdateSetTracker::new(&self.backend, &self.store, self.progress.as_ref());
        Ok(tracker.refresh(&catalogue.keys())?)
    }

    pub fn upgrade(&self) -> Result<UpgradeOutcome, TaskError> {
        let _guard = self.lock(TaskKind::Upgrade)?;
        let catalogue = self.task_catalogue(TaskKind::Upgrade)?;
        let executor = UpgradeExecutor::new(
            &self.backend,
            &self.store,
            self.services.as_ref(),
            self.progress.as_ref(),
        );
        Ok(executor.run(&catalogue)?)
    }

    pub fn install(
        &self,
        old: &BTreeMap<String, bool>,
        new: &BTreeMap<String, bool>,
    ) -> Result<InstallOutcome, TaskError> {
        let _guard = self.lock(TaskKind::Install)?;
        let catalogue = self.task_catalogue(TaskKind::Install)?;
        let executor = InstallExecutor::new(
            &self.backend,
            &self.store,
            self.services.as_ref(),
            self.progress.as_ref(),
        );
        Ok(executor.apply(old, new, &catalogue)?)
    }

    pub fn sync(&self) -> Result<SyncOutcome, TaskError> {
        let _guard = self.lock(TaskKind::Sync)?;
        let catalogue = self.task_catalogue(TaskKind::Sync)?;
        Ok(sync_packages(
            &self.backend,
            self.services.as_ref(),
            &self.store,
            &catalogue,
            self.progress.as_ref(),
        )?)
    }

    /// Catalogue for a task that already holds its locks. A load failure
    /// still closes the task for progress observers.
    fn task_catalogue(&self, kind: TaskKind) -> Result<ControlCatalogue, TaskError> {
        self.control_catalogue().inspect_err(|err| {
            Reporter::new(self.progress.as_ref(), kind).fail(err);
        })
    }

    fn lock(&self, kind: TaskKind) -> Result<TaskGuard, TaskError> {
        let task = TaskLock::acquire(&self.layout, kind.lock_name())?;
        let package_manager =
            TaskLock::acquire(&self.layout, PACKAGE_MANAGER_LOCK).map_err(|err| match err {
                LockError::Busy { holder, .. } => {
                    TaskError::PackageManagerBusy { task: kind, holder }
                }
                other => TaskError::Lock(other),
            })?;
        debug!(task = %kind, "task locks held");
        Ok(TaskGuard {
            _task: task,
            _package_manager: package_manager,
        })
    }
}
