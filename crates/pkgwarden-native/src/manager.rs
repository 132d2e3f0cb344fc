use std::io;
use std::process::Command;
use std::sync::Arc;

use pkgwarden_core::{PackageSummary, UpgradableInfo};
use tracing::info;

use crate::command::describe_command;
use crate::{
    Apt, BackendError, BackendKind, CommandRunner, NativeBackend, Pacman, SystemRunner,
    UpgradeOptions,
};

/// The host's native package manager, chosen once at startup.
#[derive(Clone)]
pub enum PackageManager {
    Apt(Apt),
    Pacman(Pacman),
}

impl PackageManager {
    pub fn detect() -> Result<Self, BackendError> {
        Self::detect_with(Arc::new(SystemRunner))
    }

    /// Checks for `pacman`. A missing binary selects APT; any other check
    /// failure means the host is unsupported and is returned as an error.
    pub fn detect_with(runner: Arc<dyn CommandRunner>) -> Result<Self, BackendError> {
        let mut version_check = Command::new("pacman");
        version_check.arg("--version");

        let manager = match runner.run(&mut version_check) {
            Ok(_) => Self::Pacman(Pacman::new(runner)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::Apt(Apt::new(runner)),
            Err(source) => {
                return Err(BackendError::Spawn {
                    command: describe_command(&version_check),
                    source,
                });
            }
        };
        info!(backend = %manager.kind(), "selected native package manager");
        Ok(manager)
    }

    fn native(&self) -> &dyn NativeBackend {
        match self {
            Self::Apt(backend) => backend,
            Self::Pacman(backend) => backend,
        }
    }
}

impl NativeBackend for PackageManager {
    fn kind(&self) -> BackendKind {
        self.native().kind()
    }

    fn install(&self, names: &[String], needed: bool) -> Result<(), BackendError> {
        self.native().install(names, needed)
    }

    fn refresh_catalogue(&self) -> Result<(), BackendError> {
        self.native().refresh_catalogue()
    }

    fn upgrade(&self, names: &[String], options: UpgradeOptions) -> Result<(), BackendError> {
        self.native().upgrade(names, options)
    }

    fn remove(&self, names: &[String], purge: bool) -> Result<(), BackendError> {
        self.native().remove(names, purge)
    }

    fn list_upgradable(&self) -> Result<Vec<UpgradableInfo>, BackendError> {
        self.native().list_upgradable()
    }

    fn list_all(&self) -> Result<Vec<PackageSummary>, BackendError> {
        self.native().list_all()
    }

    fn list_installed(&self) -> Result<Vec<PackageSummary>, BackendError> {
        self.native().list_installed()
    }

    fn list_available(&self) -> Result<Vec<PackageSummary>, BackendError> {
        self.native().list_available()
    }

    fn info(&self, name: &str) -> Result<PackageSummary, BackendError> {
        self.native().info(name)
    }

    fn is_installed(&self, name: &str) -> Result<bool, BackendError> {
        self.native().is_installed(name)
    }
}
