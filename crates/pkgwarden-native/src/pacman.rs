use std::collections::BTreeMap;
use std::process::Command;
use std::sync::{Arc, LazyLock};

use pkgwarden_core::{PackageSummary, UpgradableInfo};
use regex::Regex;

use crate::backend::{field, parse_field_record};
use crate::command::{execute, execute_checked, execution_error};
use crate::{
    BackendError, BackendKind, CommandRunner, NativeBackend, UpgradeOptions, DEFER_RESTART_ENV,
};

// php-fpm 7.2.0-1 -> 7.2.0-2
// Entries pacman is told to ignore carry an "[ignored]" suffix and never match.
static UPGRADABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(\S+)\s+->\s+(\S+)$").expect("pacman upgradable pattern is valid")
});

/// Driver for the Pacman family.
#[derive(Clone)]
pub struct Pacman {
    runner: Arc<dyn CommandRunner>,
}

impl Pacman {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn pacman(&self, operation: &str) -> Command {
        let mut command = Command::new("pacman");
        command.arg("--noconfirm").arg(operation);
        command
    }

    fn query(&self, operation: &str) -> Result<String, BackendError> {
        let mut command = self.pacman(operation);
        Ok(execute_checked(self.runner.as_ref(), &mut command)?.stdout)
    }
}

impl NativeBackend for Pacman {
    fn kind(&self) -> BackendKind {
        BackendKind::Pacman
    }

    fn install(&self, names: &[String], needed: bool) -> Result<(), BackendError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut command = self.pacman("-S");
        if needed {
            command.arg("--needed");
        }
        command.args(names);
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn refresh_catalogue(&self) -> Result<(), BackendError> {
        let mut command = self.pacman("-Sy");
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn upgrade(&self, names: &[String], options: UpgradeOptions) -> Result<(), BackendError> {
        let mut command = if names.is_empty() {
            self.pacman("-Su")
        } else {
            let mut command = self.pacman("-S");
            command.args(names);
            command
        };
        if options.defer_service_restart {
            command.env(DEFER_RESTART_ENV, "yes");
        }
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn remove(&self, names: &[String], purge: bool) -> Result<(), BackendError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut command = self.pacman(if purge { "-Rcn" } else { "-Rc" });
        command.args(names);
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn list_upgradable(&self) -> Result<Vec<UpgradableInfo>, BackendError> {
        let mut command = self.pacman("-Qu");
        let output = execute(self.runner.as_ref(), &mut command)?;
        if !output.success() {
            // -Qu exits 1 without output when nothing is upgradable
            if output.code == Some(1) && output.stderr.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(execution_error(&command, &output).into());
        }
        Ok(parse_upgradable(&output.stdout))
    }

    fn list_all(&self) -> Result<Vec<PackageSummary>, BackendError> {
        let installed = parse_installed(&self.query("-Q")?);
        let available = parse_available(&self.query("-Sl")?);

        let mut merged = BTreeMap::new();
        for summary in available {
            merged.insert(summary.name.clone(), summary);
        }
        for summary in installed {
            merged.insert(summary.name.clone(), summary);
        }
        Ok(merged.into_values().collect())
    }

    fn list_installed(&self) -> Result<Vec<PackageSummary>, BackendError> {
        Ok(parse_installed(&self.query("-Q")?))
    }

    fn list_available(&self) -> Result<Vec<PackageSummary>, BackendError> {
        Ok(parse_available(&self.query("-Sl")?))
    }

    fn info(&self, name: &str) -> Result<PackageSummary, BackendError> {
        let operation = if self.is_installed(name)? { "-Qi" } else { "-Si" };
        let mut command = self.pacman(operation);
        command.arg(name);
        let output = execute(self.runner.as_ref(), &mut command)?;
        if !output.success() {
            if output.stderr.contains("was not found") {
                return Err(BackendError::NotFound(name.to_string()));
            }
            return Err(execution_error(&command, &output).into());
        }
        parse_info(&output.stdout).ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn is_installed(&self, name: &str) -> Result<bool, BackendError> {
        let mut command = self.pacman("-Q");
        command.arg(name);
        Ok(execute(self.runner.as_ref(), &mut command)?.success())
    }
}

pub(crate) fn parse_upgradable(stdout: &str) -> Vec<UpgradableInfo> {
    stdout
        .lines()
        .filter_map(|line| UPGRADABLE_LINE.captures(line.trim()))
        .map(|caps| UpgradableInfo::new(&caps[1], &caps[2], &caps[3]))
        .collect()
}

// "name version"
pub(crate) fn parse_installed(stdout: &str) -> Vec<PackageSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = parts.next()?;
            Some(PackageSummary::new(name, version))
        })
        .collect()
}

// "repo name version [installed]"
pub(crate) fn parse_available(stdout: &str) -> Vec<PackageSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let _repo = parts.next()?;
            let name = parts.next()?;
            let version = parts.next()?;
            Some(PackageSummary::new(name, version))
        })
        .collect()
}

pub(crate) fn parse_info(stdout: &str) -> Option<PackageSummary> {
    let fields = parse_field_record(stdout);
    let name = field(&fields, "Name")?;
    let version = field(&fields, "Version")?;
    Some(PackageSummary {
        name: name.to_string(),
        version: version.to_string(),
        description: field(&fields, "Description").map(str::to_string),
        installed_size: field(&fields, "Installed Size").map(str::to_string),
    })
}
