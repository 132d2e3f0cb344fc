use std::process::Command;
use std::sync::{Arc, LazyLock};

use pkgwarden_core::{PackageSummary, UpgradableInfo};
use regex::Regex;

use crate::backend::{field, parse_field_record};
use crate::command::{execute, execute_checked, execution_error};
use crate::{
    BackendError, BackendKind, CommandRunner, NativeBackend, UpgradeOptions, DEFER_RESTART_ENV,
};

// wget/focal-updates 1.20.3-1ubuntu2 amd64 [upgradable from: 1.20.3-1ubuntu1]
static UPGRADABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)/\S+\s+(\S+)\s+\S+\s+\[upgradable from: ([^\]\s]+)\]$")
        .expect("apt upgradable pattern is valid")
});

// wget/focal,now 1.20.3-1ubuntu1 amd64 [installed,automatic]
static INSTALLED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)/\S+\s+(\S+)\s+\S+\s+\[installed[^\]]*\]$")
        .expect("apt installed pattern is valid")
});

static LIST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)/\S+\s+(\S+)\s+\S+(?:\s+\[[^\]]*\])?$").expect("apt list pattern is valid")
});

/// Driver for the APT family (`apt` plus `dpkg` for install state).
#[derive(Clone)]
pub struct Apt {
    runner: Arc<dyn CommandRunner>,
}

impl Apt {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn apt(&self, verb: &str) -> Command {
        let mut command = Command::new("apt");
        command.arg(verb);
        command
    }

    fn apt_noninteractive(&self, verb: &str) -> Command {
        let mut command = Command::new("apt");
        command
            .env("DEBIAN_FRONTEND", "noninteractive")
            .arg("-yq")
            .arg(verb);
        command
    }

    fn list(&self, flag: &str) -> Result<String, BackendError> {
        let mut command = self.apt("list");
        command.arg(flag);
        Ok(execute_checked(self.runner.as_ref(), &mut command)?.stdout)
    }
}

impl NativeBackend for Apt {
    fn kind(&self) -> BackendKind {
        BackendKind::Apt
    }

    fn install(&self, names: &[String], _needed: bool) -> Result<(), BackendError> {
        if names.is_empty() {
            return Ok(());
        }
        // apt never reinstalls a satisfied package without --reinstall
        let mut command = self.apt_noninteractive("install");
        command.args(names);
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn refresh_catalogue(&self) -> Result<(), BackendError> {
        let mut command = self.apt_noninteractive("update");
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn upgrade(&self, names: &[String], options: UpgradeOptions) -> Result<(), BackendError> {
        let mut command = if names.is_empty() {
            self.apt_noninteractive("upgrade")
        } else {
            let mut command = self.apt_noninteractive("install");
            command.arg("--only-upgrade").args(names);
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
        let mut command = self.apt_noninteractive("remove");
        if purge {
            command.arg("--purge");
        }
        command.args(names);
        execute_checked(self.runner.as_ref(), &mut command)?;
        Ok(())
    }

    fn list_upgradable(&self) -> Result<Vec<UpgradableInfo>, BackendError> {
        Ok(parse_upgradable(&self.list("--upgradable")?))
    }

    fn list_all(&self) -> Result<Vec<PackageSummary>, BackendError> {
        Ok(parse_list(&LIST_LINE, &self.list("--all-versions")?))
    }

    fn list_installed(&self) -> Result<Vec<PackageSummary>, BackendError> {
        Ok(parse_installed(&self.list("--installed")?))
    }

    fn list_available(&self) -> Result<Vec<PackageSummary>, BackendError> {
        self.list_all()
    }

    fn info(&self, name: &str) -> Result<PackageSummary, BackendError> {
        let mut command = self.apt("show");
        command.arg(name);
        let output = execute(self.runner.as_ref(), &mut command)?;
        if !output.success() {
            if output.stderr.contains("No packages found")
                || output.stderr.contains("Unable to locate package")
            {
                return Err(BackendError::NotFound(name.to_string()));
            }
            return Err(execution_error(&command, &output).into());
        }
        parse_show(&output.stdout).ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn is_installed(&self, name: &str) -> Result<bool, BackendError> {
        let mut command = Command::new("dpkg");
        command.arg("-s").arg(name);
        let output = execute(self.runner.as_ref(), &mut command)?;
        Ok(output.success()
            && output
                .stdout
                .lines()
                .any(|line| line.trim() == "Status: install ok installed"))
    }
}

pub(crate) fn parse_upgradable(stdout: &str) -> Vec<UpgradableInfo> {
    stdout
        .lines()
        .filter_map(|line| UPGRADABLE_LINE.captures(line.trim()))
        .map(|caps| UpgradableInfo::new(&caps[1], &caps[3], &caps[2]))
        .collect()
}

fn parse_list(pattern: &Regex, stdout: &str) -> Vec<PackageSummary> {
    stdout
        .lines()
        .filter_map(|line| pattern.captures(line.trim()))
        .map(|caps| PackageSummary::new(&caps[1], &caps[2]))
        .collect()
}

pub(crate) fn parse_installed(stdout: &str) -> Vec<PackageSummary> {
    parse_list(&INSTALLED_LINE, stdout)
}

pub(crate) fn parse_show(stdout: &str) -> Option<PackageSummary> {
    let fields = parse_field_record(stdout);
    let name = field(&fields, "Package")?;
    let version = field(&fields, "Version")?;
    Some(PackageSummary {
        name: name.to_string(),
        version: version.to_string(),
        description: field(&fields, "Description").map(str::to_string),
        installed_size: field(&fields, "Installed-Size").map(str::to_string),
    })
}
