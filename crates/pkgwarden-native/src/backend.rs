use std::fmt;

use pkgwarden_core::{PackageSummary, UpgradableInfo};

use crate::BackendError;

/// Environment marker read by control package post-install hooks. When set,
/// the hook leaves its own service restart to the caller.
pub const DEFER_RESTART_ENV: &str = "PREVENT_RESTART";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// APT - Debian/Ubuntu family
    Apt,
    /// Pacman - Arch Linux family
    Pacman,
}

impl BackendKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Apt => "APT",
            Self::Pacman => "Pacman",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub defer_service_restart: bool,
}

impl UpgradeOptions {
    pub fn deferred_restart() -> Self {
        Self {
            defer_service_restart: true,
        }
    }
}

/// Manager-agnostic contract over one native package tool.
pub trait NativeBackend {
    fn kind(&self) -> BackendKind;

    /// Installs non-interactively. With `needed`, already satisfied packages
    /// are not reinstalled where the tool supports it.
    fn install(&self, names: &[String], needed: bool) -> Result<(), BackendError>;

    /// Refreshes the local metadata cache.
    fn refresh_catalogue(&self) -> Result<(), BackendError>;

    /// Upgrades `names`, or everything upgradable when `names` is empty.
    fn upgrade(&self, names: &[String], options: UpgradeOptions) -> Result<(), BackendError>;

    fn remove(&self, names: &[String], purge: bool) -> Result<(), BackendError>;

    /// Empty when nothing is upgradable.
    fn list_upgradable(&self) -> Result<Vec<UpgradableInfo>, BackendError>;

    fn list_all(&self) -> Result<Vec<PackageSummary>, BackendError>;

    fn list_installed(&self) -> Result<Vec<PackageSummary>, BackendError>;

    fn list_available(&self) -> Result<Vec<PackageSummary>, BackendError>;

    fn info(&self, name: &str) -> Result<PackageSummary, BackendError>;

    fn is_installed(&self, name: &str) -> Result<bool, BackendError>;
}

/// Parses the first `Key: value` record of `show`/`-Qi` style output. Lines
/// that begin with whitespace continue the previous field; lines without a
/// separator are skipped.
pub(crate) fn parse_field_record(raw: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            if fields.is_empty() {
                continue;
            }
            break;
        }

        if line.starts_with(char::is_whitespace) {
            if let Some((_, value)) = fields.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        fields.push((key.trim().to_string(), value.trim().to_string()));
    }
    fields
}

pub(crate) fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty() && *value != "None")
}
