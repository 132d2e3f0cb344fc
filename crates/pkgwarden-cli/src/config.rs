use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pkgwarden_core::DirectoryCatalogue;
use pkgwarden_store::{StateLayout, DEFAULT_STATE_ROOT};
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/pkgwarden/config.toml";
pub(crate) const CONFIG_ENV: &str = "PKGWARDEN_CONFIG";
pub(crate) const LOG_ENV: &str = "PKGWARDEN_LOG";
const DEFAULT_PACKAGE_SEARCH_PATH: &str = "/etc/pkgwarden/packages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AppConfig {
    pub(crate) state_root: PathBuf,
    pub(crate) package_search_paths: Vec<PathBuf>,
    pub(crate) log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_root: PathBuf::from(DEFAULT_STATE_ROOT),
            package_search_paths: vec![PathBuf::from(DEFAULT_PACKAGE_SEARCH_PATH)],
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub(crate) fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse pkgwarden config")
    }

    /// A missing file means defaults.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid config file: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed reading config file: {}", path.display()))
            }
        }
    }

    pub(crate) fn state_layout(&self) -> StateLayout {
        StateLayout::new(&self.state_root)
    }

    pub(crate) fn catalogue(&self) -> DirectoryCatalogue {
        DirectoryCatalogue::new(self.package_search_paths.clone())
    }
}

/// `--config` wins over the environment, which wins over the default path.
pub(crate) fn resolve_config_path(cli_path: Option<&Path>, env_path: Option<OsString>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    env_path
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
