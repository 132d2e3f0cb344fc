use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Declaration of a package this host is allowed to manage, read from
/// `<search_path>/<key>.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub name: String,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub control_services_restart: bool,
    #[serde(default)]
    pub services: Vec<String>,
}

impl PackageDefinition {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let definition: Self =
            toml::from_str(input).context("failed to parse package definition")?;
        if definition.name.trim().is_empty() {
            return Err(anyhow!("package definition name must not be empty"));
        }

        let mut seen = HashSet::new();
        for service in &definition.services {
            if service.trim().is_empty() {
                return Err(anyhow!(
                    "package definition '{}' declares an empty service name",
                    definition.name
                ));
            }
            if !seen.insert(service.as_str()) {
                return Err(anyhow!(
                    "package definition '{}' declares service '{}' more than once",
                    definition.name,
                    service
                ));
            }
        }
        Ok(definition)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlCatalogue {
    definitions: BTreeMap<String, PackageDefinition>,
}

impl ControlCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, definition: PackageDefinition) {
        self.definitions.insert(key.into(), definition);
    }

    pub fn get(&self, key: &str) -> Option<&PackageDefinition> {
        self.definitions.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PackageDefinition)> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<(String, PackageDefinition)> for ControlCatalogue {
    fn from_iter<I: IntoIterator<Item = (String, PackageDefinition)>>(iter: I) -> Self {
        Self {
            definitions: iter.into_iter().collect(),
        }
    }
}

/// Provider of the control package catalogue.
pub trait CatalogueSource {
    fn control_packages(&self) -> Result<ControlCatalogue>;
}

impl CatalogueSource for ControlCatalogue {
    fn control_packages(&self) -> Result<ControlCatalogue> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryCatalogue {
    search_paths: Vec<PathBuf>,
}

impl DirectoryCatalogue {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl CatalogueSource for DirectoryCatalogue {
    fn control_packages(&self) -> Result<ControlCatalogue> {
        load_catalogue(&self.search_paths)
    }
}

/// Loads every `*.toml` definition from the search paths in order. A key
/// found in a later path replaces the one from an earlier path; missing
/// directories are skipped.
pub fn load_catalogue(search_paths: &[PathBuf]) -> Result<ControlCatalogue> {
    let mut catalogue = ControlCatalogue::new();
    for dir in search_paths {
        if !dir.is_dir() {
            debug!(path = %dir.display(), "package search path does not exist, skipping");
            continue;
        }

        for path in definition_files(dir)? {
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            validate_package_key(key)
                .with_context(|| format!("invalid package definition file: {}", path.display()))?;

            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed reading package definition: {}", path.display()))?;
            let definition = PackageDefinition::from_toml_str(&raw)
                .with_context(|| format!("failed parsing package definition: {}", path.display()))?;
            catalogue.insert(key.to_string(), definition);
        }
    }
    Ok(catalogue)
}

fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read package search path: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn validate_package_key(key: &str) -> Result<()> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > 128 {
        return Err(anyhow!("package key must be 1-128 characters: '{key}'"));
    }
    if !bytes[0].is_ascii_alphanumeric() {
        return Err(anyhow!(
            "package key must start with an ASCII letter or digit: '{key}'"
        ));
    }
    if bytes
        .iter()
        .any(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'+')))
    {
        return Err(anyhow!("package key contains invalid character(s): '{key}'"));
    }
    Ok(())
}
