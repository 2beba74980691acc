use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use crate::error::{ErrorKind, Result, WandError};
use crate::formula::PackageType;
use crate::version::Version;

/// An installed package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// The package name, e.g. `"nano"`.
    pub name: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    /// The resolved version that was installed.
    pub version: Version,
    pub installed_at: DateTime<Utc>,
    /// Directory holding the package's executables.
    pub bin_path: PathBuf,
    /// Root of the installation, `packages/<name>/<version>` for CLI packages.
    pub install_path: PathBuf,
    /// Whether this version is the package's global default.
    #[serde(default)]
    pub is_global: bool,
}

impl Package {
    pub fn new(name: &str, package_type: PackageType, version: Version) -> Self {
        Self {
            name: name.to_string(),
            package_type,
            version,
            installed_at: Utc::now(),
            bin_path: PathBuf::new(),
            install_path: PathBuf::new(),
            is_global: false,
        }
    }

    /// `name@version`
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn version_string(&self) -> String {
        self.version.to_string()
    }
}

/// All installed versions of one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    /// version string -> installed package
    pub versions: BTreeMap<String, Package>,
}

impl PackageEntry {
    /// Installed versions, newest first.
    pub fn sorted_versions(&self) -> Vec<&Package> {
        let mut packages: Vec<&Package> = self.versions.values().collect();
        packages.sort_by(|a, b| b.version.cmp(&a.version));
        packages
    }
}

/// The persisted record of everything wand has installed.
///
/// Every version key of a [`PackageEntry`] maps to a package that is actually
/// on disk. Removing the last version of a package drops its entry and any
/// global pointer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageEntry>,
    /// package name -> global version string
    #[serde(default)]
    pub global_versions: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            packages: BTreeMap::new(),
            global_versions: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Records an installed package, replacing an existing record for the same version.
    pub fn add_package(&mut self, package: Package) {
        let entry = self
            .packages
            .entry(package.name.clone())
            .or_insert_with(|| PackageEntry {
                name: package.name.clone(),
                package_type: package.package_type,
                versions: BTreeMap::new(),
            });
        entry.versions.insert(package.version_string(), package);
        self.touch();
    }

    /// Removes one version. Returns the removed package, or `None` if it was
    /// not recorded.
    pub fn remove_package(&mut self, name: &str, version: &str) -> Option<Package> {
        let entry = self.packages.get_mut(name)?;
        let removed = entry.versions.remove(version)?;
        if entry.versions.is_empty() {
            self.packages.remove(name);
        }
        if self.global_versions.get(name).is_some_and(|global| global == version) {
            self.global_versions.remove(name);
        }
        self.touch();
        Some(removed)
    }

    /// Removes every version of a package along with its global pointer.
    pub fn remove_all(&mut self, name: &str) -> Option<PackageEntry> {
        self.global_versions.remove(name);
        let entry = self.packages.remove(name);
        self.touch();
        entry
    }

    pub fn get_package(&self, name: &str, version: &str) -> Option<&Package> {
        self.packages.get(name)?.versions.get(version)
    }

    pub fn get_entry(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn has_version(&self, name: &str, version: &str) -> bool {
        self.get_package(name, version).is_some()
    }

    /// Points the global default of `name` at `version` and updates the
    /// `is_global` flags of the installed records.
    pub fn set_global_version(&mut self, name: &str, version: &str) {
        if let Some(entry) = self.packages.get_mut(name) {
            for (key, package) in entry.versions.iter_mut() {
                package.is_global = key == version;
            }
        }
        self.global_versions.insert(name.to_string(), version.to_string());
        self.touch();
    }

    pub fn global_version(&self, name: &str) -> Option<&str> {
        self.global_versions.get(name).map(String::as_str)
    }

    /// The version of `name` in effect outside any project: the global
    /// version, or the newest installed one when there is no global pointer.
    pub fn current_package(&self, name: &str) -> Option<&Package> {
        let entry = self.packages.get(name)?;
        self.global_version(name)
            .and_then(|version| entry.versions.get(version))
            .or_else(|| entry.versions.values().max_by(|a, b| a.version.cmp(&b.version)))
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &PackageEntry> {
        self.packages.values()
    }
}

/// Persistence for the [`Registry`].
pub trait RegistryStore: Send + Sync {
    /// Loads the registry. A missing store yields an empty registry.
    fn load(&self) -> Result<Registry>;
    /// Replaces the stored registry as a whole.
    fn save(&self, registry: &Registry) -> Result<()>;
    fn exists(&self) -> bool;
}

/// Pretty-printed JSON file, rewritten atomically through a temp file in the
/// same directory.
#[derive(Debug, Clone)]
pub struct JsonRegistryStore {
    path: PathBuf,
}

impl JsonRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for JsonRegistryStore {
    fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            return Ok(Registry::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            WandError::wrap(
                ErrorKind::RegistryCorrupted,
                format!("Failed to read registry {}", self.path.display()),
                e,
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WandError::wrap(
                ErrorKind::RegistryCorrupted,
                format!("Failed to parse registry {}", self.path.display()),
                e,
            )
        })
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        let fail = |e: std::io::Error| {
            WandError::wrap(
                ErrorKind::PermissionDenied,
                format!("Failed to write registry {}", self.path.display()),
                e,
            )
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        crate::config::create_dir(&dir)?;

        let json = serde_json::to_string_pretty(registry).map_err(|e| {
            WandError::wrap(ErrorKind::RegistryCorrupted, "Failed to serialize registry", e)
        })?;
        let mut file = NamedTempFile::new_in(&dir).map_err(fail)?;
        file.write_all(json.as_bytes()).map_err(fail)?;
        file.write_all(b"\n").map_err(fail)?;
        file.persist(&self.path).map_err(|e| fail(e.error))?;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}
