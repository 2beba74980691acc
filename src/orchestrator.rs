use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::config::{formulas_repo_url, WandPaths};
use crate::download::{Downloader, ReqwestTransport};
use crate::error::{ErrorKind, Result, WandError};
use crate::extract::Extractor;
use crate::formula::{Formula, FormulaRepository, FormulaSource, PackageType};
use crate::installer::{normalize_version_key, InstallerService};
use crate::platform::Platform;
use crate::registry::{JsonRegistryStore, Package, Registry, RegistryStore};
use crate::releases::{GitHubReleases, ReleaseSource};
use crate::resolver::VersionService;
use crate::shims::{binaries_for, ShimService};
use crate::util::validate_package_name;
use crate::version::Version;
use crate::wandrc::WandRc;

/// Flags for [`InstallOrchestrator::install_package_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Make the installed version the global default.
    pub global: bool,
    /// Remove every installed version of the package first.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Package),
    /// The newest release was already installed; it is now the global version.
    UpToDate(Version),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedPackage {
    pub name: String,
    pub current: Version,
    pub latest: Version,
}

/// Health summary printed by `wand doctor`.
#[derive(Debug, Clone)]
pub struct DoctorReport {
    pub wand_dir: PathBuf,
    pub wand_dir_exists: bool,
    pub platform: Platform,
    pub platform_supported: bool,
    pub package_count: usize,
    pub registry_error: Option<String>,
    pub formula_count: usize,
    pub formulas_error: Option<String>,
    pub shims_dir: PathBuf,
    pub shims_on_path: bool,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.wand_dir_exists && self.registry_error.is_none() && self.formulas_error.is_none()
    }
}

/// Installs and removes packages together with their shims, and carries
/// the higher level commands built on top of the services.
pub struct InstallOrchestrator {
    paths: WandPaths,
    installer: InstallerService,
    shims: ShimService,
    versions: VersionService,
    formulas: Arc<dyn FormulaSource>,
    registry: Arc<dyn RegistryStore>,
}

impl InstallOrchestrator {
    /// Wires the services around the given sources.
    pub fn from_parts(
        paths: WandPaths,
        platform: Platform,
        formulas: Arc<dyn FormulaSource>,
        releases: Arc<dyn ReleaseSource>,
        registry: Arc<dyn RegistryStore>,
        downloader: Downloader,
        wand_exe: impl Into<PathBuf>,
    ) -> Self {
        let versions = VersionService::new(formulas.clone(), releases);
        let installer = InstallerService::new(
            paths.clone(),
            platform,
            registry.clone(),
            versions.clone(),
            downloader,
            Extractor::new(),
        );
        let shims = ShimService::new(paths.clone(), registry.clone(), formulas.clone(), wand_exe);
        Self {
            paths,
            installer,
            shims,
            versions,
            formulas,
            registry,
        }
    }

    /// The production setup: formulas under `paths`, GitHub releases,
    /// HTTP downloads and the JSON registry.
    pub fn with_defaults(paths: WandPaths, platform: Platform, wand_exe: impl Into<PathBuf>) -> Result<Self> {
        let formulas = Arc::new(FormulaRepository::new(paths.formulas_dir(), formulas_repo_url()));
        let registry = Arc::new(JsonRegistryStore::new(paths.registry_file()));
        let releases = Arc::new(GitHubReleases::new()?);
        let downloader = Downloader::new(Arc::new(ReqwestTransport::new()?));
        Ok(Self::from_parts(paths, platform, formulas, releases, registry, downloader, wand_exe))
    }

    pub fn paths(&self) -> &WandPaths {
        &self.paths
    }

    pub fn shims(&self) -> &ShimService {
        &self.shims
    }

    pub fn versions(&self) -> &VersionService {
        &self.versions
    }

    pub fn platform(&self) -> &Platform {
        self.installer.platform()
    }

    pub fn installed(&self) -> Result<Registry> {
        self.registry.load()
    }

    pub fn install_package(&self, name: &str, version: &str) -> Result<Package> {
        self.install_package_with_options(name, version, InstallOptions::default())
    }

    /// Installs `name@version` and writes shims for its binaries.
    ///
    /// With `force`, existing versions are uninstalled first; a failure there
    /// is logged and the install goes ahead.
    pub fn install_package_with_options(
        &self,
        name: &str,
        version: &str,
        options: InstallOptions,
    ) -> Result<Package> {
        validate_package_name(name)?;
        if options.force {
            match self.uninstall_package(name, None) {
                Ok(removed) => debug!(package = name, count = removed.len(), "Removed before reinstall"),
                Err(e) if e.is(ErrorKind::PackageNotInstalled) => {}
                Err(e) => warn!(package = name, error = %e, "Failed to remove existing installation"),
            }
        }

        let package = self.installer.install_package(name, version, options.global)?;
        if package.package_type == PackageType::Cli {
            let binaries = binaries_for(self.formulas.as_ref(), name);
            self.shims
                .create_shims(name, &binaries)
                .map_err(|e| e.context(format!("Installed {} but failed to create shims", package.identifier())))?;
        }
        Ok(package)
    }

    /// Uninstalls one version, or all of them when `version` is `None`.
    ///
    /// Shims go away once no version of the package is left. Failing to
    /// remove them is logged and does not stop the uninstall.
    pub fn uninstall_package(&self, name: &str, version: Option<&str>) -> Result<Vec<Package>> {
        let registry = self.registry.load()?;
        let entry = registry
            .get_entry(name)
            .ok_or_else(|| WandError::not_installed(name, version))?;
        let removes_last = match version {
            None => true,
            Some(version) => {
                let key = normalize_version_key(version);
                entry.versions.len() == 1 && entry.versions.contains_key(&key)
            }
        };

        if removes_last && entry.package_type == PackageType::Cli {
            let binaries = binaries_for(self.formulas.as_ref(), name);
            if let Err(e) = self.shims.remove_shims(&binaries) {
                warn!(package = name, error = %e, "Failed to remove shims");
            }
        }
        self.installer.uninstall_package(name, version)
    }

    /// Installs the newest release of `name` and makes it the global version.
    pub fn update_package(&self, name: &str) -> Result<UpdateOutcome> {
        let latest = self.versions.latest_version(name)?;
        let latest_key = latest.to_string();
        if self.registry.load()?.has_version(name, &latest_key) {
            self.installer.set_global_version(name, &latest_key)?;
            return Ok(UpdateOutcome::UpToDate(latest));
        }
        let options = InstallOptions {
            global: true,
            force: false,
        };
        self.install_package_with_options(name, &latest_key, options)
            .map(UpdateOutcome::Updated)
    }

    /// Selects an installed version, globally or for the project in `dir`
    /// (written to `<dir>/.wandrc`).
    pub fn use_version(&self, name: &str, version: &str, global: bool, dir: &Path) -> Result<()> {
        if global {
            return self.installer.set_global_version(name, version);
        }
        self.ensure_installed(name, version)?;
        let mut rc = if WandRc::exists_in(dir) {
            WandRc::load(dir)?
        } else {
            WandRc::new()
        };
        rc.set_version(name, version)?;
        rc.save(dir)?;
        info!(package = name, version, dir = %dir.display(), "Pinned version");
        Ok(())
    }

    /// Creates an empty `.wandrc` in `dir`.
    pub fn init_project(&self, dir: &Path) -> Result<PathBuf> {
        let path = WandRc::path_in(dir);
        if path.exists() {
            return Err(WandError::with_details(
                ErrorKind::ConfigInvalid,
                ".wandrc already exists",
                path.display().to_string(),
            ));
        }
        WandRc::new().save(dir)?;
        Ok(path)
    }

    /// Pins an installed version in the nearest `.wandrc` at or above `dir`.
    pub fn add_to_project(&self, dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
        validate_package_name(name)?;
        let (mut rc, rc_dir) = nearest_wandrc(dir)?;
        self.ensure_installed(name, version)?;
        rc.set_version(name, version)?;
        rc.save(&rc_dir)?;
        Ok(WandRc::path_in(&rc_dir))
    }

    /// Drops the pin for `name` from the nearest `.wandrc`.
    pub fn remove_from_project(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let (mut rc, rc_dir) = nearest_wandrc(dir)?;
        if !rc.remove_version(name) {
            return Err(WandError::with_details(
                ErrorKind::PackageNotFound,
                "Package is not pinned",
                format!("package: {name:?}, file: {}", WandRc::path_in(&rc_dir).display()),
            ));
        }
        rc.save(&rc_dir)?;
        Ok(WandRc::path_in(&rc_dir))
    }

    /// The executable a shim called `command` would run from `dir`.
    /// `command` may be a binary name or a package name.
    pub fn which(&self, command: &str, dir: &Path) -> Result<PathBuf> {
        let registry = self.registry.load()?;
        for entry in registry.entries().filter(|e| e.package_type == PackageType::Cli) {
            let binaries = binaries_for(self.formulas.as_ref(), &entry.name);
            let binary = if binaries.iter().any(|b| b == command) {
                command
            } else if entry.name == command {
                match binaries.first() {
                    Some(first) => first.as_str(),
                    None => continue,
                }
            } else {
                continue;
            };
            return self.shims.resolve_binary(&entry.name, binary, dir);
        }
        Err(WandError::with_details(
            ErrorKind::BinaryNotFound,
            format!("No installed package provides {command}"),
            format!("try: wand search {command}"),
        ))
    }

    /// Installed packages whose current version is older than the newest
    /// release. Packages whose releases cannot be listed are skipped.
    pub fn outdated(&self) -> Result<Vec<OutdatedPackage>> {
        let registry = self.registry.load()?;
        let mut outdated = Vec::new();
        for entry in registry.entries() {
            let Some(current) = registry.current_package(&entry.name) else {
                continue;
            };
            match self.versions.latest_version(&entry.name) {
                Ok(latest) if latest > current.version => outdated.push(OutdatedPackage {
                    name: entry.name.clone(),
                    current: current.version.clone(),
                    latest,
                }),
                Ok(_) => {}
                Err(e) => warn!(package = %entry.name, error = %e, "Could not check for updates"),
            }
        }
        Ok(outdated)
    }

    pub fn search(&self, term: &str) -> Result<Vec<Formula>> {
        Ok(self
            .formulas
            .list_formulas()?
            .into_iter()
            .filter(|formula| formula.matches(term))
            .collect())
    }

    pub fn sync_formulas(&self) -> Result<()> {
        self.formulas.sync()
    }

    /// Rebuilds every shim. Returns how many were written.
    pub fn rehash(&self) -> Result<usize> {
        self.shims.refresh_all_shims()
    }

    pub fn doctor(&self) -> DoctorReport {
        let platform = self.installer.platform().clone();
        let (package_count, registry_error) = match self.registry.load() {
            Ok(registry) => (registry.entries().count(), None),
            Err(e) => (0, Some(e.to_string())),
        };
        let (formula_count, formulas_error) = match self.formulas.list_formulas() {
            Ok(formulas) => (formulas.len(), None),
            Err(e) => (0, Some(e.to_string())),
        };
        let shims_dir = self.paths.shims_dir();
        let shims_on_path = std::env::var_os("PATH")
            .is_some_and(|path| std::env::split_paths(&path).any(|dir| dir == shims_dir));

        DoctorReport {
            wand_dir: self.paths.wand_dir.clone(),
            wand_dir_exists: self.paths.wand_dir.is_dir(),
            platform_supported: platform.is_supported(),
            platform,
            package_count,
            registry_error,
            formula_count,
            formulas_error,
            shims_dir,
            shims_on_path,
        }
    }

    fn ensure_installed(&self, name: &str, version: &str) -> Result<()> {
        let key = normalize_version_key(version);
        if self.registry.load()?.has_version(name, &key) {
            Ok(())
        } else {
            Err(WandError::not_installed(name, Some(version)))
        }
    }
}

fn nearest_wandrc(dir: &Path) -> Result<(WandRc, PathBuf)> {
    WandRc::find_in_path(dir)?.ok_or_else(|| {
        WandError::with_details(
            ErrorKind::ConfigMissing,
            "No .wandrc found",
            "run: wand init",
        )
    })
}
