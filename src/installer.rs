use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::config::{create_dir, WandPaths};
use crate::download::Downloader;
use crate::error::{ErrorKind, Result, WandError};
use crate::extract::{is_archive, Extractor};
use crate::formula::{Formula, PackageType, PlatformConfig, PostInstallHook};
use crate::platform::Platform;
use crate::registry::{Package, RegistryStore};
use crate::resolver::VersionService;
use crate::shell::ShellExecutor;
use crate::util::{file_name_from_url, locate_bin_dir, make_executable, replace_symlink};
use crate::version::Version;

/// Downloads, unpacks and records packages.
///
/// One install walks: formula lookup, version resolution, already-installed
/// check, platform config, URL templating, download, optional checksum,
/// CLI/GUI dispatch, optional build and post-install hooks, registry update.
/// The download directory is removed whether or not the install succeeds.
pub struct InstallerService {
    paths: WandPaths,
    platform: Platform,
    registry: Arc<dyn RegistryStore>,
    versions: VersionService,
    downloader: Downloader,
    extractor: Extractor,
}

impl InstallerService {
    pub fn new(
        paths: WandPaths,
        platform: Platform,
        registry: Arc<dyn RegistryStore>,
        versions: VersionService,
        downloader: Downloader,
        extractor: Extractor,
    ) -> Self {
        Self {
            paths,
            platform,
            registry,
            versions,
            downloader,
            extractor,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Installs `name` at `version` (`""`/`"latest"` for the newest release).
    ///
    /// The installed version becomes the global default when `global` is set
    /// or when the package has no global version yet.
    ///
    /// # Errors
    /// [`ErrorKind::PackageInstalled`] if the resolved version is already
    /// installed; the registry is left untouched in that case.
    pub fn install_package(&self, name: &str, version: &str, global: bool) -> Result<Package> {
        let formula = self.versions.formula(name)?;
        let version = self.versions.resolve_version(name, version)?;
        let version_string = version.to_string();

        let mut registry = self.registry.load()?;
        if registry.has_version(name, &version_string) {
            return Err(WandError::with_details(
                ErrorKind::PackageInstalled,
                "Package already installed",
                format!("package: {name:?}, version: {version_string:?}"),
            ));
        }

        let config = formula.platform_config(&self.platform).ok_or_else(|| {
            WandError::with_details(
                ErrorKind::ArchNotSupported,
                "Platform not supported",
                format!("package: {name:?}, platform: {}", self.platform),
            )
        })?;
        let url = build_download_url(&config.download_url, &version, &self.platform);

        create_dir(&self.paths.tmp_dir())?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!("{name}-{version_string}-"))
            .tempdir_in(self.paths.tmp_dir())
            .map_err(|e| WandError::wrap(ErrorKind::PermissionDenied, "Failed to create temp directory", e))?;
        let download_path = tmp.path().join(file_name_from_url(&url));

        info!(package = name, version = %version_string, %url, "Downloading");
        self.downloader
            .download(&url, &download_path)
            .map_err(|e| WandError::wrap(e.kind(), format!("Failed to download {name}@{version_string}"), e))?;

        if let Some(template) = &config.checksum_url {
            let checksum_url = build_download_url(template, &version, &self.platform);
            self.downloader
                .verify_checksum(&download_path, &checksum_url)
                .map_err(|e| {
                    WandError::wrap(e.kind(), format!("Checksum verification failed for {name}@{version_string}"), e)
                })?;
        }

        let (install_path, bin_path) = match formula.package_type {
            PackageType::Cli => self.install_cli(&formula, &version, &download_path, config)?,
            PackageType::Gui => self.install_gui(&formula, &version, &download_path, config)?,
            PackageType::Dotfile => {
                return Err(WandError::with_details(
                    ErrorKind::InstallationFailed,
                    "Unsupported package type",
                    format!("package: {name:?}, type: {}", formula.package_type),
                ));
            }
        };

        let mut package = Package::new(name, formula.package_type, version);
        package.install_path = install_path;
        package.bin_path = bin_path;
        registry.add_package(package);
        if global || registry.global_version(name).is_none() {
            registry.set_global_version(name, &version_string);
        }
        self.registry
            .save(&registry)
            .map_err(|e| e.context("Failed to update registry"))?;

        info!(package = name, version = %version_string, "Installed");
        registry
            .get_package(name, &version_string)
            .cloned()
            .ok_or_else(|| WandError::not_installed(name, Some(&version_string)))
    }

    fn install_cli(
        &self,
        formula: &Formula,
        version: &Version,
        download_path: &Path,
        config: &PlatformConfig,
    ) -> Result<(PathBuf, PathBuf)> {
        let ident = format!("{}@{version}", formula.name);
        let install_dir = self.paths.package_dir(&formula.name, &version.to_string());
        create_dir(&install_dir)?;
        let binary = first_binary(formula);

        let file_name = download_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if is_archive(&file_name) {
            self.extractor
                .extract(download_path, &install_dir)
                .map_err(|e| WandError::wrap(e.kind(), format!("Failed to extract package {ident}"), e))?;
        } else {
            let bin_dir = install_dir.join("bin");
            create_dir(&bin_dir)?;
            let target = bin_dir.join(binary);
            debug!(target = %target.display(), "Installing single binary");
            fs::copy(download_path, &target)
                .and_then(|_| make_executable(&target))
                .map_err(|e| WandError::wrap(ErrorKind::PermissionDenied, "Failed to write binary", e))?;
        }

        if config.requires_build {
            self.build_from_source(&install_dir, &config.build_commands)
                .map_err(|e| e.context(format!("Failed to build {ident} from source")))?;
        }
        if let Some(hook) = formula.post_install_hook() {
            self.run_post_install(&install_dir, hook)
                .map_err(|e| e.context(format!("Post-install hook failed for {ident}")))?;
        }

        let bin_path = locate_bin_dir(&install_dir, binary);
        Ok((install_dir, bin_path))
    }

    fn install_gui(
        &self,
        formula: &Formula,
        version: &Version,
        download_path: &Path,
        config: &PlatformConfig,
    ) -> Result<(PathBuf, PathBuf)> {
        let apps_dir = self.paths.apps_dir().join(&formula.name);
        create_dir(&apps_dir)?;
        self.extractor.extract(download_path, &apps_dir).map_err(|e| {
            WandError::wrap(
                e.kind(),
                format!("Failed to extract application {}@{version}", formula.name),
                e,
            )
        })?;

        if self.platform.is_darwin() {
            let app_name = formula.app_name.as_deref().ok_or_else(|| {
                WandError::with_details(
                    ErrorKind::ConfigInvalid,
                    "GUI formula has no app_name",
                    format!("package: {:?}", formula.name),
                )
            })?;
            let link = self.app_link(app_name);
            if let Some(home_apps) = link.parent() {
                create_dir(home_apps)?;
            }
            replace_symlink(&apps_dir.join(app_name), &link).map_err(|e| {
                WandError::wrap(
                    ErrorKind::PermissionDenied,
                    format!("Failed to create symlink for {app_name}"),
                    e,
                )
            })?;
            debug!(link = %link.display(), "Linked application");
        } else if let Some(desktop_file) = &config.desktop_file {
            let dest = self.desktop_entry(&formula.name);
            if let Some(desktop_dir) = dest.parent() {
                create_dir(desktop_dir)?;
            }
            fs::copy(apps_dir.join(desktop_file), &dest).map_err(|e| {
                WandError::wrap(ErrorKind::FileNotFound, "Failed to install desktop file", e)
            })?;
            debug!(desktop = %dest.display(), "Installed desktop entry");
        }

        Ok((apps_dir.clone(), apps_dir))
    }

    fn build_from_source(&self, dir: &Path, commands: &[String]) -> Result<()> {
        let shell = ShellExecutor::default();
        for command in commands {
            info!(%command, "Building");
            shell.run_script(command, dir)?;
        }
        Ok(())
    }

    fn run_post_install(&self, install_dir: &Path, hook: &PostInstallHook) -> Result<()> {
        let bin_path = install_dir.join("bin").to_string_lossy().to_string();
        let shell = ShellExecutor::with_env(hook.env.clone());
        for command in &hook.commands {
            let command = command.replace("{bin_path}", &bin_path);
            info!(%command, "Running post-install hook");
            shell.run_script(&command, install_dir)?;
        }
        Ok(())
    }

    /// Removes one version, or every version when `version` is `None`, from
    /// disk and from the registry. Returns the removed records.
    ///
    /// The registry is saved as soon as a version's files are gone, so a
    /// failure part way through leaves it listing exactly what is still on disk.
    /// GUI versions share one application directory; it and the desktop
    /// integration go with the last version.
    pub fn uninstall_package(&self, name: &str, version: Option<&str>) -> Result<Vec<Package>> {
        let mut registry = self
            .registry
            .load()
            .map_err(|e| e.context("Failed to load registry for uninstall"))?;
        let entry = registry
            .get_entry(name)
            .ok_or_else(|| WandError::not_installed(name, version))?;

        let targets: Vec<(String, Package)> = match version {
            None => entry
                .versions
                .iter()
                .map(|(key, package)| (key.clone(), package.clone()))
                .collect(),
            Some(version) => {
                let key = normalize_version_key(version);
                let package = entry
                    .versions
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| WandError::not_installed(name, Some(version)))?;
                vec![(key, package)]
            }
        };

        let mut removed = Vec::with_capacity(targets.len());
        for (key, package) in targets {
            let last = registry.get_entry(name).is_some_and(|e| e.versions.len() == 1);
            if let Err(e) = self.remove_files(&package, last) {
                if !removed.is_empty() {
                    self.registry
                        .save(&registry)
                        .map_err(|e| e.context("Failed to update registry"))?;
                }
                return Err(e);
            }
            registry.remove_package(name, &key);
            info!(package = %package.identifier(), "Removed");
            removed.push(package);
        }

        if version.is_none() {
            registry.remove_all(name);
        }
        self.registry
            .save(&registry)
            .map_err(|e| e.context("Failed to update registry"))?;
        Ok(removed)
    }

    fn remove_files(&self, package: &Package, last_version: bool) -> Result<()> {
        match package.package_type {
            PackageType::Gui if !last_version => {
                debug!(package = %package.identifier(), "Keeping shared application directory");
                Ok(())
            }
            PackageType::Gui => {
                self.remove_desktop_integration(&package.name);
                remove_dir(&package.install_path)
            }
            PackageType::Cli | PackageType::Dotfile => remove_install_dir(&package.install_path),
        }
    }

    fn app_link(&self, app_name: &str) -> PathBuf {
        self.paths.home_dir.join("Applications").join(app_name)
    }

    fn desktop_entry(&self, name: &str) -> PathBuf {
        self.paths
            .home_dir
            .join(".local/share/applications")
            .join(format!("{name}.desktop"))
    }

    /// Best effort: a leftover launcher is logged, not fatal.
    fn remove_desktop_integration(&self, name: &str) {
        let path = if self.platform.is_darwin() {
            match self.versions.formula(name).map(|f| f.app_name) {
                Ok(Some(app_name)) => self.app_link(&app_name),
                Ok(None) => return,
                Err(e) => {
                    warn!(package = name, error = %e, "Cannot locate application link");
                    return;
                }
            }
        } else {
            self.desktop_entry(name)
        };
        if fs::symlink_metadata(&path).is_ok() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed desktop integration"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove desktop integration"),
            }
        }
    }

    /// Makes an installed version the global default.
    pub fn set_global_version(&self, name: &str, version: &str) -> Result<()> {
        let key = normalize_version_key(version);
        let mut registry = self.registry.load()?;
        if !registry.has_version(name, &key) {
            return Err(WandError::not_installed(name, Some(version)));
        }
        registry.set_global_version(name, &key);
        self.registry.save(&registry)
    }
}

/// Substitutes `{version}` (short form), `{version_major}`, `{version_minor}`
/// (`MAJOR.MINOR`), `{platform}`/`{os}` and `{arch}`.
pub fn build_download_url(template: &str, version: &Version, platform: &Platform) -> String {
    template
        .replace("{version_major}", &version.major.to_string())
        .replace("{version_minor}", &format!("{}.{}", version.major, version.minor))
        .replace("{version}", &version.short_string())
        .replace("{platform}", &platform.os)
        .replace("{os}", &platform.os)
        .replace("{arch}", &platform.arch)
}

/// `8.7` and `v8.7.0` both address the registry key `8.7.0`.
pub(crate) fn normalize_version_key(version: &str) -> String {
    Version::parse(version)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| version.to_string())
}

fn first_binary(formula: &Formula) -> &str {
    formula
        .binaries
        .first()
        .map(String::as_str)
        .unwrap_or(&formula.name)
}

/// Deletes an installation and its parent if that is left empty.
fn remove_install_dir(path: &Path) -> Result<()> {
    remove_dir(path)?;
    if let Some(parent) = path.parent() {
        let _ = fs::remove_dir(parent);
    }
    Ok(())
}

fn remove_dir(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_dir_all(path).map_err(|e| {
            WandError::wrap(
                ErrorKind::PermissionDenied,
                format!("Failed to remove {}", path.display()),
                e,
            )
        })?;
    }
    Ok(())
}
